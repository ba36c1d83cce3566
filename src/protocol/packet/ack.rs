use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};

/// `ACK` body: empty. The only thing an ACK communicates is its header's
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl WireRead for Ack {
    fn read(_r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Ack)
    }
}

impl WireWrite for Ack {
    fn write(&self, _w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        Ok(())
    }
}
