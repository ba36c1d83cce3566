use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};
use super::{read_name, write_name};

/// `DELETE_TS` body: `u8 name_len, bytes name`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTs {
    pub name: String,
}

impl WireRead for DeleteTs {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(DeleteTs { name: read_name(r)? })
    }
}

impl WireWrite for DeleteTs {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        write_name(w, &self.name)
    }
}
