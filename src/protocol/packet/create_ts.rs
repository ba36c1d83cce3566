use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};
use super::{read_name, write_name};

/// `CREATE_TS` body: `u8 name_len, bytes name, u32 retention`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTs {
    pub name: String,
    pub retention: u32,
}

impl WireRead for CreateTs {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let name = read_name(r)?;
        let retention = r.read_u32()?;
        Ok(CreateTs { name, retention })
    }
}

impl WireWrite for CreateTs {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        write_name(w, &self.name)?;
        w.write_u32(self.retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let pkt = CreateTs { name: "cpu_temp".into(), retention: 3600 };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();

        let decoded = CreateTs::read(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, pkt);
    }
}
