use bitflags::bitflags;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};
use super::{read_name, write_name};

bitflags! {
    /// `QUERY`'s flags byte, per spec.md §4.2: bit 0 mean, bit 1 first,
    /// bit 2 last, bit 3 major_of, bit 4 minor_of. Kept as a typed
    /// accessor rather than raw bit-punning, per spec.md §9's bit-flag-union
    /// convention.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct QueryFlags: u8 {
        const MEAN = 1 << 0;
        const FIRST = 1 << 1;
        const LAST = 1 << 2;
        const MAJOR_OF = 1 << 3;
        const MINOR_OF = 1 << 4;
    }
}

/// `QUERY` body: `u8 flags, u8 name_len, bytes name, [u64 mean_val],
/// [u64 major_of], [u64 minor_of]`.
///
/// The optional fields are present or absent according to the
/// corresponding bit of `flags`; decoded here into `Option`s so callers
/// never have to re-inspect the flags byte. `crate::store::query` turns
/// this into a [`crate::store::query::QuerySelector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub mean_val: Option<u64>,
    pub first: bool,
    pub last: bool,
    pub major_of: Option<u64>,
    pub minor_of: Option<u64>,
}

impl WireRead for Query {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let flags = QueryFlags::from_bits_truncate(r.read_u8()?);
        let name = read_name(r)?;
        let mean_val = flags.contains(QueryFlags::MEAN).then(|| r.read_u64()).transpose()?;
        let major_of = flags.contains(QueryFlags::MAJOR_OF).then(|| r.read_u64()).transpose()?;
        let minor_of = flags.contains(QueryFlags::MINOR_OF).then(|| r.read_u64()).transpose()?;

        Ok(Query {
            name,
            mean_val,
            first: flags.contains(QueryFlags::FIRST),
            last: flags.contains(QueryFlags::LAST),
            major_of,
            minor_of,
        })
    }
}

impl WireWrite for Query {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        let mut flags = QueryFlags::empty();
        flags.set(QueryFlags::MEAN, self.mean_val.is_some());
        flags.set(QueryFlags::FIRST, self.first);
        flags.set(QueryFlags::LAST, self.last);
        flags.set(QueryFlags::MAJOR_OF, self.major_of.is_some());
        flags.set(QueryFlags::MINOR_OF, self.minor_of.is_some());

        w.write_u8(flags.bits())?;
        write_name(w, &self.name)?;
        if let Some(v) = self.mean_val {
            w.write_u64(v)?;
        }
        if let Some(v) = self.major_of {
            w.write_u64(v)?;
        }
        if let Some(v) = self.minor_of {
            w.write_u64(v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scan_has_no_optional_fields() {
        let pkt = Query { name: "t".into(), mean_val: None, first: false, last: false, major_of: None, minor_of: None };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf.len(), 1 + 1 + 1); // flags + name_len + "t"
        assert_eq!(Query::read(&mut ByteReader::new(&buf)).unwrap(), pkt);
    }

    #[test]
    fn anchored_mean_range_round_trips_optional_fields_in_order() {
        let pkt = Query {
            name: "cpu".into(),
            mean_val: Some(60_000),
            first: false,
            last: false,
            major_of: Some(1_700_000_000_000_000_000),
            minor_of: Some(1_700_000_100_000_000_000),
        };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(Query::read(&mut ByteReader::new(&buf)).unwrap(), pkt);
    }
}
