use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};
use super::{read_labels, write_labels};

/// One row of a `QUERY_RESPONSE`: `u8 rc, u64 ts_sec, u64 ts_nsec,
/// f64 value, u16 labels_len, label[]`.
///
/// `rc` is always `0` in this implementation — the source's per-row status
/// byte has no use once the store reports failures at the whole-request
/// level, but the field is kept so the wire layout matches spec.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rc: u8,
    pub ts_sec: u64,
    pub ts_nsec: u64,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

impl WireRead for QueryResult {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let rc = r.read_u8()?;
        let ts_sec = r.read_u64()?;
        let ts_nsec = r.read_u64()?;
        let value = r.read_f64()?;
        let labels = read_labels(r)?;
        Ok(QueryResult { rc, ts_sec, ts_nsec, value, labels })
    }
}

impl WireWrite for QueryResult {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        w.write_u8(self.rc)?;
        w.write_u64(self.ts_sec)?;
        w.write_u64(self.ts_nsec)?;
        w.write_f64(self.value)?;
        write_labels(w, &self.labels)
    }
}

/// `QUERY_RESPONSE` body: `u64 len, result[]`. `len` counts results, not
/// bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

impl WireRead for QueryResponse {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let count = r.read_u64()?;
        // `count` is attacker-controlled and unbounded by the u16 prefixes
        // used elsewhere in the wire format; cap the allocation hint to what
        // the buffer could actually hold rather than trusting it outright.
        let mut results = Vec::with_capacity(count.min(r.remaining() as u64) as usize);
        for _ in 0..count {
            results.push(QueryResult::read(r)?);
        }
        Ok(QueryResponse { results })
    }
}

impl WireWrite for QueryResponse {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        w.write_u64(self.results.len() as u64)?;
        for result in &self.results {
            result.write(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_multiple_results() {
        let pkt = QueryResponse {
            results: vec![
                QueryResult { rc: 0, ts_sec: 1700000000, ts_nsec: 0, value: 21.5, labels: vec![] },
                QueryResult {
                    rc: 0,
                    ts_sec: 1700000060,
                    ts_nsec: 0,
                    value: 22.0,
                    labels: vec![("room".into(), "den".into())],
                },
            ],
        };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(QueryResponse::read(&mut ByteReader::new(&buf)).unwrap(), pkt);
    }

    #[test]
    fn empty_result_set_round_trips() {
        let pkt = QueryResponse::default();
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(QueryResponse::read(&mut ByteReader::new(&buf)).unwrap(), pkt);
    }
}
