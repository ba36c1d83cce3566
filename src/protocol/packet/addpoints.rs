use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

use super::super::{WireRead, WireWrite};
use super::{read_labels, read_name, write_labels, write_name};

const TS_SEC_SET: u8 = 0b01;
const TS_NSEC_SET: u8 = 0b10;

/// A single point in an `ADDPOINTS` body: `u8 ts_flags, [u64 ts_sec],
/// [u64 ts_nsec], f64 value, u16 labels_len, label[]`.
///
/// `ts_sec`/`ts_nsec` are `None` when the corresponding `ts_flags` bit is
/// unset, meaning the server fills that component from the wall clock at
/// append time (spec §4.3 step 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub ts_sec: Option<u64>,
    pub ts_nsec: Option<u64>,
    pub value: f64,
    pub labels: Vec<(String, String)>,
}

impl WireRead for Point {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let flags = r.read_u8()?;
        let ts_sec = if flags & TS_SEC_SET != 0 { Some(r.read_u64()?) } else { None };
        let ts_nsec = if flags & TS_NSEC_SET != 0 { Some(r.read_u64()?) } else { None };
        let value = r.read_f64()?;
        let labels = read_labels(r)?;
        Ok(Point { ts_sec, ts_nsec, value, labels })
    }
}

impl WireWrite for Point {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        let mut flags = 0u8;
        if self.ts_sec.is_some() {
            flags |= TS_SEC_SET;
        }
        if self.ts_nsec.is_some() {
            flags |= TS_NSEC_SET;
        }
        w.write_u8(flags)?;
        if let Some(sec) = self.ts_sec {
            w.write_u64(sec)?;
        }
        if let Some(nsec) = self.ts_nsec {
            w.write_u64(nsec)?;
        }
        w.write_f64(self.value)?;
        write_labels(w, &self.labels)
    }
}

/// `ADDPOINTS` body: `u8 name_len, bytes name, u16 points_len, points[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddPoints {
    pub name: String,
    pub points: Vec<Point>,
}

impl WireRead for AddPoints {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let name = read_name(r)?;
        let count = r.read_u16()?;
        let mut points = Vec::with_capacity(count as usize);
        for _ in 0..count {
            points.push(Point::read(r)?);
        }
        Ok(AddPoints { name, points })
    }
}

impl WireWrite for AddPoints {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError> {
        write_name(w, &self.name)?;
        assert!(self.points.len() <= u16::MAX as usize, "too many points for u16 length prefix");
        w.write_u16(self.points.len() as u16)?;
        for point in &self.points {
            point.write(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_explicit_timestamp() {
        let pkt = AddPoints {
            name: "temp".into(),
            points: vec![Point {
                ts_sec: Some(1_700_000_000),
                ts_nsec: Some(0),
                value: 21.5,
                labels: vec![("room".into(), "kitchen".into())],
            }],
        };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(AddPoints::read(&mut ByteReader::new(&buf)).unwrap(), pkt);
    }

    #[test]
    fn round_trips_with_server_filled_timestamp() {
        let pkt = AddPoints {
            name: "cpu".into(),
            points: vec![Point { ts_sec: None, ts_nsec: None, value: 0.4, labels: vec![] }],
        };
        let mut buf = Vec::new();
        pkt.write(&mut ByteWriter::new(&mut buf)).unwrap();
        let decoded = AddPoints::read(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, pkt);
        assert!(decoded.points[0].ts_sec.is_none());
    }
}
