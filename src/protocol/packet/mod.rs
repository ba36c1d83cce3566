//! One submodule per opcode body, plus the shared `name`/`label` helpers
//! every body built on top of [`crate::codec`] needs.

mod ack;
mod addpoints;
mod create_ts;
mod delete_ts;
mod query;
mod query_response;

pub use ack::Ack;
pub use addpoints::{AddPoints, Point};
pub use create_ts::CreateTs;
pub use delete_ts::DeleteTs;
pub use query::Query;
pub use query_response::{QueryResponse, QueryResult};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

/// Decodes one wire `label`: `u16 label_len, bytes label, u16 value_len,
/// bytes value`.
pub(super) fn read_label(r: &mut ByteReader<'_>) -> Result<(String, String), ProtocolError> {
    let name = read_utf8(r.read_str16()?)?;
    let value = read_utf8(r.read_str16()?)?;
    Ok((name, value))
}

pub(super) fn write_label(w: &mut ByteWriter<'_>, label: &(String, String)) -> Result<(), ProtocolError> {
    w.write_str16(label.0.as_bytes())?;
    w.write_str16(label.1.as_bytes())
}

pub(super) fn read_labels(r: &mut ByteReader<'_>) -> Result<Vec<(String, String)>, ProtocolError> {
    let count = r.read_u16()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_label(r)?);
    }
    Ok(out)
}

pub(super) fn write_labels(w: &mut ByteWriter<'_>, labels: &[(String, String)]) -> Result<(), ProtocolError> {
    assert!(labels.len() <= u16::MAX as usize, "label count exceeds u16 length prefix");
    w.write_u16(labels.len() as u16)?;
    for label in labels {
        write_label(w, label)?;
    }
    Ok(())
}

pub(super) fn read_name(r: &mut ByteReader<'_>) -> Result<String, ProtocolError> {
    read_utf8(r.read_str8()?)
}

pub(super) fn write_name(w: &mut ByteWriter<'_>, name: &str) -> Result<(), ProtocolError> {
    w.write_str8(name.as_bytes())
}

fn read_utf8(bytes: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(bytes).map_err(|e| ProtocolError::Invalid(format!("non-utf8 string: {e}")))
}
