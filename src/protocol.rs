//! Frame header, opcodes, and the top-level `Packet` enum: the layer that
//! turns a `(Header, body bytes)` pair off the wire into a typed request or
//! response, and back.

pub mod packet;

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

pub use packet::{Ack, AddPoints, CreateTs, DeleteTs, Point, Query, QueryResponse, QueryResult};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::ProtocolError;

const TYPE_BIT: u8 = 0b1000_0000;
const OPCODE_SHIFT: u8 = 3;
const OPCODE_MASK: u8 = 0b1111;
const STATUS_SHIFT: u8 = 1;
const STATUS_MASK: u8 = 0b11;

/// The opcode named in a frame's header, identifying which [`Packet`]
/// variant its body decodes as.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum Opcode {
    CreateTs = 0,
    DeleteTs = 1,
    AddPoints = 2,
    Query = 3,
    QueryResponse = 4,
    Ack = 5,
}

/// A response's outcome, carried in the header rather than the body.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Primitive)]
pub enum Status {
    Ok = 0,
    /// Series not found, or — on `CREATE_TS` — already exists. See
    /// `crate::error::StoreError` for why this single code covers both.
    Enots = 1,
    UnknownCmd = 2,
    Eoom = 3,
}

/// The 1-byte frame header: request/response flag, opcode, and (for
/// responses only) a status code, bit-packed per the wire layout below.
///
/// Exposed only through typed accessors, never as a raw byte, per the
/// bit-flag-union convention used throughout this wire layer.
///
/// ```text
/// bit 7   : type (0 = request, 1 = response)
/// bits 6-3: opcode
/// bits 2-1: status (response only)
/// bit 0   : reserved
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header(u8);

impl Header {
    pub fn request(opcode: Opcode) -> Self {
        Header((opcode as u8 & OPCODE_MASK) << OPCODE_SHIFT)
    }

    pub fn response(opcode: Opcode, status: Status) -> Self {
        Header(TYPE_BIT | (opcode as u8 & OPCODE_MASK) << OPCODE_SHIFT | (status as u8 & STATUS_MASK) << STATUS_SHIFT)
    }

    pub fn from_byte(byte: u8) -> Self {
        Header(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn is_response(self) -> bool {
        self.0 & TYPE_BIT != 0
    }

    pub fn opcode(self) -> Result<Opcode, ProtocolError> {
        let raw = (self.0 >> OPCODE_SHIFT) & OPCODE_MASK;
        Opcode::from_u8(raw).ok_or(ProtocolError::UnknownOpcode(raw))
    }

    /// Meaningful only when [`Header::is_response`] is true; a request
    /// header's status bits are always zero.
    pub fn status(self) -> Result<Status, ProtocolError> {
        let raw = (self.0 >> STATUS_SHIFT) & STATUS_MASK;
        Status::from_u8(raw).ok_or_else(|| ProtocolError::Invalid(format!("unknown status code {raw}")))
    }
}

/// Decodes a [`Packet`] body given its already-parsed header.
pub trait WireRead: Sized {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError>;
}

/// Encodes a [`Packet`] body into a growable buffer.
pub trait WireWrite {
    fn write(&self, w: &mut ByteWriter<'_>) -> Result<(), ProtocolError>;
}

/// One decoded request or response, tagged by the opcode that produced it.
///
/// Dispatch is a plain exhaustive `match`, not a lookup table — adding an
/// opcode means the compiler flags every `match` that needs a new arm.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    CreateTs(CreateTs),
    DeleteTs(DeleteTs),
    AddPoints(AddPoints),
    Query(Query),
    QueryResponse(QueryResponse),
    Ack(Ack),
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::CreateTs(_) => Opcode::CreateTs,
            Packet::DeleteTs(_) => Opcode::DeleteTs,
            Packet::AddPoints(_) => Opcode::AddPoints,
            Packet::Query(_) => Opcode::Query,
            Packet::QueryResponse(_) => Opcode::QueryResponse,
            Packet::Ack(_) => Opcode::Ack,
        }
    }

    /// Decodes a packet body, given the opcode already read out of the
    /// frame header.
    pub fn decode(opcode: Opcode, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(body);
        let packet = match opcode {
            Opcode::CreateTs => Packet::CreateTs(CreateTs::read(&mut r)?),
            Opcode::DeleteTs => Packet::DeleteTs(DeleteTs::read(&mut r)?),
            Opcode::AddPoints => Packet::AddPoints(AddPoints::read(&mut r)?),
            Opcode::Query => Packet::Query(Query::read(&mut r)?),
            Opcode::QueryResponse => Packet::QueryResponse(QueryResponse::read(&mut r)?),
            Opcode::Ack => Packet::Ack(Ack::read(&mut r)?),
        };
        if r.has_data_left() {
            return Err(ProtocolError::LengthMismatch { declared: body.len(), consumed: body.len() - r.remaining() });
        }
        Ok(packet)
    }

    /// Encodes this packet's body (not including the frame header/length
    /// prefix) into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let mut w = ByteWriter::new(out);
        match self {
            Packet::CreateTs(p) => p.write(&mut w),
            Packet::DeleteTs(p) => p.write(&mut w),
            Packet::AddPoints(p) => p.write(&mut w),
            Packet::Query(p) => p.write(&mut w),
            Packet::QueryResponse(p) => p.write(&mut w),
            Packet::Ack(p) => p.write(&mut w),
        }
    }
}

/// Encodes a full frame — `header(1) | length(u32 BE) | body` — computing
/// `length` from the encoded body rather than trusting a caller-supplied
/// value.
pub fn encode_frame(header: Header, packet: &Packet, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    out.push(header.to_byte());
    let length_pos = out.len();
    out.extend_from_slice(&[0u8; 4]);

    let body_start = out.len();
    packet.encode(out)?;
    let body_len = (out.len() - body_start) as u32;
    out[length_pos..length_pos + 4].copy_from_slice(&body_len.to_be_bytes());

    Ok(())
}

/// Encodes a bare ACK-style frame with no body (used for `ACK` and for any
/// response where the status alone is the payload).
pub fn encode_status_frame(opcode: Opcode, status: Status, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    encode_frame(Header::response(opcode, status), &Packet::Ack(Ack), out)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn header_round_trips_request() {
        let h = Header::request(Opcode::Query);
        assert!(!h.is_response());
        assert_eq!(h.opcode().unwrap(), Opcode::Query);
    }

    #[test]
    fn header_round_trips_response_with_status() {
        let h = Header::response(Opcode::CreateTs, Status::Enots);
        assert!(h.is_response());
        assert_eq!(h.opcode().unwrap(), Opcode::CreateTs);
        assert_eq!(h.status().unwrap(), Status::Enots);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let h = Header::from_byte(0b0111_1000); // opcode bits = 0b1111 = 15
        assert!(matches!(h.opcode(), Err(ProtocolError::UnknownOpcode(15))));
    }

    #[test]
    fn encode_frame_patches_length_after_body() {
        let packet = Packet::DeleteTs(DeleteTs { name: "cpu".into() });
        let mut buf = Vec::new();
        encode_frame(Header::request(Opcode::DeleteTs), &packet, &mut buf).unwrap();

        let declared_len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
        assert_eq!(declared_len, buf.len() - 5);
    }

    #[test]
    fn decode_rejects_trailing_garbage() {
        let mut body = Vec::new();
        DeleteTs { name: "cpu".into() }.write(&mut ByteWriter::new(&mut body)).unwrap();
        body.push(0xFF);

        assert!(matches!(Packet::decode(Opcode::DeleteTs, &body), Err(ProtocolError::LengthMismatch { .. })));
    }

    #[test]
    fn ack_frame_has_empty_body() {
        let mut buf = Vec::new();
        encode_status_frame(Opcode::Ack, Status::Ok, &mut buf).unwrap();
        assert_eq!(buf.len(), 5);
    }

    /// Invariants 3 and 4 (spec.md §8), exercised across every opcode: a
    /// full encode-then-decode round trip yields an equal `Packet`, and the
    /// 5-byte prefix's length field always matches the encoded body.
    #[test]
    fn every_opcode_frame_round_trips_through_the_wire() {
        let cases = vec![
            Packet::CreateTs(CreateTs { name: "s".into(), retention: 42 }),
            Packet::DeleteTs(DeleteTs { name: "s".into() }),
            Packet::AddPoints(AddPoints {
                name: "s".into(),
                points: vec![Point { ts_sec: Some(1), ts_nsec: Some(2), value: 3.5, labels: vec![("k".into(), "v".into())] }],
            }),
            Packet::Query(Query { name: "s".into(), mean_val: Some(1000), first: false, last: false, major_of: Some(1), minor_of: Some(2) }),
            Packet::QueryResponse(QueryResponse {
                results: vec![QueryResult { rc: 0, ts_sec: 1, ts_nsec: 2, value: 3.5, labels: vec![] }],
            }),
            Packet::Ack(Ack),
        ];

        for packet in cases {
            let mut buf = Vec::new();
            encode_frame(Header::request(packet.opcode()), &packet, &mut buf).unwrap();

            let declared_len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
            assert_eq!(declared_len, buf.len() - 5);

            let decoded = Packet::decode(packet.opcode(), &buf[5..]).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    /// A body shorter than the bytes its own fields require fails to
    /// decode rather than silently yielding a short/garbage packet.
    #[test]
    fn truncated_body_is_a_protocol_error() {
        let packet = Packet::CreateTs(CreateTs { name: "s".into(), retention: 1 });
        let mut buf = Vec::new();
        encode_frame(Header::request(packet.opcode()), &packet, &mut buf).unwrap();

        let truncated = &buf[5..buf.len() - 1];
        assert_matches!(Packet::decode(Opcode::CreateTs, truncated), Err(_));
    }
}
