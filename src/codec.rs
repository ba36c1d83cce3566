//! Endian-agnostic pack/unpack of fixed-width integers and length-prefixed
//! byte strings over a contiguous buffer.
//!
//! This is the lowest layer of the wire stack: the protocol codec
//! (`crate::protocol`) builds `Packet`s out of these primitives. Everything
//! here is big-endian (network byte order), matching the framing in
//! `crate::protocol`.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ProtocolError;

/// A single field in the `pack`/`unpack` mini-language (format characters
/// `b`, `B`, `h`, `H`, `i`, `I`, `q`, `Q`, `s`).
///
/// Most of the protocol layer reads and writes fields with the typed
/// methods on [`ByteReader`]/[`ByteWriter`] directly, the same way the
/// opcode bodies are laid out field-by-field in spec. `Value` and
/// [`pack`]/[`unpack`] exist for callers that want to describe a record
/// shape once, as a format string, rather than as a sequence of method
/// calls (e.g. a generic dump/diff tool).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bytes(Vec<u8>),
}

/// A streaming reader for untrusted wire data. Never reads past the end of
/// the buffer it was constructed with; all reads are bounds-checked by the
/// underlying `Read` impl.
pub struct ByteReader<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { inner: buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.inner.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_i8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_u16::<BigEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_i16::<BigEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_u32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_i32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_u64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_i64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    /// Reads an IEEE-754 64-bit float. Used for record values (see
    /// `DESIGN.md` for why this supersedes the original's long-double path).
    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        let v = (&self.inner[self.pos..]).read_f64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    /// Reads `len` raw bytes. The destination is allocated with one extra
    /// trailing NUL byte so the result can be treated as a C string if
    /// desired, without that byte being part of the returned slice.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "byte run exceeds buffer bounds",
            )));
        }

        let mut buf = vec![0u8; len + 1];
        (&self.inner[self.pos..]).read_exact(&mut buf[..len])?;
        self.pos += len;
        buf.truncate(len);
        Ok(buf)
    }

    /// Reads a `u8`-length-prefixed byte string (used for series names).
    pub fn read_str8(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// Reads a `u16`-length-prefixed byte string (used for labels).
    pub fn read_str16(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    pub fn has_data_left(&self) -> bool {
        self.remaining() > 0
    }
}

/// A growable writer for encoding wire data into a reusable buffer.
pub struct ByteWriter<'a> {
    inner: &'a mut Vec<u8>,
}

impl<'a> ByteWriter<'a> {
    pub fn new(inner: &'a mut Vec<u8>) -> Self {
        ByteWriter { inner }
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), ProtocolError> {
        self.inner.write_u8(v)?;
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), ProtocolError> {
        self.inner.write_i8(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), ProtocolError> {
        self.inner.write_u16::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), ProtocolError> {
        self.inner.write_i16::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), ProtocolError> {
        self.inner.write_u32::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError> {
        self.inner.write_i32::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), ProtocolError> {
        self.inner.write_u64::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError> {
        self.inner.write_i64::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), ProtocolError> {
        self.inner.write_f64::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_str8(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        assert!(bytes.len() <= u8::MAX as usize, "name exceeds u8 length prefix");
        self.write_u8(bytes.len() as u8)?;
        self.write_bytes(bytes)
    }

    pub fn write_str16(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        assert!(bytes.len() <= u16::MAX as usize, "label exceeds u16 length prefix");
        self.write_u16(bytes.len() as u16)?;
        self.write_bytes(bytes)
    }
}

/// Packs a sequence of [`Value`]s into `out` according to `fmt`, a string of
/// format characters drawn from `{b,B,h,H,i,I,q,Q,s}`. `s` consumes one
/// `Value::Bytes` and writes it as a `u16`-length-prefixed run.
pub fn pack(fmt: &str, values: &[Value], out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let mut w = ByteWriter::new(out);
    let mut values = values.iter();

    for spec in fmt.chars() {
        let value = values
            .next()
            .ok_or_else(|| ProtocolError::Invalid("pack: not enough values for format".into()))?;

        match (spec, value) {
            ('b', Value::I8(v)) => w.write_i8(*v)?,
            ('B', Value::U8(v)) => w.write_u8(*v)?,
            ('h', Value::I16(v)) => w.write_i16(*v)?,
            ('H', Value::U16(v)) => w.write_u16(*v)?,
            ('i', Value::I32(v)) => w.write_i32(*v)?,
            ('I', Value::U32(v)) => w.write_u32(*v)?,
            ('q', Value::I64(v)) => w.write_i64(*v)?,
            ('Q', Value::U64(v)) => w.write_u64(*v)?,
            ('s', Value::Bytes(v)) => w.write_str16(v)?,
            (c, v) => {
                return Err(ProtocolError::Invalid(format!(
                    "pack: format char '{c}' does not match value {v:?}"
                )))
            }
        }
    }

    Ok(())
}

/// Unpacks a sequence of [`Value`]s from `r` according to `fmt`. A
/// numeric prefix before an `s` bounds the maximum string length accepted
/// (e.g. `"64s"` rejects strings longer than 64 bytes).
pub fn unpack(fmt: &str, r: &mut ByteReader<'_>) -> Result<Vec<Value>, ProtocolError> {
    let mut out = Vec::new();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut digits = String::from(c);
            while let Some(d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    chars.next();
                } else {
                    break;
                }
            }

            let max_len: usize = digits
                .parse()
                .map_err(|_| ProtocolError::Invalid("unpack: bad length prefix".into()))?;
            let spec = chars
                .next()
                .ok_or_else(|| ProtocolError::Invalid("unpack: dangling length prefix".into()))?;
            if spec != 's' {
                return Err(ProtocolError::Invalid(
                    "unpack: length prefix only applies to 's'".into(),
                ));
            }

            let len = r.read_u16()? as usize;
            if len > max_len {
                return Err(ProtocolError::Invalid(format!(
                    "unpack: string length {len} exceeds max {max_len}"
                )));
            }

            out.push(Value::Bytes(r.read_bytes(len)?));
            continue;
        }

        let value = match c {
            'b' => Value::I8(r.read_i8()?),
            'B' => Value::U8(r.read_u8()?),
            'h' => Value::I16(r.read_i16()?),
            'H' => Value::U16(r.read_u16()?),
            'i' => Value::I32(r.read_i32()?),
            'I' => Value::U32(r.read_u32()?),
            'q' => Value::I64(r.read_i64()?),
            'Q' => Value::U64(r.read_u64()?),
            's' => Value::Bytes(r.read_str16()?),
            c => return Err(ProtocolError::Invalid(format!("unpack: unknown format char '{c}'"))),
        };

        out.push(value);
    }

    Ok(out)
}
