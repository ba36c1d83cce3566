//! Error types and the mapping between internal failures and wire-visible
//! status codes.

use thiserror::Error;

/// A protocol-level error: a malformed frame, a short read, or a violation
/// of the wire format's length/layout rules.
///
/// Per spec, `Io`, `Invalid`, and `LengthMismatch` never produce a response
/// packet — the connection that triggered one is simply closed.
/// `UnknownOpcode` is the one exception: `crate::server` catches it before
/// it ever reaches this type's usual "close the connection" handling and
/// reports it to the client as a `Status::UnknownCmd` `ACK`, keeping the
/// connection open, per spec §4.3/§7. Contrast with
/// [`crate::protocol::Status`], which *is* sent back to the client.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An I/O error occurred while reading or writing a frame.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame or one of its fields is malformed.
    #[error("invalid frame: {0}")]
    Invalid(String),

    /// The declared body length did not match what was actually consumed.
    #[error("frame length mismatch: declared {declared}, consumed {consumed}")]
    LengthMismatch { declared: usize, consumed: usize },

    /// The opcode byte did not match any known command. Reported to the
    /// client as `UNKNOWN_CMD`, not treated as a connection-closing error.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
}

/// An error raised by the time-series store.
///
/// Every variant here maps to a [`crate::protocol::Status`] in a response;
/// none of them should ever propagate out of a handler as a hard error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// `CREATE_TS` on an existing name, or an operation on a series that
    /// does not exist. Per spec §4.3 and §9 open question 1, these share a
    /// single status code; see `crate::protocol::Status::ENOTS`.
    #[error("series not found, or already exists")]
    NoSuchOrAlreadyExists,
}
