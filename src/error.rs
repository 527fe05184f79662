//! Error types shared by every component in this crate.

use thiserror::Error;

/// Convenience return type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Combined error type for PAK, config, and level operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The input does not start with the PAK magic (plain or XOR 0xF7).
    #[error("not a pak archive: bad magic")]
    NotAPak,

    /// The stream ended before a fixed-size field or declared payload could
    /// be read in full.
    #[error("unexpected end of data: needed {needed} byte(s) at offset {at}")]
    Truncated {
        /// Bytes required to satisfy the read.
        needed: usize,
        /// Cursor position the read started at.
        at: usize,
    },

    /// An entry name exceeds the 255-byte length a PAK header byte can hold.
    #[error("entry name {0:?} is longer than 255 bytes")]
    NameTooLong(String),

    /// An entry payload exceeds the 32-bit size field.
    #[error("payload for {0:?} exceeds u32::MAX bytes")]
    PayloadTooLarge(String),

    /// A lookup by name found nothing.
    #[error("no such entry: {0:?}")]
    NotFound(String),

    /// An insert collided with an existing entry name.
    #[error("entry already exists: {0:?}")]
    Conflict(String),

    /// A discriminant (level entry type, token type, ...) did not match any
    /// known value.
    #[error("invalid kind value: {0}")]
    InvalidKind(i64),

    /// A config or level file was structurally malformed.
    #[error("parse error: {0}")]
    ParseError(String),
}
