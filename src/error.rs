//! Error type shared by the NBT, region and chunk decoders.
//!
//! Every decode failure is returned to the immediate caller. The only "soft"
//! outcomes (absent region slots, unmapped blocks) are expressed as values,
//! never as errors.

use std::io;

use crate::nbt::TagType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown type id, missing `End` terminator, negative length or
    /// nesting beyond the supported depth.
    #[error("malformed tag at offset {offset}: {reason}")]
    MalformedTag { offset: usize, reason: String },

    /// A read of `needed` bytes at `offset` would cross the end of a buffer
    /// of `len` bytes. The read is never performed.
    #[error("buffer exhausted: need {needed} bytes at offset {offset}, buffer holds {len}")]
    BufferExhausted {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: TagType, found: TagType },

    /// A typed accessor was called while the parser was not positioned on a
    /// value (for example right after `TagStart` of a scalar).
    #[error("parser is not positioned on a value")]
    NotOnValue,

    /// Only zlib (scheme 2) chunk payloads are decoded.
    #[error("unsupported compression scheme {0}")]
    UnsupportedCompression(u8),

    #[error("required field `{0}` not found")]
    MissingField(&'static str),

    #[error("invalid path `{path}` at position {position}")]
    InvalidPath { path: String, position: usize },

    #[error("decompression failed: {0}")]
    Decompress(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedTag {
            offset,
            reason: reason.into(),
        }
    }
}
