//! Dex errors definitions.

use dk_utils::leb::LebError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DexError`].
pub type DexResult<T> = Result<T, DexError>;

/// The Dex error type.
#[derive(Debug, Error)]
pub enum DexError {
    /// Error that can be returned when doing [std::io](I/O) operations.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// Error that can be returned at parsing.
    #[error("parsing error ({1:?}) with {0} bytes left")]
    Parsing(usize, nom::error::ErrorKind),

    #[error("leb128 error: {0}")]
    Leb(#[from] LebError),

    #[error("bad dex magic")]
    BadMagic,

    #[error("bad dex checksum (expected {expected:#010x}, computed {computed:#010x})")]
    BadChecksum { expected: u32, computed: u32 },

    /// The supplied buffer is smaller than the size declared by the header.
    /// `required` is the size to retry with.
    #[error("buffer too short: {required} bytes required, {available} available")]
    ShortBuffer { required: usize, available: usize },

    /// Invalid MUTF-8 string.
    #[error("invalid MUTF-8: {0}")]
    InvalidMutf8(String),

    #[error("dex structure is invalid: {0}")]
    Structure(String),

    #[error("dex {0} has bad size")]
    BadSize(String),

    #[error("dex {0} has invalid offset")]
    InvalidOffset(String),

    #[error("{kind} index {index} out of range (size {size})")]
    IndexOutOfRange {
        kind: &'static str,
        index: u32,
        size: usize,
    },

    #[error("arithmetic overflow while computing {0}")]
    Overflow(String),

    #[error("bad instruction at code unit {0}")]
    BadInstruction(usize),
}

impl DexError {
    pub(crate) fn out_of_range(kind: &'static str, index: u32, size: usize) -> Self {
        Self::IndexOutOfRange { kind, index, size }
    }
}

impl nom::error::ParseError<&[u8]> for DexError {
    fn from_error_kind(input: &[u8], kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.len(), kind)
    }

    fn append(_: &[u8], _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}
