//! Vdex errors definitions.

use dk_dex::errors::DexError;
use dk_utils::leb::LebError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`VdexError`].
pub type VdexResult<T> = Result<T, VdexError>;

/// The vdex error type.
#[derive(Debug, Error)]
pub enum VdexError {
    /// Error that can be returned when doing [std::io](I/O) operations.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    #[error(transparent)]
    Dex(#[from] DexError),

    /// Error that can be returned at header parsing.
    #[error("parsing error ({1:?}) with {0} bytes left")]
    Parsing(usize, nom::error::ErrorKind),

    #[error("bad vdex magic")]
    BadMagic,

    #[error("unsupported vdex version {0:?}")]
    BadVersion([u8; 4]),

    #[error("buffer too short: {required} bytes required, {available} available")]
    ShortBuffer { required: usize, available: usize },

    #[error("arithmetic overflow while computing {0}")]
    Overflow(String),

    /// Corrupt quickening data. Any rewrite in progress is abandoned.
    #[error("quickening info integrity violation: {0}")]
    Integrity(String),
}

impl VdexError {
    pub(crate) fn integrity<S: Into<String>>(msg: S) -> Self {
        Self::Integrity(msg.into())
    }
}

impl From<LebError> for VdexError {
    fn from(err: LebError) -> Self {
        Self::Integrity(err.to_string())
    }
}

impl nom::error::ParseError<&[u8]> for VdexError {
    fn from_error_kind(input: &[u8], kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.len(), kind)
    }

    fn append(_: &[u8], _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}
