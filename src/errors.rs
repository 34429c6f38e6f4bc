//! Global error handling.
//!
//! Each sub-crate of the project defines its own type error.
//! Their types are unified here, when winding results at the top-level.
//!
//! ```rust,no_run
//! use dexkit::prelude::*;
//! use dexkit::dex;
//!
//! fn main() -> DkResult<()> { // can return a DkError
//!    let _dex = dex::open("classes.dex")?; // can return a DexError
//!    Ok(())
//! }
//! ```

use dk_dex::errors::DexError;
use dk_vdex::errors::VdexError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DkError`].
pub type DkResult<T> = Result<T, DkError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrapper over error types that
/// are defined in dependencies.
#[derive(Debug, Error)]
pub enum DkError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned from json serialization.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error that can be returned from [`dk_dex`] functions.
    #[error(transparent)]
    Dex(#[from] DexError),

    /// Error that can be returned from [`dk_vdex`] functions.
    #[error(transparent)]
    Vdex(#[from] VdexError),
}
