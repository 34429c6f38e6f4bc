//! Vdex containers: embedded dex files, quickening tables, and the
//! dex-to-dex quickening and unquickening passes.

pub mod builder;
pub mod decompiler;
pub mod errors;
pub mod file;
pub mod header;
pub mod quicken_info;
pub mod quickener;

pub use crate::builder::VdexBuilder;
pub use crate::decompiler::{unquicken_dex_file, DexDecompiler, UnquickenOptions};
pub use crate::errors::{VdexError, VdexResult};
pub use crate::file::{DexSlot, VdexFile};
pub use crate::quickener::{quicken_dex_file, NoResolver, QuickenResolver, QuickeningInfo};
