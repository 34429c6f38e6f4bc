//! Binary format primitives used by the dex and vdex crates.

pub mod leb;
pub mod values;
pub mod writers;
