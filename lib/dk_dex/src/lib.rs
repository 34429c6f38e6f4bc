//! Dex container reader, in-memory item model and writer.

mod mutf8;
mod parsers;

pub mod errors;
pub mod file;
pub mod insns;
pub mod ir;
pub mod map;
pub mod raw;
pub mod sections;
pub mod visualize;
pub mod writer;

pub use crate::file::{DexFile, DexFileOptions};
pub use crate::ir::builder::build;
pub use crate::ir::Header;
pub use crate::writer::{DexWriter, LayoutLevel, WriterOptions};

use crate::errors::DexResult;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Parses a dex container and builds its item model.
pub fn parse(data: &[u8]) -> DexResult<Header> {
    let dex_file = DexFile::open(data)?;
    build(&dex_file)
}

/// Opens and parses the given dex file path.
pub fn open<P: AsRef<Path>>(path: P) -> DexResult<Header> {
    let mut file = File::open(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    parse(&contents)
}

/// Serializes the item model, assigning fresh offsets to every item.
pub fn write(header: &mut Header, options: &WriterOptions) -> DexResult<Vec<u8>> {
    DexWriter::output(header, options)
}
