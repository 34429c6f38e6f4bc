//! Vdex container assembly.

use crate::errors::{VdexError, VdexResult};
use crate::header::{vdex_header_writer, VdexHeader};
use crate::quicken_info::build_quickening_tables;
use crate::quickener::QuickeningInfo;
use dk_dex::file::{DexFile, DexFileOptions};
use dk_utils::writers::{align4, bytes, le_u32};
use std::io::Cursor;

/// Builds a vdex container out of dex files and their quickening tables.
#[derive(Debug, Default)]
pub struct VdexBuilder {
    dex_files: Vec<(Vec<u8>, Option<QuickeningInfo>)>,
    verifier_deps: Vec<u8>,
}

fn size_u32(size: usize, what: &str) -> VdexResult<u32> {
    u32::try_from(size).map_err(|_| VdexError::Overflow(what.to_string()))
}

impl VdexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a dex file. Its quickening tables, if any, must come from
    /// [`crate::quickener::quicken_dex_file`] on the same bytes.
    pub fn add_dex(&mut self, dex: Vec<u8>, info: Option<QuickeningInfo>) -> &mut Self {
        self.dex_files.push((dex, info));
        self
    }

    /// Opaque verifier dependencies blob.
    pub fn set_verifier_deps(&mut self, deps: Vec<u8>) -> &mut Self {
        self.verifier_deps = deps;
        self
    }

    /// Quickening region, with the offset table offset of every dex file.
    /// The region stays empty when no dex file is quickened.
    fn quickening_region(&self) -> VdexResult<(Vec<u8>, Vec<u32>)> {
        let mut region = Vec::new();
        if self.dex_files.iter().all(|(_, info)| info.is_none()) {
            return Ok((region, vec![0; self.dex_files.len()]));
        }

        let mut table_offsets = Vec::with_capacity(self.dex_files.len());
        for (dex, info) in &self.dex_files {
            let num_method_ids = DexFile::open_with(
                dex,
                DexFileOptions {
                    verify_checksum: false,
                },
            )?
            .num_method_ids();
            let table_offset = match info {
                Some(info) if info.num_method_ids() != num_method_ids => {
                    return Err(VdexError::integrity(format!(
                        "quickening info covers {} methods, dex file has {}",
                        info.num_method_ids(),
                        num_method_ids
                    )));
                }
                Some(info) => build_quickening_tables(&mut region, info.tables())?,
                None => build_quickening_tables(
                    &mut region,
                    QuickeningInfo::new(num_method_ids).tables(),
                )?,
            };
            table_offsets.push(table_offset);
        }
        Ok((region, table_offsets))
    }

    pub fn build(&self) -> VdexResult<Vec<u8>> {
        let (region, table_offsets) = self.quickening_region()?;

        let mut checksums = Vec::with_capacity(self.dex_files.len());
        for (dex, _) in &self.dex_files {
            let dex_file = DexFile::open_with(
                dex,
                DexFileOptions {
                    verify_checksum: false,
                },
            )?;
            checksums.push(dex_file.header().checksum);
        }

        let mut header = VdexHeader {
            number_of_dex_files: size_u32(self.dex_files.len(), "number of dex files")?,
            dex_size: 0,
            verifier_deps_size: size_u32(self.verifier_deps.len(), "verifier deps size")?,
            quickening_info_size: size_u32(region.len(), "quickening info size")?,
            dex_checksums: checksums,
        };

        let mut output = Cursor::new(Vec::new());
        vdex_header_writer(&mut output, &header)?;
        let dex_begin = output.position();
        for ((dex, _), table_offset) in self.dex_files.iter().zip(&table_offsets) {
            align4(&mut output)?;
            le_u32(&mut output, *table_offset)?;
            bytes(&mut output, dex)?;
        }
        header.dex_size = size_u32((output.position() - dex_begin) as usize, "dex section size")?;
        bytes(&mut output, &self.verifier_deps)?;
        bytes(&mut output, &region)?;

        log::debug!(
            "vdex: {} dex files, dex section {:#x} bytes, quickening info {:#x} bytes",
            header.number_of_dex_files,
            header.dex_size,
            header.quickening_info_size
        );

        // dex_size is only known now
        output.set_position(0);
        vdex_header_writer(&mut output, &header)?;
        Ok(output.into_inner())
    }
}
