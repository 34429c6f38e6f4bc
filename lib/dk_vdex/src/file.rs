//! Vdex container access.

use crate::decompiler::{unquicken_dex_file, UnquickenOptions};
use crate::errors::{VdexError, VdexResult};
use crate::header::{parse_header, VdexHeader, VdexSections};
use crate::quicken_info;
use dk_dex::file::{DexFile, DexFileOptions};
use dk_dex::raw::HEADER_SIZE;
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::Path;

enum VdexData {
    /// Private copy-on-write mapping: writes never reach the file.
    Mapped(MmapMut),
    Owned(Vec<u8>),
}

impl Deref for VdexData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(data) => data,
        }
    }
}

impl DerefMut for VdexData {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(data) => data,
        }
    }
}

/// Location of an embedded dex file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexLocation {
    /// Absolute offset of the dex file.
    pub begin: usize,
    pub size: usize,
    /// Offset of the quickening offset table of the dex file, relative to
    /// the quickening region.
    pub table_offset: u32,
}

/// A dex file of a vdex container, writable in place.
pub struct DexSlot<'a> {
    pub index: usize,
    pub data: &'a mut [u8],
    pub table_offset: u32,
    pub checksum: u32,
}

impl<'a> DexSlot<'a> {
    /// See [`unquicken_dex_file`].
    pub fn unquicken(
        &mut self,
        quickening_info: &[u8],
        options: UnquickenOptions,
    ) -> VdexResult<()> {
        let actual = DexFile::open_with(
            &*self.data,
            DexFileOptions {
                verify_checksum: false,
            },
        )?
        .header()
        .checksum;
        if actual != self.checksum {
            log::warn!(
                "dex #{}: checksum {:#010x} does not match vdex checksum {:#010x}",
                self.index,
                actual,
                self.checksum
            );
        }
        unquicken_dex_file(self.data, quickening_info, self.table_offset, options)
    }
}

pub struct VdexFile {
    data: VdexData,
    header: VdexHeader,
    sections: VdexSections,
    dex_files: Vec<DexLocation>,
}

fn read_u32(data: &[u8], at: usize) -> VdexResult<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or(VdexError::ShortBuffer {
            required: at + 4,
            available: data.len(),
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn locate_dex_files(
    data: &[u8],
    header: &VdexHeader,
    sections: &VdexSections,
) -> VdexResult<Vec<DexLocation>> {
    let dex_section = &data[..sections.verifier_deps_begin];
    let mut pos = sections.dex_begin;
    let mut dex_files = Vec::with_capacity(header.number_of_dex_files as usize);
    for i in 0..header.number_of_dex_files {
        pos = (pos + 3) & !3;
        let table_offset = read_u32(dex_section, pos)?;
        pos += 4;
        if dex_section.len() < pos + HEADER_SIZE as usize {
            return Err(VdexError::ShortBuffer {
                required: pos + HEADER_SIZE as usize,
                available: dex_section.len(),
            });
        }
        // file_size field of the dex header
        let size = read_u32(dex_section, pos + 32)? as usize;
        let end = pos
            .checked_add(size)
            .ok_or_else(|| VdexError::Overflow(format!("dex file #{} size", i)))?;
        if end > dex_section.len() {
            return Err(VdexError::ShortBuffer {
                required: end,
                available: dex_section.len(),
            });
        }
        log::debug!(
            "dex #{}: {:#x} bytes at {:#x}, quickening table at {:#x}",
            i,
            size,
            pos,
            table_offset
        );
        dex_files.push(DexLocation {
            begin: pos,
            size,
            table_offset,
        });
        pos = end;
    }
    Ok(dex_files)
}

impl VdexFile {
    /// Maps the file at `path`. The mapping is private: the file is never
    /// modified, whatever is done on the container.
    pub fn open<P: AsRef<Path>>(path: P) -> VdexResult<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is copy-on-write, and is read only through
        // bound-checked slices.
        let map = unsafe { MmapOptions::new().map_copy(&file)? };
        Self::new(VdexData::Mapped(map))
    }

    pub fn from_bytes(data: Vec<u8>) -> VdexResult<Self> {
        Self::new(VdexData::Owned(data))
    }

    fn new(data: VdexData) -> VdexResult<Self> {
        let header = parse_header(&data)?;
        let sections = header.sections(data.len())?;
        let dex_files = locate_dex_files(&data, &header, &sections)?;
        Ok(Self {
            data,
            header,
            sections,
            dex_files,
        })
    }

    pub fn header(&self) -> &VdexHeader {
        &self.header
    }

    pub fn num_dex_files(&self) -> usize {
        self.dex_files.len()
    }

    pub fn dex_locations(&self) -> &[DexLocation] {
        &self.dex_files
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn dex_file_data(&self, dex_index: usize) -> VdexResult<&[u8]> {
        let location = self.location(dex_index)?;
        Ok(&self.data[location.begin..location.begin + location.size])
    }

    pub fn verifier_deps(&self) -> &[u8] {
        &self.data[self.sections.verifier_deps_begin..self.sections.quickening_info_begin]
    }

    pub fn quickening_info(&self) -> &[u8] {
        &self.data[self.sections.quickening_info_begin..self.sections.end]
    }

    fn location(&self, dex_index: usize) -> VdexResult<DexLocation> {
        self.dex_files.get(dex_index).copied().ok_or_else(|| {
            VdexError::integrity(format!(
                "dex index {} out of {}",
                dex_index,
                self.dex_files.len()
            ))
        })
    }

    fn num_method_ids(&self, dex_index: usize) -> VdexResult<u32> {
        let dex = DexFile::open_with(
            self.dex_file_data(dex_index)?,
            DexFileOptions {
                verify_checksum: false,
            },
        )?;
        Ok(dex.num_method_ids())
    }

    /// Offset of the quickening table of a method, relative to the
    /// quickening region.
    pub fn quickening_info_offset(&self, dex_index: usize, method_index: u32) -> VdexResult<u32> {
        let location = self.location(dex_index)?;
        quicken_info::quickening_info_offset(
            self.quickening_info(),
            location.table_offset,
            self.num_method_ids(dex_index)?,
            method_index,
        )
    }

    /// Same as [`Self::quickening_info_offset`], walking every table of the
    /// dex file.
    pub fn quickening_info_offset_linear(
        &self,
        dex_index: usize,
        method_index: u32,
    ) -> VdexResult<u32> {
        let location = self.location(dex_index)?;
        quicken_info::quickening_info_offset_linear(
            self.quickening_info(),
            location.table_offset,
            self.num_method_ids(dex_index)?,
            method_index,
        )
    }

    /// Disjoint writable views over every dex file, along with the
    /// quickening region, so that dex files can be processed concurrently.
    pub fn split_for_unquicken(&mut self) -> (Vec<DexSlot<'_>>, &[u8]) {
        let (mut head, tail) = self.data.split_at_mut(self.sections.quickening_info_begin);
        let quickening_info = &tail[..self.sections.end - self.sections.quickening_info_begin];

        let mut slots = Vec::with_capacity(self.dex_files.len());
        let mut consumed = 0;
        for (index, location) in self.dex_files.iter().enumerate() {
            let (_, rest) = std::mem::take(&mut head).split_at_mut(location.begin - consumed);
            let (data, rest) = rest.split_at_mut(location.size);
            slots.push(DexSlot {
                index,
                data,
                table_offset: location.table_offset,
                checksum: self.header.dex_checksums[index],
            });
            head = rest;
            consumed = location.begin + location.size;
        }
        (slots, quickening_info)
    }

    /// Unquickens every dex file in place, one after the other.
    pub fn unquicken(&mut self, options: UnquickenOptions) -> VdexResult<()> {
        let (slots, quickening_info) = self.split_for_unquicken();
        for mut slot in slots {
            slot.unquicken(quickening_info, options)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_dex_section() {
        let mut data = Vec::new();
        data.extend_from_slice(b"vdex019\0");
        for v in [1u32, 8, 0, 0, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0; 8]);
        assert!(matches!(
            VdexFile::from_bytes(data),
            Err(VdexError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn empty_container() {
        let mut data = Vec::new();
        data.extend_from_slice(b"vdex019\0");
        for v in [0u32, 0, 2, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0xaa, 0xbb]);
        let mut vdex = VdexFile::from_bytes(data).unwrap();
        assert_eq!(vdex.num_dex_files(), 0);
        assert_eq!(vdex.verifier_deps(), &[0xaa, 0xbb]);
        assert!(vdex.quickening_info().is_empty());
        vdex.unquicken(UnquickenOptions::default()).unwrap();
        assert!(vdex.dex_file_data(0).is_err());
    }
}
