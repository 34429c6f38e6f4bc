//! Quickening tables.
//!
//! The quickening info region of a vdex holds, for every dex file, one
//! [`QuickenInfoTable`] per method index, in method index order, followed
//! by a [`QuickenInfoOffsetTable`] giving the position of every 16th
//! table. A method table is found by jumping to the closest covered index,
//! then skipping the tables in between, each one being self-sized.

use crate::errors::{VdexError, VdexResult};
use dk_dex::insns::{dequickened, opcode, NOP};
use dk_utils::leb::{decode_uleb128, encode_uleb128};
use std::convert::TryFrom;

/// Number of method indices covered by one offset table slot.
pub const ELEMENTS_PER_INDEX: u32 = 16;

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Sparse index over method tables: one `u32` offset every
/// [`ELEMENTS_PER_INDEX`] method indices.
#[derive(Debug, Clone, Copy)]
pub struct QuickenInfoOffsetTable<'a> {
    table: &'a [u8],
    num_indices: u32,
}

impl<'a> QuickenInfoOffsetTable<'a> {
    /// Table covering method indices `0..max_index`, read from the start of
    /// `data`.
    pub fn new(data: &'a [u8], max_index: u32) -> VdexResult<Self> {
        let num_indices =
            max_index / ELEMENTS_PER_INDEX + u32::from(max_index % ELEMENTS_PER_INDEX != 0);
        let size = num_indices as usize * 4;
        let table = data.get(..size).ok_or_else(|| {
            VdexError::integrity(format!(
                "offset table of {} slots runs past the quickening info",
                num_indices
            ))
        })?;
        Ok(Self { table, num_indices })
    }

    pub const fn is_covered_index(index: u32) -> bool {
        index % ELEMENTS_PER_INDEX == 0
    }

    /// Slot holding the closest covered index at or below `index`, and the
    /// number of tables to skip from there.
    pub const fn element_offset(index: u32) -> (u32, u32) {
        (index / ELEMENTS_PER_INDEX, index % ELEMENTS_PER_INDEX)
    }

    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    pub fn size_in_bytes(&self) -> usize {
        self.table.len()
    }

    pub fn offset_at(&self, slot: u32) -> VdexResult<u32> {
        if slot >= self.num_indices {
            return Err(VdexError::integrity(format!(
                "offset table slot {} out of {}",
                slot, self.num_indices
            )));
        }
        read_u32(self.table, slot as usize * 4)
            .ok_or_else(|| VdexError::integrity(format!("offset table slot {}", slot)))
    }
}

/// Appends offset table slots.
pub struct QuickenInfoOffsetTableBuilder<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> QuickenInfoOffsetTableBuilder<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out }
    }

    pub fn add_offset(&mut self, offset: u32) {
        self.out.extend_from_slice(&offset.to_le_bytes());
    }
}

/// One method table: a uleb128 entry count, then one `u16` dex index per
/// instruction that may need to be dequickened, in instruction order.
#[derive(Debug, Clone, Copy)]
pub struct QuickenInfoTable<'a> {
    entries: &'a [u8],
    num_elements: u32,
}

impl<'a> QuickenInfoTable<'a> {
    /// Reads the table at the start of `data`. Fails if its entries do not
    /// fit in `data`.
    pub fn new(data: &'a [u8]) -> VdexResult<Self> {
        let count = decode_uleb128(data)?;
        let start = count.size();
        let end = (count.value() as usize)
            .checked_mul(2)
            .and_then(|len| len.checked_add(start))
            .ok_or_else(|| VdexError::Overflow("quickening table size".to_string()))?;
        let entries = data.get(start..end).ok_or_else(|| {
            VdexError::integrity(format!(
                "table of {} entries runs past the quickening info",
                count.value()
            ))
        })?;
        Ok(Self {
            entries,
            num_elements: count.value(),
        })
    }

    /// Table of a method without quickening data.
    pub const fn empty() -> Self {
        Self {
            entries: &[],
            num_elements: 0,
        }
    }

    pub fn num_elements(&self) -> u32 {
        self.num_elements
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    pub fn get(&self, index: u32) -> VdexResult<u16> {
        if index >= self.num_elements {
            return Err(VdexError::integrity(format!(
                "entry {} read from a table of {}",
                index, self.num_elements
            )));
        }
        let at = index as usize * 2;
        Ok(u16::from_le_bytes([self.entries[at], self.entries[at + 1]]))
    }

    /// Encoded size of the table at the start of `data`.
    pub fn size_in_bytes(data: &[u8]) -> VdexResult<usize> {
        let count_size = decode_uleb128(data)?.size();
        Ok(count_size + QuickenInfoTable::new(data)?.entries.len())
    }

    /// Whether the instruction starting with `unit` owns an entry.
    pub const fn needs_index_for_instruction(unit: u16) -> bool {
        opcode(unit) == NOP || dequickened(opcode(unit)).is_some()
    }
}

/// Appends a method table.
pub struct QuickenInfoTableBuilder<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> QuickenInfoTableBuilder<'a> {
    pub fn new(out: &'a mut Vec<u8>, num_elements: u32) -> Self {
        encode_uleb128(out, num_elements);
        Self { out }
    }

    pub fn add_index(&mut self, index: u16) {
        self.out.extend_from_slice(&index.to_le_bytes());
    }
}

/// Offset, within the quickening info `region`, of the table of
/// `method_index`. `table_offset` locates the offset table of the dex file,
/// which covers `num_method_ids` methods.
pub fn quickening_info_offset(
    region: &[u8],
    table_offset: u32,
    num_method_ids: u32,
    method_index: u32,
) -> VdexResult<u32> {
    if method_index >= num_method_ids {
        return Err(VdexError::integrity(format!(
            "method {} out of {}",
            method_index, num_method_ids
        )));
    }
    let table_data = region.get(table_offset as usize..).ok_or_else(|| {
        VdexError::integrity(format!("offset table at {:#x} is out of bounds", table_offset))
    })?;
    let offsets = QuickenInfoOffsetTable::new(table_data, num_method_ids)?;

    let (slot, remainder) = QuickenInfoOffsetTable::element_offset(method_index);
    let mut offset = offsets.offset_at(slot)?;
    for _ in 0..remainder {
        offset = skip_table(region, offset)?;
    }
    Ok(offset)
}

/// Same as [`quickening_info_offset`], walking every table from the first
/// one.
pub fn quickening_info_offset_linear(
    region: &[u8],
    table_offset: u32,
    num_method_ids: u32,
    method_index: u32,
) -> VdexResult<u32> {
    if num_method_ids == 0 || method_index >= num_method_ids {
        return Err(VdexError::integrity(format!(
            "method {} out of {}",
            method_index, num_method_ids
        )));
    }
    let table_data = region.get(table_offset as usize..).ok_or_else(|| {
        VdexError::integrity(format!("offset table at {:#x} is out of bounds", table_offset))
    })?;
    let offsets = QuickenInfoOffsetTable::new(table_data, num_method_ids)?;

    let mut offset = offsets.offset_at(0)?;
    for _ in 0..method_index {
        offset = skip_table(region, offset)?;
    }
    Ok(offset)
}

fn skip_table(region: &[u8], offset: u32) -> VdexResult<u32> {
    let data = region.get(offset as usize..).ok_or_else(|| {
        VdexError::integrity(format!("table at {:#x} is out of bounds", offset))
    })?;
    let size = QuickenInfoTable::size_in_bytes(data)?;
    u32::try_from(size)
        .ok()
        .and_then(|size| offset.checked_add(size))
        .ok_or_else(|| VdexError::Overflow("quickening table offset".to_string()))
}

/// Encodes the quickening region part of one dex file: one table per method
/// index, then the 4-aligned offset table. Offsets are relative to the
/// start of `out`, which must be the start of the region. Returns the
/// offset of the offset table.
pub fn build_quickening_tables(out: &mut Vec<u8>, tables: &[Vec<u16>]) -> VdexResult<u32> {
    let position = |out: &Vec<u8>| {
        u32::try_from(out.len()).map_err(|_| VdexError::Overflow("quickening info size".to_string()))
    };

    let mut covered = Vec::with_capacity(tables.len() / ELEMENTS_PER_INDEX as usize + 1);
    for (index, entries) in tables.iter().enumerate() {
        if QuickenInfoOffsetTable::is_covered_index(index as u32) {
            covered.push(position(out)?);
        }
        let count = u32::try_from(entries.len())
            .map_err(|_| VdexError::Overflow("quickening table length".to_string()))?;
        let mut builder = QuickenInfoTableBuilder::new(out, count);
        for entry in entries {
            builder.add_index(*entry);
        }
    }

    while out.len() % 4 != 0 {
        out.push(0);
    }
    let table_offset = position(out)?;
    let mut builder = QuickenInfoOffsetTableBuilder::new(out);
    for offset in covered {
        builder.add_offset(offset);
    }
    Ok(table_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dk_dex::insns::{IGET, IGET_QUICK, RETURN_VOID};

    #[test]
    fn element_offsets() {
        assert_eq!(QuickenInfoOffsetTable::element_offset(0), (0, 0));
        assert_eq!(QuickenInfoOffsetTable::element_offset(15), (0, 15));
        assert_eq!(QuickenInfoOffsetTable::element_offset(16), (1, 0));
        assert_eq!(QuickenInfoOffsetTable::element_offset(37), (2, 5));
        assert!(QuickenInfoOffsetTable::is_covered_index(32));
        assert!(!QuickenInfoOffsetTable::is_covered_index(33));
    }

    #[test]
    fn table_entries() {
        let mut out = Vec::new();
        let mut builder = QuickenInfoTableBuilder::new(&mut out, 2);
        builder.add_index(0x1234);
        builder.add_index(0xffff);
        assert_eq!(out, [2, 0x34, 0x12, 0xff, 0xff]);

        let table = QuickenInfoTable::new(&out).unwrap();
        assert_eq!(table.num_elements(), 2);
        assert_eq!(table.get(0).unwrap(), 0x1234);
        assert_eq!(table.get(1).unwrap(), 0xffff);
        assert!(matches!(table.get(2), Err(VdexError::Integrity(_))));
        assert_eq!(QuickenInfoTable::size_in_bytes(&out).unwrap(), 5);

        assert!(matches!(
            QuickenInfoTable::new(&out[..4]),
            Err(VdexError::Integrity(_))
        ));
    }

    #[test]
    fn instructions_needing_an_index() {
        assert!(QuickenInfoTable::needs_index_for_instruction(0x0000));
        assert!(QuickenInfoTable::needs_index_for_instruction(0x0100));
        assert!(QuickenInfoTable::needs_index_for_instruction(
            0x1200 | u16::from(IGET_QUICK)
        ));
        assert!(!QuickenInfoTable::needs_index_for_instruction(u16::from(IGET)));
        assert!(!QuickenInfoTable::needs_index_for_instruction(u16::from(RETURN_VOID)));
    }

    #[test]
    fn direct_and_linear_lookups_agree() {
        let tables: Vec<Vec<u16>> = (0..40u16)
            .map(|i| (0..i % 5).map(|j| i * 10 + j).collect())
            .collect();
        let mut region = Vec::new();
        let table_offset = build_quickening_tables(&mut region, &tables).unwrap();
        assert_eq!(table_offset % 4, 0);
        assert_eq!(region.len() as u32, table_offset + 3 * 4);

        for k in 0..40 {
            let direct = quickening_info_offset(&region, table_offset, 40, k).unwrap();
            let linear = quickening_info_offset_linear(&region, table_offset, 40, k).unwrap();
            assert_eq!(direct, linear, "method {}", k);

            let table = QuickenInfoTable::new(&region[direct as usize..]).unwrap();
            assert_eq!(table.num_elements(), k % 5);
            if k % 5 > 0 {
                assert_eq!(table.get(0).unwrap(), k as u16 * 10);
            }
        }
        assert!(quickening_info_offset(&region, table_offset, 40, 40).is_err());
    }

    #[test]
    fn corrupt_offset_table() {
        let tables = vec![vec![1u16], vec![2, 3]];
        let mut region = Vec::new();
        let table_offset = build_quickening_tables(&mut region, &tables).unwrap();

        // offset table slot points past the region
        let mut bad = region.clone();
        let at = table_offset as usize;
        bad[at..at + 4].copy_from_slice(&0x1000u32.to_le_bytes());
        assert!(matches!(
            quickening_info_offset(&bad, table_offset, 2, 1),
            Err(VdexError::Integrity(_))
        ));

        // table count larger than the region
        let mut bad = region;
        bad[0] = 0x7f;
        assert!(matches!(
            quickening_info_offset(&bad, table_offset, 2, 1),
            Err(VdexError::Integrity(_))
        ));
    }
}
