//! Dex-to-dex decompilation: restores the canonical form of quickened
//! instructions from a method quickening table.

use crate::errors::{VdexError, VdexResult};
use crate::quicken_info::QuickenInfoTable;
use dk_dex::file::{DexFile, DexFileOptions};
use dk_dex::insns::*;
use dk_dex::raw::NO_INDEX16;
use std::collections::HashSet;

/// Rewrites the code units of one method.
pub struct DexDecompiler<'a, 't> {
    insns: &'a mut [u16],
    table: QuickenInfoTable<'t>,
    decompile_return_instruction: bool,
    index: u32,
}

impl<'a, 't> DexDecompiler<'a, 't> {
    pub fn new(
        insns: &'a mut [u16],
        table: QuickenInfoTable<'t>,
        decompile_return_instruction: bool,
    ) -> Self {
        Self {
            insns,
            table,
            decompile_return_instruction,
            index: 0,
        }
    }

    fn next_index(&mut self) -> VdexResult<u16> {
        let value = self.table.get(self.index)?;
        self.index += 1;
        Ok(value)
    }

    fn decompile_nop(&mut self, pc: usize) -> VdexResult<()> {
        if self.index >= self.table.num_elements() {
            return Ok(());
        }
        let reference = self.next_index()?;
        if reference == NO_INDEX16 {
            return Ok(());
        }
        let typ = self.next_index()?;
        if pc + 1 >= self.insns.len() {
            return Err(VdexError::integrity(format!("check-cast at {} is truncated", pc)));
        }
        let reg = u8::try_from(reference).map_err(|_| {
            VdexError::integrity(format!("check-cast register {} at {}", reference, pc))
        })?;
        self.insns[pc] = u16::from(reg) << 8 | u16::from(CHECK_CAST);
        self.insns[pc + 1] = typ;
        Ok(())
    }

    // The dex index goes to the second code unit for both the 22c and 35c/3rc
    // formats.
    fn decompile_indexed(&mut self, pc: usize, op: u8) -> VdexResult<()> {
        let index = self.next_index()?;
        set_opcode(&mut self.insns[pc], op);
        self.insns[pc + 1] = index;
        Ok(())
    }

    /// Walks the instructions, consuming one table entry per candidate
    /// instruction. Every entry must be used. Methods sharing a code item are
    /// only walked once, so an unused table is never legitimate.
    pub fn decompile(mut self) -> VdexResult<()> {
        let mut cursor = InstructionCursor::new();
        while let Some(pc) = cursor.pc(self.insns) {
            let unit = self.insns[pc];
            let op = opcode(unit);
            if op == NOP {
                self.decompile_nop(pc)?;
            } else if op == RETURN_VOID_NO_BARRIER {
                if self.decompile_return_instruction {
                    set_opcode(&mut self.insns[pc], RETURN_VOID);
                }
            } else if let Some(regular) = dequickened(op) {
                instruction_width(self.insns, pc)?;
                self.decompile_indexed(pc, regular)?;
            }
            cursor.advance(self.insns)?;
        }

        if self.index != self.table.num_elements() {
            return Err(VdexError::integrity(format!(
                "{} quickening entries left unused out of {}",
                self.table.num_elements() - self.index,
                self.table.num_elements()
            )));
        }
        Ok(())
    }
}

/// Options of [`unquicken_dex_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnquickenOptions {
    /// Also turn `return-void-no-barrier` back into `return-void`.
    pub decompile_return_instruction: bool,
}

/// Method bodies of a dex file: method index, instruction offset and
/// instructions. Methods sharing a code item are listed once.
fn method_bodies(dex: &[u8]) -> VdexResult<(u32, Vec<(u32, u32, Vec<u16>)>)> {
    let dex_file = DexFile::open_with(
        dex,
        DexFileOptions {
            verify_checksum: false,
        },
    )?;

    let mut seen = HashSet::new();
    let mut bodies = Vec::new();
    for i in 0..dex_file.num_class_defs() {
        let class_def = dex_file.class_def(i)?;
        if class_def.class_data_off == 0 {
            continue;
        }
        let class_data = dex_file.class_data(class_def.class_data_off)?;
        for method in class_data.methods() {
            if method.code_off == 0 || !seen.insert(method.code_off) {
                continue;
            }
            let code = dex_file.code_item(method.code_off)?;
            bodies.push((method.method_idx, code.insns_off, code.insns));
        }
    }
    Ok((dex_file.num_method_ids(), bodies))
}

fn write_units(dex: &mut [u8], offset: u32, units: &[u16]) {
    let start = offset as usize;
    for (chunk, unit) in dex[start..start + 2 * units.len()]
        .chunks_exact_mut(2)
        .zip(units)
    {
        chunk.copy_from_slice(&unit.to_le_bytes());
    }
}

/// Restores every quickened instruction of `dex` in place. `quickening_info`
/// is the whole quickening region of the vdex and `table_offset` the offset
/// of the offset table of this dex file in it.
///
/// The rewrite of a method only lands once all of its table has been
/// consumed: on error, the method being processed is left as it was.
pub fn unquicken_dex_file(
    dex: &mut [u8],
    quickening_info: &[u8],
    table_offset: u32,
    options: UnquickenOptions,
) -> VdexResult<()> {
    if quickening_info.is_empty() && !options.decompile_return_instruction {
        return Ok(());
    }

    let (num_method_ids, bodies) = method_bodies(dex)?;
    log::debug!(
        "unquickening {} method bodies ({} method ids)",
        bodies.len(),
        num_method_ids
    );

    for (method_idx, insns_off, mut insns) in bodies {
        let table = if quickening_info.is_empty() {
            QuickenInfoTable::empty()
        } else {
            let offset = crate::quicken_info::quickening_info_offset(
                quickening_info,
                table_offset,
                num_method_ids,
                method_idx,
            )?;
            let data = quickening_info.get(offset as usize..).ok_or_else(|| {
                VdexError::integrity(format!("table of method {} is out of bounds", method_idx))
            })?;
            QuickenInfoTable::new(data)?
        };

        DexDecompiler::new(&mut insns, table, options.decompile_return_instruction)
            .decompile()
            .map_err(|err| {
                log::error!("method {}: {}", method_idx, err);
                err
            })?;
        write_units(dex, insns_off, &insns);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quicken_info::QuickenInfoTableBuilder;

    fn table_bytes(entries: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut builder = QuickenInfoTableBuilder::new(&mut out, entries.len() as u32);
        for entry in entries {
            builder.add_index(*entry);
        }
        out
    }

    fn decompile(insns: &mut [u16], entries: &[u16], ret: bool) -> VdexResult<()> {
        let data = table_bytes(entries);
        let table = QuickenInfoTable::new(&data)?;
        DexDecompiler::new(insns, table, ret).decompile()
    }

    #[test]
    fn field_and_invoke() {
        // iget-quick v1, v2, @8 ; invoke-virtual-quick {v1}, vtable@3 ; return-void
        let mut insns = [
            0x2100 | u16::from(IGET_QUICK),
            8,
            0x1000 | u16::from(INVOKE_VIRTUAL_QUICK),
            3,
            0x0001,
            u16::from(RETURN_VOID),
        ];
        decompile(&mut insns, &[0x42, 0x17], false).unwrap();
        assert_eq!(
            insns,
            [
                0x2100 | u16::from(IGET),
                0x42,
                0x1000 | u16::from(INVOKE_VIRTUAL),
                0x17,
                0x0001,
                u16::from(RETURN_VOID)
            ]
        );
    }

    #[test]
    fn nops() {
        // nop (real) ; nop nop (elided check-cast v3, type 9) ; return-void
        let mut insns = [0x0000, 0x0000, 0x0000, u16::from(RETURN_VOID)];
        decompile(&mut insns, &[NO_INDEX16, 3, 9], false).unwrap();
        assert_eq!(
            insns,
            [0x0000, 0x0300 | u16::from(CHECK_CAST), 9, u16::from(RETURN_VOID)]
        );

        // nops past the end of the table are left alone
        let mut insns = [0x0000, 0x0000, u16::from(RETURN_VOID)];
        decompile(&mut insns, &[NO_INDEX16], false).unwrap();
        assert_eq!(insns, [0x0000, 0x0000, u16::from(RETURN_VOID)]);
    }

    #[test]
    fn return_instruction() {
        let quick = u16::from(RETURN_VOID_NO_BARRIER);
        let mut insns = [quick];
        decompile(&mut insns, &[], false).unwrap();
        assert_eq!(insns, [quick]);
        decompile(&mut insns, &[], true).unwrap();
        assert_eq!(insns, [u16::from(RETURN_VOID)]);
    }

    #[test]
    fn payloads_own_an_entry() {
        // nop ; return-void ; fill-array-data payload of 2 bytes
        let mut insns = [
            0x0000,
            u16::from(RETURN_VOID),
            FILL_ARRAY_DATA_PAYLOAD,
            1,
            2,
            0,
            0xbbaa,
        ];
        decompile(&mut insns, &[NO_INDEX16, NO_INDEX16], false).unwrap();
        assert_eq!(insns[2], FILL_ARRAY_DATA_PAYLOAD);
    }

    #[test]
    fn integrity() {
        // more quickened instructions than entries
        let mut insns = [0x2100 | u16::from(IPUT_QUICK), 8, 0x2100 | u16::from(IPUT_QUICK), 4];
        assert!(matches!(
            decompile(&mut insns, &[1], false),
            Err(VdexError::Integrity(_))
        ));

        // entries left once the walk is over
        let mut insns = [0x2100 | u16::from(IPUT_QUICK), 8];
        assert!(matches!(
            decompile(&mut insns, &[1, 2], false),
            Err(VdexError::Integrity(_))
        ));

        // table of a method without any quickened instruction
        let mut insns = [u16::from(RETURN_VOID)];
        let before = insns;
        assert!(matches!(
            decompile(&mut insns, &[1, 2], false),
            Err(VdexError::Integrity(_))
        ));
        assert_eq!(insns, before);
    }
}
