//! Dex-to-dex quickening: the inverse of [`crate::decompiler`]. Field
//! accesses and virtual invokes are rewritten to their quick form and the
//! original indices are recorded in per-method tables.

use crate::errors::{VdexError, VdexResult};
use dk_dex::file::{DexFile, DexFileOptions};
use dk_dex::insns::*;
use dk_dex::raw::NO_INDEX16;
use std::collections::HashMap;

/// Runtime knowledge the quickener needs. Every hook defaults to leaving the
/// instruction as it is.
pub trait QuickenResolver {
    /// Byte offset of an instance field, if resolved.
    fn field_offset(&mut self, _field_idx: u16) -> Option<u16> {
        None
    }

    /// Vtable index of a virtual method, if resolved.
    fn vtable_index(&mut self, _method_idx: u16) -> Option<u16> {
        None
    }

    /// Whether a `check-cast` to this type is statically known to succeed.
    fn elide_check_cast(&mut self, _type_idx: u16) -> bool {
        false
    }

    /// Whether the `return-void` instructions of a method can skip the
    /// constructor barrier.
    fn return_void_no_barrier(&mut self, _method_idx: u32) -> bool {
        false
    }
}

/// Resolver that quickens nothing: only `nop`s get a table entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl QuickenResolver for NoResolver {}

/// Quickening tables of one dex file, indexed by method index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickeningInfo {
    tables: Vec<Vec<u16>>,
}

impl QuickeningInfo {
    pub fn new(num_method_ids: u32) -> Self {
        Self {
            tables: vec![Vec::new(); num_method_ids as usize],
        }
    }

    pub fn num_method_ids(&self) -> u32 {
        self.tables.len() as u32
    }

    pub fn table(&self, method_idx: u32) -> Option<&[u16]> {
        self.tables.get(method_idx as usize).map(Vec::as_slice)
    }

    pub fn tables(&self) -> &[Vec<u16>] {
        &self.tables
    }

    /// Whether no method has any entry.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(Vec::is_empty)
    }

    fn set(&mut self, method_idx: u32, entries: Vec<u16>) -> VdexResult<()> {
        let slot = self.tables.get_mut(method_idx as usize).ok_or_else(|| {
            VdexError::integrity(format!("method index {} out of range", method_idx))
        })?;
        *slot = entries;
        Ok(())
    }
}

struct DexQuickener<'a, 'r, R: QuickenResolver> {
    insns: &'a mut [u16],
    resolver: &'r mut R,
    method_idx: u32,
    entries: Vec<u16>,
}

impl<'a, 'r, R: QuickenResolver> DexQuickener<'a, 'r, R> {
    fn quicken_indexed(&mut self, pc: usize, op: u8, quick: u8) {
        let index = self.insns[pc + 1];
        let resolved = if op == INVOKE_VIRTUAL || op == INVOKE_VIRTUAL_RANGE {
            self.resolver.vtable_index(index)
        } else {
            self.resolver.field_offset(index)
        };
        if let Some(value) = resolved {
            set_opcode(&mut self.insns[pc], quick);
            self.insns[pc + 1] = value;
            self.entries.push(index);
        }
    }

    fn quicken(mut self) -> VdexResult<Vec<u16>> {
        let no_barrier = self.resolver.return_void_no_barrier(self.method_idx);
        let mut pc = 0;
        while pc < self.insns.len() {
            // rewrites below may change the opcode, not the width
            let width = instruction_width(self.insns, pc)?;
            let unit = self.insns[pc];
            let op = opcode(unit);
            match op {
                NOP => self.entries.push(NO_INDEX16),
                RETURN_VOID if no_barrier => {
                    set_opcode(&mut self.insns[pc], RETURN_VOID_NO_BARRIER)
                }
                CHECK_CAST => {
                    let typ = self.insns[pc + 1];
                    if self.resolver.elide_check_cast(typ) {
                        self.entries.push(u16::from(vreg_aa(unit)));
                        self.entries.push(typ);
                        self.insns[pc] = 0;
                        self.insns[pc + 1] = 0;
                    }
                }
                _ => {
                    if let Some(quick) = quickened(op) {
                        self.quicken_indexed(pc, op, quick);
                    }
                }
            }
            pc += width;
        }
        Ok(self.entries)
    }
}

/// Quickens every method of `dex` in place. The header checksum is left
/// untouched: it still matches the canonical form the bytes come back to
/// once unquickened.
pub fn quicken_dex_file<R: QuickenResolver>(
    dex: &mut [u8],
    resolver: &mut R,
) -> VdexResult<QuickeningInfo> {
    let (num_method_ids, bodies, mut codes) = {
        let dex_file = DexFile::open_with(
            dex,
            DexFileOptions {
                verify_checksum: false,
            },
        )?;
        let mut bodies = Vec::new();
        for i in 0..dex_file.num_class_defs() {
            let class_def = dex_file.class_def(i)?;
            if class_def.class_data_off == 0 {
                continue;
            }
            for method in dex_file.class_data(class_def.class_data_off)?.methods() {
                if method.code_off != 0 {
                    bodies.push((method.method_idx, method.code_off));
                }
            }
        }
        let mut codes = HashMap::new();
        for (_, code_off) in &bodies {
            if !codes.contains_key(code_off) {
                let code = dex_file.code_item(*code_off)?;
                codes.insert(*code_off, (code.insns_off, code.insns));
            }
        }
        (dex_file.num_method_ids(), bodies, codes)
    };

    let mut info = QuickeningInfo::new(num_method_ids);
    let mut done: HashMap<u32, Vec<u16>> = HashMap::new();
    for (method_idx, code_off) in bodies {
        if let Some(entries) = done.get(&code_off) {
            info.set(method_idx, entries.clone())?;
            continue;
        }
        let (insns_off, insns) = codes
            .get_mut(&code_off)
            .ok_or_else(|| VdexError::integrity(format!("code item {:#x}", code_off)))?;
        let entries = DexQuickener {
            insns: insns.as_mut_slice(),
            resolver: &mut *resolver,
            method_idx,
            entries: Vec::new(),
        }
        .quicken()?;

        let start = *insns_off as usize;
        for (chunk, unit) in dex[start..start + 2 * insns.len()]
            .chunks_exact_mut(2)
            .zip(insns.iter())
        {
            chunk.copy_from_slice(&unit.to_le_bytes());
        }
        info.set(method_idx, entries.clone())?;
        done.insert(code_off, entries);
    }

    log::debug!(
        "quickened {} code items of {} methods",
        done.len(),
        num_method_ids
    );
    Ok(info)
}
