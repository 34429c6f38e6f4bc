//! Dalvik bytecode, seen as a stream of 16-bit code units.
//!
//! Only what is needed to walk instruction boundaries and rewrite opcodes in
//! place is provided: opcode values, instruction widths (including the
//! variable-size payload pseudo-instructions) and a few operand helpers.

use crate::errors::{DexError, DexResult};

pub const NOP: u8 = 0x00;
pub const RETURN_VOID: u8 = 0x0e;
pub const CHECK_CAST: u8 = 0x1f;
pub const IGET: u8 = 0x52;
pub const IGET_WIDE: u8 = 0x53;
pub const IGET_OBJECT: u8 = 0x54;
pub const IGET_BOOLEAN: u8 = 0x55;
pub const IGET_BYTE: u8 = 0x56;
pub const IGET_CHAR: u8 = 0x57;
pub const IGET_SHORT: u8 = 0x58;
pub const IPUT: u8 = 0x59;
pub const IPUT_WIDE: u8 = 0x5a;
pub const IPUT_OBJECT: u8 = 0x5b;
pub const IPUT_BOOLEAN: u8 = 0x5c;
pub const IPUT_BYTE: u8 = 0x5d;
pub const IPUT_CHAR: u8 = 0x5e;
pub const IPUT_SHORT: u8 = 0x5f;
pub const INVOKE_VIRTUAL: u8 = 0x6e;
pub const RETURN_VOID_NO_BARRIER: u8 = 0x73;
pub const INVOKE_VIRTUAL_RANGE: u8 = 0x74;
pub const IGET_QUICK: u8 = 0xe3;
pub const IGET_WIDE_QUICK: u8 = 0xe4;
pub const IGET_OBJECT_QUICK: u8 = 0xe5;
pub const IPUT_QUICK: u8 = 0xe6;
pub const IPUT_WIDE_QUICK: u8 = 0xe7;
pub const IPUT_OBJECT_QUICK: u8 = 0xe8;
pub const INVOKE_VIRTUAL_QUICK: u8 = 0xe9;
pub const INVOKE_VIRTUAL_RANGE_QUICK: u8 = 0xea;
pub const IPUT_BOOLEAN_QUICK: u8 = 0xeb;
pub const IPUT_BYTE_QUICK: u8 = 0xec;
pub const IPUT_CHAR_QUICK: u8 = 0xed;
pub const IPUT_SHORT_QUICK: u8 = 0xee;
pub const IGET_BOOLEAN_QUICK: u8 = 0xef;
pub const IGET_BYTE_QUICK: u8 = 0xf0;
pub const IGET_CHAR_QUICK: u8 = 0xf1;
pub const IGET_SHORT_QUICK: u8 = 0xf2;

/// Identifiers of the payload pseudo-instructions (full first code unit).
pub const PACKED_SWITCH_PAYLOAD: u16 = 0x0100;
pub const SPARSE_SWITCH_PAYLOAD: u16 = 0x0200;
pub const FILL_ARRAY_DATA_PAYLOAD: u16 = 0x0300;

/// Opcode of the instruction starting with `unit`.
pub const fn opcode(unit: u16) -> u8 {
    (unit & 0xff) as u8
}

/// High byte of the first code unit: register `vAA` of most formats.
pub const fn vreg_aa(unit: u16) -> u8 {
    (unit >> 8) as u8
}

/// Replaces the opcode of an instruction, keeping its first operand byte.
pub fn set_opcode(unit: &mut u16, op: u8) {
    *unit = (*unit & 0xff00) | u16::from(op);
}

pub const fn is_payload(unit: u16) -> bool {
    matches!(
        unit,
        PACKED_SWITCH_PAYLOAD | SPARSE_SWITCH_PAYLOAD | FILL_ARRAY_DATA_PAYLOAD
    )
}

/// Width in code units of a regular instruction, from its opcode.
pub const fn opcode_width(op: u8) -> usize {
    match op {
        0x00 | 0x01 | 0x04 | 0x07 | 0x0a..=0x12 | 0x1d | 0x1e | 0x21 | 0x27 | 0x28 => 1,
        0x02 | 0x05 | 0x08 | 0x13 | 0x15 | 0x16 | 0x19 | 0x1a | 0x1c | 0x1f | 0x20 => 2,
        0x22 | 0x23 | 0x29 | 0x2d..=0x3d => 2,
        0x03 | 0x06 | 0x09 | 0x14 | 0x17 | 0x1b | 0x24..=0x26 | 0x2a..=0x2c => 3,
        0x18 => 5,
        0x3e..=0x43 => 1,
        0x44..=0x6d => 2,
        0x6e..=0x72 => 3,
        0x73 => 1,
        0x74..=0x78 => 3,
        0x79..=0x8f => 1,
        0x90..=0xaf => 2,
        0xb0..=0xcf => 1,
        0xd0..=0xe8 => 2,
        0xe9 | 0xea => 3,
        0xeb..=0xf2 => 2,
        0xf3..=0xf9 => 1,
        0xfa | 0xfb => 4,
        0xfc | 0xfd => 3,
        0xfe | 0xff => 2,
    }
}

/// Width in code units of the instruction at `pc`, payloads included.
/// Fails if the instruction does not fit in `insns`.
pub fn instruction_width(insns: &[u16], pc: usize) -> DexResult<usize> {
    let unit = *insns.get(pc).ok_or(DexError::BadInstruction(pc))?;
    let unit_at = |i: usize| {
        insns
            .get(pc + i)
            .map(|u| u64::from(*u))
            .ok_or(DexError::BadInstruction(pc))
    };

    let width = match unit {
        PACKED_SWITCH_PAYLOAD => unit_at(1)? * 2 + 4,
        SPARSE_SWITCH_PAYLOAD => unit_at(1)? * 4 + 2,
        FILL_ARRAY_DATA_PAYLOAD => {
            let element_width = unit_at(1)?;
            let size = unit_at(2)? | (unit_at(3)? << 16);
            (size * element_width + 1) / 2 + 4
        }
        _ => opcode_width(opcode(unit)) as u64,
    };

    let end = (pc as u64)
        .checked_add(width)
        .ok_or(DexError::BadInstruction(pc))?;
    if end > insns.len() as u64 {
        return Err(DexError::BadInstruction(pc));
    }
    Ok(width as usize)
}

/// Regular counterpart of a quickened opcode.
pub const fn dequickened(op: u8) -> Option<u8> {
    match op {
        IGET_QUICK => Some(IGET),
        IGET_WIDE_QUICK => Some(IGET_WIDE),
        IGET_OBJECT_QUICK => Some(IGET_OBJECT),
        IGET_BOOLEAN_QUICK => Some(IGET_BOOLEAN),
        IGET_BYTE_QUICK => Some(IGET_BYTE),
        IGET_CHAR_QUICK => Some(IGET_CHAR),
        IGET_SHORT_QUICK => Some(IGET_SHORT),
        IPUT_QUICK => Some(IPUT),
        IPUT_WIDE_QUICK => Some(IPUT_WIDE),
        IPUT_OBJECT_QUICK => Some(IPUT_OBJECT),
        IPUT_BOOLEAN_QUICK => Some(IPUT_BOOLEAN),
        IPUT_BYTE_QUICK => Some(IPUT_BYTE),
        IPUT_CHAR_QUICK => Some(IPUT_CHAR),
        IPUT_SHORT_QUICK => Some(IPUT_SHORT),
        INVOKE_VIRTUAL_QUICK => Some(INVOKE_VIRTUAL),
        INVOKE_VIRTUAL_RANGE_QUICK => Some(INVOKE_VIRTUAL_RANGE),
        _ => None,
    }
}

/// Quickened counterpart of a field access or virtual invoke opcode.
pub const fn quickened(op: u8) -> Option<u8> {
    match op {
        IGET => Some(IGET_QUICK),
        IGET_WIDE => Some(IGET_WIDE_QUICK),
        IGET_OBJECT => Some(IGET_OBJECT_QUICK),
        IGET_BOOLEAN => Some(IGET_BOOLEAN_QUICK),
        IGET_BYTE => Some(IGET_BYTE_QUICK),
        IGET_CHAR => Some(IGET_CHAR_QUICK),
        IGET_SHORT => Some(IGET_SHORT_QUICK),
        IPUT => Some(IPUT_QUICK),
        IPUT_WIDE => Some(IPUT_WIDE_QUICK),
        IPUT_OBJECT => Some(IPUT_OBJECT_QUICK),
        IPUT_BOOLEAN => Some(IPUT_BOOLEAN_QUICK),
        IPUT_BYTE => Some(IPUT_BYTE_QUICK),
        IPUT_CHAR => Some(IPUT_CHAR_QUICK),
        IPUT_SHORT => Some(IPUT_SHORT_QUICK),
        INVOKE_VIRTUAL => Some(INVOKE_VIRTUAL_QUICK),
        INVOKE_VIRTUAL_RANGE => Some(INVOKE_VIRTUAL_RANGE_QUICK),
        _ => None,
    }
}

/// Iterates over instruction start positions. The width of an instruction
/// is computed when the iterator moves past it, so an instruction may be
/// rewritten in place between two steps.
#[derive(Debug, Default)]
pub struct InstructionCursor {
    pc: usize,
}

impl InstructionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the current instruction, `None` at the end.
    pub fn pc(&self, insns: &[u16]) -> Option<usize> {
        (self.pc < insns.len()).then_some(self.pc)
    }

    /// Moves past the current instruction.
    pub fn advance(&mut self, insns: &[u16]) -> DexResult<()> {
        self.pc += instruction_width(insns, self.pc)?;
        Ok(())
    }

    /// Moves by a fixed number of code units.
    pub fn skip(&mut self, units: usize) {
        self.pc += units;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(opcode_width(RETURN_VOID), 1);
        assert_eq!(opcode_width(CHECK_CAST), 2);
        assert_eq!(opcode_width(0x18), 5);
        assert_eq!(opcode_width(INVOKE_VIRTUAL_QUICK), 3);
        assert_eq!(opcode_width(IGET_SHORT_QUICK), 2);
        assert_eq!(opcode_width(0xfa), 4);
    }

    #[test]
    fn payload_widths() {
        // packed-switch with 2 targets
        let insns = [PACKED_SWITCH_PAYLOAD, 2, 0, 0, 0, 0, 0, 0];
        assert_eq!(instruction_width(&insns, 0).unwrap(), 8);
        // sparse-switch with 1 entry
        let insns = [SPARSE_SWITCH_PAYLOAD, 1, 0, 0, 0, 0];
        assert_eq!(instruction_width(&insns, 0).unwrap(), 6);
        // fill-array-data of three bytes
        let insns = [FILL_ARRAY_DATA_PAYLOAD, 1, 3, 0, 0, 0];
        assert_eq!(instruction_width(&insns, 0).unwrap(), 6);
        // truncated payload
        assert!(instruction_width(&[PACKED_SWITCH_PAYLOAD, 4, 0], 0).is_err());
    }

    #[test]
    fn truncated_instruction() {
        assert!(matches!(
            instruction_width(&[0x0000, 0x0e6e], 1),
            Err(DexError::BadInstruction(1))
        ));
    }

    #[test]
    fn quickening_tables_are_inverse() {
        for op in 0..=0xffu8 {
            if let Some(regular) = dequickened(op) {
                assert_eq!(quickened(regular), Some(op));
            }
        }
        assert_eq!(dequickened(IGET_BOOLEAN_QUICK), Some(IGET_BOOLEAN));
        assert_eq!(dequickened(IPUT_SHORT_QUICK), Some(IPUT_SHORT));
        assert_eq!(dequickened(NOP), None);
    }

    #[test]
    fn cursor_sees_rewrites() {
        let mut insns = vec![u16::from(NOP), u16::from(NOP), u16::from(RETURN_VOID)];
        let mut cursor = InstructionCursor::new();
        assert_eq!(cursor.pc(&insns), Some(0));
        insns[0] = 0x0300;
        set_opcode(&mut insns[0], CHECK_CAST);
        assert_eq!(vreg_aa(insns[0]), 3);
        cursor.advance(&insns).unwrap();
        assert_eq!(cursor.pc(&insns), Some(2));
        cursor.advance(&insns).unwrap();
        assert_eq!(cursor.pc(&insns), None);
    }
}
