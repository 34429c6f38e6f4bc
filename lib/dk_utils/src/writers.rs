//! Small writers functions to be used in file format writers.

use crate::leb::{encode_sleb128, encode_uleb128};
use std::io::{Result, Seek, Write};

/// Rounds `x` up to the next multiple of `n`, which must be a power of two.
pub const fn round_up(x: u32, n: u32) -> u32 {
    debug_assert!(n.is_power_of_two());
    (x + n - 1) & !(n - 1)
}

/// Checked version of [`round_up`], failing on overflow.
pub const fn checked_round_up(x: u32, n: u32) -> Option<u32> {
    match x.checked_add(n - 1) {
        Some(v) => Some(v & !(n - 1)),
        None => None,
    }
}

/// Writes zeros until the stream position is a multiple of `n`.
pub fn align_to<W: Write + Seek>(output: &mut W, n: u64) -> Result<usize> {
    let pos = output.stream_position()?;
    let pad = ((n - (pos % n)) % n) as usize;
    for _ in 0..pad {
        le_u8(output, 0x00)?;
    }
    Ok(pad)
}

/// Writes zeros to align offset on next 4 bytes.
pub fn align4<W: Write + Seek>(output: &mut W) -> Result<usize> {
    align_to(output, 4)
}

/// Writes zeros to align offset on next 8 bytes.
pub fn align8<W: Write + Seek>(output: &mut W) -> Result<usize> {
    align_to(output, 8)
}

/// Writes a bytes buffer in given output.
pub fn bytes<W: Write>(output: &mut W, bytes: &[u8]) -> Result<usize> {
    output.write_all(bytes)?;
    Ok(bytes.len())
}

/// Writes a string slice in given output.
pub fn tag<W: Write>(output: &mut W, tag: &str) -> Result<usize> {
    bytes(output, tag.as_bytes())
}

/// Writes a u8 in given output.
pub fn le_u8<W: Write>(output: &mut W, v: u8) -> Result<usize> {
    bytes(output, &[v])
}

/// Writes a u16 in given output.
pub fn le_u16<W: Write>(output: &mut W, v: u16) -> Result<usize> {
    bytes(output, &v.to_le_bytes())
}

/// Writes a u32 in given output.
pub fn le_u32<W: Write>(output: &mut W, v: u32) -> Result<usize> {
    bytes(output, &v.to_le_bytes())
}

/// Writes a u32 in given output, in uleb128 format.
pub fn uleb128<W: Write>(output: &mut W, v: u32) -> Result<usize> {
    let mut buf = Vec::with_capacity(5);
    encode_uleb128(&mut buf, v);
    bytes(output, &buf)
}

/// Writes an optional u32 in given output, in uleb128p1 format.
pub fn uleb128p1<W: Write>(output: &mut W, v: Option<u32>) -> Result<usize> {
    match v {
        None => le_u8(output, 0x00),
        Some(v) => uleb128(output, v.wrapping_add(1)),
    }
}

/// Write a i32 in given output, in sleb128 format.
pub fn sleb128<W: Write>(output: &mut W, v: i32) -> Result<usize> {
    let mut buf = Vec::with_capacity(5);
    encode_sleb128(&mut buf, v);
    bytes(output, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tag_writer() {
        let mut buf = Vec::new();
        assert!(tag(&mut buf, "dex\n").is_ok());
        assert_eq!(buf, vec![0x64, 0x65, 0x78, 0x0a]);
    }

    #[test]
    fn le_u16_writer() {
        let mut buf = Vec::new();
        assert!(le_u16(&mut buf, 0x88b8u16).is_ok());
        assert_eq!(buf, vec![0xb8, 0x88]);
    }

    #[test]
    fn le_u32_writer() {
        let mut buf = Vec::new();
        assert!(le_u32(&mut buf, 0x12345678u32).is_ok());
        assert_eq!(buf, vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn uleb128_writer() {
        let mut buf = Vec::new();
        assert_eq!(uleb128(&mut buf, 127).unwrap(), 1);
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        assert_eq!(uleb128(&mut buf, 16256).unwrap(), 2);
        assert_eq!(buf, vec![0x80, 0x7f]);
    }

    #[test]
    fn uleb128p1_writer() {
        let mut buf = Vec::new();
        assert!(uleb128p1(&mut buf, None).is_ok());
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        assert!(uleb128p1(&mut buf, Some(0)).is_ok());
        assert_eq!(buf, vec![0x01]);

        buf.clear();
        assert!(uleb128p1(&mut buf, Some(16255)).is_ok());
        assert_eq!(buf, vec![0x80, 0x7f]);
    }

    #[test]
    fn sleb128_writer() {
        let mut buf = Vec::new();
        assert!(sleb128(&mut buf, -1).is_ok());
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        assert!(sleb128(&mut buf, -128).is_ok());
        assert_eq!(buf, vec![0x80, 0x7f]);
    }

    #[test]
    fn alignment() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(1, 4), 4);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(9, 8), 16);
        assert_eq!(checked_round_up(u32::MAX, 4), None);
        assert_eq!(checked_round_up(13, 4), Some(16));

        let mut cursor = Cursor::new(Vec::new());
        le_u8(&mut cursor, 1).unwrap();
        assert_eq!(align4(&mut cursor).unwrap(), 3);
        assert_eq!(align4(&mut cursor).unwrap(), 0);
        assert_eq!(align8(&mut cursor).unwrap(), 4);
        assert_eq!(cursor.into_inner(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }
}
