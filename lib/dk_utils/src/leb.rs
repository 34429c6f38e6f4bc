//! LEB128 variable-length integers.
//!
//! Encoded values are at most 5 bytes long (32-bit payload). Unsigned
//! values are encoded on the minimal number of bytes, signed ones on the
//! minimal number of bytes that still sign-extends to the original value.

use thiserror::Error;

/// Maximum encoded length of a 32-bit LEB128 value.
pub const MAX_LEB128_SIZE: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LebError {
    #[error("truncated leb128 value")]
    Truncated,

    #[error("leb128 value is longer than {MAX_LEB128_SIZE} bytes")]
    TooLong,
}

/// A decoded unsigned LEB128 value, along with its encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uleb128 {
    value: u32,
    size: usize,
}

impl Uleb128 {
    pub fn new(value: u32, size_hint: Option<usize>) -> Self {
        let needed_size = uleb128_size(value);
        let size = if let Some(hint) = size_hint {
            std::cmp::max(needed_size, hint)
        } else {
            needed_size
        };
        Self { value, size }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A decoded signed LEB128 value, along with its encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleb128 {
    value: i32,
    size: usize,
}

impl Sleb128 {
    pub fn new(value: i32, size_hint: Option<usize>) -> Self {
        let needed_size = sleb128_size(value);
        let size = if let Some(hint) = size_hint {
            std::cmp::max(needed_size, hint)
        } else {
            needed_size
        };
        Self { value, size }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Minimal number of bytes needed to encode `value` as an unsigned LEB128.
pub const fn uleb128_size(value: u32) -> usize {
    if value == 0 {
        1
    } else {
        let nbits = 32 - value.leading_zeros() as usize;
        1 + ((nbits - 1) / 7)
    }
}

/// Minimal number of bytes needed to encode `value` as a signed LEB128.
pub const fn sleb128_size(value: i32) -> usize {
    // number of significant bits, sign bit included
    let x = value ^ (value >> 31);
    let nbits = 33 - x.leading_zeros() as usize;
    1 + ((nbits - 1) / 7)
}

/// Appends the minimal unsigned LEB128 encoding of `value` to `out`.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_uleb128(out: &mut Vec<u8>, value: u32) {
    let mut v = value;
    loop {
        let lo7 = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(lo7);
            break;
        }
        out.push(lo7 | 0x80);
    }
}

/// Appends the minimal signed LEB128 encoding of `value` to `out`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_sleb128(out: &mut Vec<u8>, value: i32) {
    let mut v = value;
    loop {
        let lo7 = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && lo7 & 0x40 == 0) || (v == -1 && lo7 & 0x40 != 0);
        if done {
            out.push(lo7);
            break;
        }
        out.push(lo7 | 0x80);
    }
}

/// Decodes an unsigned LEB128 at the start of `input`.
pub fn decode_uleb128(input: &[u8]) -> Result<Uleb128, LebError> {
    let mut result: u32 = 0;
    for (i, b) in input.iter().enumerate() {
        if i == MAX_LEB128_SIZE {
            return Err(LebError::TooLong);
        }
        result |= u32::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(Uleb128::new(result, Some(i + 1)));
        }
    }
    if input.len() >= MAX_LEB128_SIZE {
        Err(LebError::TooLong)
    } else {
        Err(LebError::Truncated)
    }
}

/// Decodes a signed LEB128 at the start of `input`.
#[allow(clippy::cast_possible_wrap)]
pub fn decode_sleb128(input: &[u8]) -> Result<Sleb128, LebError> {
    let mut result: u32 = 0;
    for (i, b) in input.iter().enumerate() {
        if i == MAX_LEB128_SIZE {
            return Err(LebError::TooLong);
        }
        let shift = 7 * i;
        result |= u32::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            let used = shift + 7;
            if used < 32 && b & 0x40 != 0 {
                result |= u32::MAX << used;
            }
            return Ok(Sleb128::new(result as i32, Some(i + 1)));
        }
    }
    if input.len() >= MAX_LEB128_SIZE {
        Err(LebError::TooLong)
    } else {
        Err(LebError::Truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uleb(v: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_uleb128(&mut buf, v);
        buf
    }

    fn sleb(v: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_sleb128(&mut buf, v);
        buf
    }

    #[test]
    fn uleb128_minimal_encodings() {
        assert_eq!(uleb(0), vec![0x00]);
        assert_eq!(uleb(0x7f), vec![0x7f]);
        assert_eq!(uleb(0x80), vec![0x80, 0x01]);
        assert_eq!(uleb(16256), vec![0x80, 0x7f]);
        assert_eq!(uleb(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn sleb128_minimal_encodings() {
        assert_eq!(sleb(0), vec![0x00]);
        assert_eq!(sleb(1), vec![0x01]);
        assert_eq!(sleb(-1), vec![0x7f]);
        assert_eq!(sleb(63), vec![0x3f]);
        assert_eq!(sleb(64), vec![0xc0, 0x00]);
        assert_eq!(sleb(-64), vec![0x40]);
        assert_eq!(sleb(-65), vec![0xbf, 0x7f]);
        assert_eq!(sleb(-128), vec![0x80, 0x7f]);
    }

    #[test]
    fn leb128_sizes_match_encodings() {
        for v in [0u32, 1, 0x7f, 0x80, 0x3fff, 0x4000, 0x1f_ffff, 0x20_0000, u32::MAX] {
            assert_eq!(uleb128_size(v), uleb(v).len());
        }
        for v in [0i32, 1, -1, 63, 64, -64, -65, 8191, -8192, i32::MAX, i32::MIN] {
            assert_eq!(sleb128_size(v), sleb(v).len());
        }
    }

    #[test]
    fn uleb128_roundtrip() {
        let mut v: u32 = 1;
        while v < u32::MAX / 3 {
            for w in [v - 1, v, v + 1] {
                let enc = uleb(w);
                let dec = decode_uleb128(&enc).unwrap();
                assert_eq!(dec.value(), w);
                assert_eq!(dec.size(), enc.len());
            }
            v *= 3;
        }
        assert_eq!(decode_uleb128(&uleb(u32::MAX)).unwrap().value(), u32::MAX);
    }

    #[test]
    fn sleb128_roundtrip() {
        let mut v: i32 = 1;
        while v < i32::MAX / 3 {
            for w in [v - 1, v, v + 1, -v, -v - 1] {
                let enc = sleb(w);
                let dec = decode_sleb128(&enc).unwrap();
                assert_eq!(dec.value(), w);
                assert_eq!(dec.size(), enc.len());
            }
            v *= 3;
        }
        for w in [i32::MAX, i32::MIN] {
            assert_eq!(decode_sleb128(&sleb(w)).unwrap().value(), w);
        }
    }

    #[test]
    fn leb128_malformed() {
        assert_eq!(decode_uleb128(&[]), Err(LebError::Truncated));
        assert_eq!(decode_uleb128(&[0x80, 0x80]), Err(LebError::Truncated));
        assert_eq!(
            decode_uleb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
            Err(LebError::TooLong)
        );
        assert_eq!(decode_sleb128(&[0xff]), Err(LebError::Truncated));
    }

    #[test]
    fn size_hint_keeps_larger_size() {
        assert_eq!(Uleb128::new(1, Some(3)).size(), 3);
        assert_eq!(Uleb128::new(300, Some(1)).size(), 2);
        assert_eq!(Sleb128::new(-1, None).size(), 1);
    }
}
