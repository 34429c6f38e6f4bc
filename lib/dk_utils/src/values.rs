//! Variable-width encodings used by dex encoded values.
//!
//! Integers keep their low-order bytes: as few as needed so that sign
//! extension (or zero extension for unsigned values) gives back the
//! original value. Floating point values keep their high-order bytes
//! instead: zero bytes are dropped from the low end of the IEEE754
//! representation, and readers zero-extend on the right.

#[allow(clippy::cast_possible_truncation)]
fn encode_signed(value: i64) -> Vec<u8> {
    let mut v = value;
    let mut out = Vec::with_capacity(8);
    if v >= 0 {
        while v > 0x7f {
            out.push(v as u8);
            v >>= 8;
        }
    } else {
        while v < -0x80 {
            out.push(v as u8);
            v >>= 8;
        }
    }
    out.push(v as u8);
    out
}

/// Minimal two's-complement bytes of `value`, little-endian.
pub fn encode_int_value(value: i32) -> Vec<u8> {
    encode_signed(i64::from(value))
}

/// Minimal two's-complement bytes of `value`, little-endian.
pub fn encode_long_value(value: i64) -> Vec<u8> {
    encode_signed(value)
}

/// Minimal bytes of `value`, little-endian, at least one byte.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_uint_value(value: u32) -> Vec<u8> {
    let mut v = value;
    let mut out = Vec::with_capacity(4);
    loop {
        out.push(v as u8);
        v >>= 8;
        if v == 0 {
            break;
        }
    }
    out
}

fn encode_high_bytes(le: &[u8]) -> Vec<u8> {
    let start = le
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(le.len() - 1);
    le[start..].to_vec()
}

/// High-order bytes of the IEEE754 representation of `value`.
pub fn encode_float_value(value: f32) -> Vec<u8> {
    encode_high_bytes(&value.to_bits().to_le_bytes())
}

/// High-order bytes of the IEEE754 representation of `value`.
pub fn encode_double_value(value: f64) -> Vec<u8> {
    encode_high_bytes(&value.to_bits().to_le_bytes())
}

fn read_var_width(bytes: &[u8], width: usize) -> u64 {
    bytes
        .iter()
        .take(width)
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[allow(clippy::cast_possible_wrap)]
fn sign_extend(value: u64, len: usize) -> i64 {
    if len == 0 || len >= 8 {
        return value as i64;
    }
    let shift = (8 - len) * 8;
    ((value << shift) as i64) >> shift
}

/// Reads back a value written by [`encode_int_value`].
#[allow(clippy::cast_possible_truncation)]
pub fn decode_int_value(bytes: &[u8]) -> i32 {
    let len = bytes.len().min(4);
    sign_extend(read_var_width(bytes, len), len) as i32
}

/// Reads back a value written by [`encode_long_value`].
pub fn decode_long_value(bytes: &[u8]) -> i64 {
    let len = bytes.len().min(8);
    sign_extend(read_var_width(bytes, len), len)
}

/// Reads back a value written by [`encode_uint_value`].
#[allow(clippy::cast_possible_truncation)]
pub fn decode_uint_value(bytes: &[u8]) -> u32 {
    read_var_width(bytes, 4) as u32
}

/// Reads back a value written by [`encode_float_value`].
#[allow(clippy::cast_possible_truncation)]
pub fn decode_float_value(bytes: &[u8]) -> f32 {
    let len = bytes.len().min(4);
    let raw = read_var_width(bytes, len) as u32;
    let shift = (4 - len) * 8;
    f32::from_bits(if shift == 32 { 0 } else { raw << shift })
}

/// Reads back a value written by [`encode_double_value`].
pub fn decode_double_value(bytes: &[u8]) -> f64 {
    let len = bytes.len().min(8);
    let raw = read_var_width(bytes, len);
    let shift = (8 - len) * 8;
    f64::from_bits(if shift == 64 { 0 } else { raw << shift })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_value_minimal_bytes() {
        assert_eq!(encode_int_value(0), vec![0x00]);
        assert_eq!(encode_int_value(-1), vec![0xff]);
        assert_eq!(encode_int_value(127), vec![0x7f]);
        assert_eq!(encode_int_value(128), vec![0x80, 0x00]);
        assert_eq!(encode_int_value(-128), vec![0x80]);
        assert_eq!(encode_int_value(-129), vec![0x7f, 0xff]);
        assert_eq!(encode_int_value(i32::MIN), vec![0x00, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn long_value_minimal_bytes() {
        assert_eq!(encode_long_value(-1), vec![0xff]);
        assert_eq!(encode_long_value(128), vec![0x80, 0x00]);
        assert_eq!(encode_long_value(0x1_0000_0000), vec![0, 0, 0, 0, 1]);
        assert_eq!(encode_long_value(i64::MAX).len(), 8);
    }

    #[test]
    fn uint_value_minimal_bytes() {
        assert_eq!(encode_uint_value(0), vec![0x00]);
        assert_eq!(encode_uint_value(0xff), vec![0xff]);
        assert_eq!(encode_uint_value(0x100), vec![0x00, 0x01]);
    }

    #[test]
    fn float_value_keeps_high_bytes() {
        // 1.0f32 is 0x3f800000
        assert_eq!(encode_float_value(1.0), vec![0x80, 0x3f]);
        assert_eq!(encode_float_value(0.0), vec![0x00]);
        // 1.0f64 is 0x3ff0000000000000
        assert_eq!(encode_double_value(1.0), vec![0xf0, 0x3f]);
        assert_eq!(encode_double_value(0.1).len(), 8);
    }

    #[test]
    fn values_roundtrip() {
        for v in [0, 1, -1, 127, 128, -128, -129, 0x7fff, 0x8000, i32::MAX, i32::MIN] {
            assert_eq!(decode_int_value(&encode_int_value(v)), v);
        }
        for v in [0i64, -1, 1 << 40, -(1 << 40), i64::MAX, i64::MIN] {
            assert_eq!(decode_long_value(&encode_long_value(v)), v);
        }
        for v in [0u32, 1, 0xffff, 0x10000, u32::MAX] {
            assert_eq!(decode_uint_value(&encode_uint_value(v)), v);
        }
        for v in [0.0f32, 1.0, -2.5, 3.141_592_7, f32::MAX, f32::MIN_POSITIVE] {
            assert_eq!(decode_float_value(&encode_float_value(v)), v);
        }
        for v in [0.0f64, 1.0, -2.5, 0.1, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(decode_double_value(&encode_double_value(v)), v);
        }
    }
}
