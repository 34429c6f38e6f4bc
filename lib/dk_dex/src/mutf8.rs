use crate::errors::{DexError, DexResult};

// Decodes a non-null-terminated MUTF-8 buffer into UTF-16 code units.
// Surrogate pairs are not valid Rust chars, so the decoded form stays a
// vector of u16 until it is converted for display.
pub(crate) fn decode(inp: &[u8]) -> DexResult<Vec<u16>> {
    let mut i = 0;
    let mut buf: Vec<u16> = Vec::new();

    while i < inp.len() {
        let a = inp[i];
        i += 1;

        if a == 0 {
            return Err(DexError::InvalidMutf8(
                "null-byte in a non-null terminated string".to_string(),
            ));
        }

        if a < 0x80 {
            buf.push(u16::from(a));
        } else if (a & 0xe0) == 0xc0 {
            let b = *inp.get(i).ok_or_else(|| {
                DexError::InvalidMutf8("not enough data to read 2-points char".to_string())
            })?;
            i += 1;
            if (b & 0xc0) != 0x80 {
                return Err(DexError::InvalidMutf8("bad second byte".to_string()));
            }
            buf.push((u16::from(a & 0x1f) << 6) | u16::from(b & 0x3f));
        } else if (a & 0xf0) == 0xe0 {
            if i + 2 > inp.len() {
                return Err(DexError::InvalidMutf8(
                    "not enough data to read 3-points char".to_string(),
                ));
            }
            let b = inp[i];
            let c = inp[i + 1];
            i += 2;
            if ((b & 0xc0) != 0x80) || ((c & 0xc0) != 0x80) {
                return Err(DexError::InvalidMutf8(
                    "bad second or third byte".to_string(),
                ));
            }
            buf.push(
                (u16::from(a & 0x0f) << 12) | (u16::from(b & 0x3f) << 6) | u16::from(c & 0x3f),
            );
        } else {
            return Err(DexError::InvalidMutf8("bad byte".to_string()));
        }
    }

    Ok(buf)
}

/// Encodes a Rust string to MUTF-8 (U+0000 on two bytes, supplementary
/// characters as two encoded surrogates).
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode(s: &str) -> Vec<u8> {
    let mut buf = Vec::new();

    for c in s.encode_utf16() {
        if c != 0 && c <= 127 {
            buf.push(c as u8);
        } else if c <= 2047 {
            buf.push((0xc0 | (0x1f & (c >> 6))) as u8);
            buf.push((0x80 | (0x3f & c)) as u8);
        } else {
            buf.push((0xe0 | (0x0f & (c >> 12))) as u8);
            buf.push((0x80 | (0x3f & (c >> 6))) as u8);
            buf.push((0x80 | (0x3f & c)) as u8);
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutf8_roundtrip() {
        for s in ["", "Ljava/lang/Object;", "h\u{e9}llo", "\u{20ac}", "a\u{0}b", "\u{1f600}"] {
            let enc = encode(s);
            assert!(!enc.contains(&0));
            let dec = decode(&enc).unwrap();
            assert_eq!(String::from_utf16(&dec).unwrap(), s);
        }
    }

    #[test]
    fn mutf8_truncated() {
        assert!(decode(&[0xc3]).is_err());
        assert!(decode(&[0xe2, 0x82]).is_err());
        assert!(decode(&[0x41, 0x00]).is_err());
    }
}
