//! Vdex header: magic, version, section sizes and dex checksums.

use crate::errors::{VdexError, VdexResult};
use dk_utils::writers::{bytes, le_u32};
use nom::bytes::complete::{tag, take};
use nom::multi::count;
use nom::number::complete::le_u32 as parse_u32;
use nom::{Finish, IResult};
use std::io::Write;

pub const VDEX_MAGIC: &[u8; 4] = b"vdex";
pub const VDEX_VERSION: &[u8; 4] = b"019\0";

/// Size of the header fields preceding the dex checksums.
pub const FIXED_HEADER_SIZE: u32 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdexHeader {
    pub number_of_dex_files: u32,
    pub dex_size: u32,
    pub verifier_deps_size: u32,
    pub quickening_info_size: u32,
    pub dex_checksums: Vec<u32>,
}

/// Byte ranges of the vdex sections, as absolute offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdexSections {
    pub dex_begin: usize,
    pub verifier_deps_begin: usize,
    pub quickening_info_begin: usize,
    pub end: usize,
}

impl VdexHeader {
    pub fn size(&self) -> u32 {
        FIXED_HEADER_SIZE + 4 * self.number_of_dex_files
    }

    /// Section layout, checked against a buffer of `available` bytes.
    pub fn sections(&self, available: usize) -> VdexResult<VdexSections> {
        let overflow = || VdexError::Overflow("vdex section offsets".to_string());

        let dex_begin = self.size() as usize;
        let verifier_deps_begin = dex_begin
            .checked_add(self.dex_size as usize)
            .ok_or_else(overflow)?;
        let quickening_info_begin = verifier_deps_begin
            .checked_add(self.verifier_deps_size as usize)
            .ok_or_else(overflow)?;
        let end = quickening_info_begin
            .checked_add(self.quickening_info_size as usize)
            .ok_or_else(overflow)?;

        if end > available {
            return Err(VdexError::ShortBuffer {
                required: end,
                available,
            });
        }
        Ok(VdexSections {
            dex_begin,
            verifier_deps_begin,
            quickening_info_begin,
            end,
        })
    }
}

fn magic_parser(input: &[u8]) -> IResult<&[u8], (), VdexError> {
    let (input, _) = tag(&VDEX_MAGIC[..])(input)
        .map_err(|_: nom::Err<VdexError>| nom::Err::Error(VdexError::BadMagic))?;
    let (input, version) = take(4usize)(input)?;
    if version != VDEX_VERSION {
        let mut v = [0; 4];
        v.copy_from_slice(version);
        return Err(nom::Err::Error(VdexError::BadVersion(v)));
    }
    Ok((input, ()))
}

pub(crate) fn vdex_header_parser(input: &[u8]) -> IResult<&[u8], VdexHeader, VdexError> {
    let (input, _) = magic_parser(input)?;
    let (input, number_of_dex_files) = parse_u32(input)?;
    let (input, dex_size) = parse_u32(input)?;
    let (input, verifier_deps_size) = parse_u32(input)?;
    let (input, quickening_info_size) = parse_u32(input)?;
    let (input, dex_checksums) = count(parse_u32, number_of_dex_files as usize)(input)?;

    Ok((
        input,
        VdexHeader {
            number_of_dex_files,
            dex_size,
            verifier_deps_size,
            quickening_info_size,
            dex_checksums,
        },
    ))
}

pub fn parse_header(data: &[u8]) -> VdexResult<VdexHeader> {
    if data.len() < FIXED_HEADER_SIZE as usize {
        return Err(VdexError::ShortBuffer {
            required: FIXED_HEADER_SIZE as usize,
            available: data.len(),
        });
    }
    Ok(vdex_header_parser(data).finish()?.1)
}

pub(crate) fn vdex_header_writer<W: Write>(output: &mut W, header: &VdexHeader) -> VdexResult<usize> {
    debug_assert_eq!(header.dex_checksums.len(), header.number_of_dex_files as usize);

    let mut siz = 0;
    siz += bytes(output, VDEX_MAGIC)?;
    siz += bytes(output, VDEX_VERSION)?;
    siz += le_u32(output, header.number_of_dex_files)?;
    siz += le_u32(output, header.dex_size)?;
    siz += le_u32(output, header.verifier_deps_size)?;
    siz += le_u32(output, header.quickening_info_size)?;
    for checksum in &header.dex_checksums {
        siz += le_u32(output, *checksum)?;
    }
    Ok(siz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> VdexHeader {
        VdexHeader {
            number_of_dex_files: 2,
            dex_size: 0x100,
            verifier_deps_size: 4,
            quickening_info_size: 8,
            dex_checksums: vec![0xdead_beef, 0x1234_5678],
        }
    }

    #[test]
    fn header_roundtrip() {
        let mut out = Vec::new();
        let siz = vdex_header_writer(&mut out, &header()).unwrap();
        assert_eq!(siz, 32);
        assert_eq!(&out[..8], b"vdex019\0");
        assert_eq!(parse_header(&out).unwrap(), header());
    }

    #[test]
    fn bad_magic_and_version() {
        let mut out = Vec::new();
        vdex_header_writer(&mut out, &header()).unwrap();

        let mut bad = out.clone();
        bad[0] = b'x';
        assert!(matches!(parse_header(&bad), Err(VdexError::BadMagic)));

        let mut bad = out;
        bad[5] = b'2';
        assert!(matches!(parse_header(&bad), Err(VdexError::BadVersion(v)) if &v == b"029\0"));
    }

    #[test]
    fn sections_are_bounded() {
        let h = header();
        let sections = h.sections(0x200).unwrap();
        assert_eq!(sections.dex_begin, 32);
        assert_eq!(sections.verifier_deps_begin, 0x120);
        assert_eq!(sections.quickening_info_begin, 0x124);
        assert_eq!(sections.end, 0x12c);
        assert!(matches!(
            h.sections(0x12b),
            Err(VdexError::ShortBuffer { required: 0x12c, .. })
        ));

        let huge = VdexHeader {
            dex_size: u32::MAX,
            quickening_info_size: u32::MAX,
            verifier_deps_size: u32::MAX,
            ..header()
        };
        assert!(huge.sections(0x200).is_err());
    }
}
