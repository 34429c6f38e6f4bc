//! Read-only view over the bytes of a dex container.

use crate::errors::{DexError, DexResult};
use crate::ir::{AnnotationItem, DebugInfoItem, EncodedArrayItem, Item};
use crate::map::{MapItem, MapItemType};
use crate::parsers::*;
use crate::raw::*;
use nom::{Finish, IResult, Offset};
use sha1::{Digest, Sha1};

/// Options of [`DexFile::open_with`].
#[derive(Debug, Clone, Copy)]
pub struct DexFileOptions {
    /// Fail on a header checksum mismatch (a mismatch is otherwise only
    /// logged).
    pub verify_checksum: bool,
}

impl Default for DexFileOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
        }
    }
}

/// A validated dex container. Every accessor is bound-checked against the
/// container and the header tables.
#[derive(Debug)]
pub struct DexFile<'a> {
    data: &'a [u8],
    header: HeaderItem,
    map: Vec<MapItem>,
}

/// Adler-32 checksum of a container, computed after the magic and checksum
/// fields.
pub fn compute_checksum(data: &[u8]) -> DexResult<u32> {
    let tail = data.get(12..).ok_or(DexError::ShortBuffer {
        required: HEADER_SIZE as usize,
        available: data.len(),
    })?;
    Ok(adler32::adler32(tail)?)
}

/// SHA-1 signature of a container, computed after the signature field.
pub fn compute_signature(data: &[u8]) -> DexResult<[u8; 20]> {
    let tail = data.get(32..).ok_or(DexError::ShortBuffer {
        required: HEADER_SIZE as usize,
        available: data.len(),
    })?;
    let mut hasher = Sha1::new();
    hasher.update(tail);
    let mut signature = [0; 20];
    signature.copy_from_slice(&hasher.finalize());
    Ok(signature)
}

impl<'a> DexFile<'a> {
    pub fn open(data: &'a [u8]) -> DexResult<Self> {
        Self::open_with(data, DexFileOptions::default())
    }

    pub fn open_with(data: &'a [u8], options: DexFileOptions) -> DexResult<Self> {
        if data.len() < HEADER_SIZE as usize {
            return Err(DexError::ShortBuffer {
                required: HEADER_SIZE as usize,
                available: data.len(),
            });
        }
        let (_, header) = header_item_parser(data).finish()?;

        if header.header_size != HEADER_SIZE {
            return Err(DexError::BadSize("header".to_string()));
        }
        if header.endian_tag != ENDIAN_CONSTANT {
            return Err(DexError::Structure(format!(
                "unsupported endian tag {:#010x}",
                header.endian_tag
            )));
        }
        if header.file_size < HEADER_SIZE {
            return Err(DexError::BadSize("file".to_string()));
        }
        if header.file_size as usize > data.len() {
            return Err(DexError::ShortBuffer {
                required: header.file_size as usize,
                available: data.len(),
            });
        }
        if header.link_size != 0 {
            log::warn!("dex has a non-null link size, link data is dropped");
        }

        let data = &data[..header.file_size as usize];
        check_table(&header, "string ids", header.string_ids_size, header.string_ids_off, STRING_ID_ITEM_SIZE)?;
        check_table(&header, "type ids", header.type_ids_size, header.type_ids_off, TYPE_ID_ITEM_SIZE)?;
        check_table(&header, "proto ids", header.proto_ids_size, header.proto_ids_off, PROTO_ID_ITEM_SIZE)?;
        check_table(&header, "field ids", header.field_ids_size, header.field_ids_off, FIELD_ID_ITEM_SIZE)?;
        check_table(&header, "method ids", header.method_ids_size, header.method_ids_off, METHOD_ID_ITEM_SIZE)?;
        check_table(&header, "class defs", header.class_defs_size, header.class_defs_off, CLASS_DEF_ITEM_SIZE)?;
        check_table(&header, "data", header.data_size, header.data_off, 1)?;

        let checksum = compute_checksum(data)?;
        if checksum != header.checksum {
            if options.verify_checksum {
                return Err(DexError::BadChecksum {
                    expected: header.checksum,
                    computed: checksum,
                });
            }
            log::warn!(
                "bad dex checksum (expected {:#010x}, computed {:#010x})",
                header.checksum,
                checksum
            );
        }
        if compute_signature(data)? != header.signature {
            log::warn!("dex signature does not match its content");
        }

        let map = if header.map_off == 0 {
            Vec::new()
        } else {
            if header.map_off % 4 != 0 {
                return Err(DexError::InvalidOffset("map list".to_string()));
            }
            let input = data
                .get(header.map_off as usize..)
                .ok_or_else(|| DexError::InvalidOffset("map list".to_string()))?;
            map_list_parser(input).finish()?.1
        };

        log::debug!(
            "opened dex version {:03} ({} bytes, {} classes)",
            header.version,
            header.file_size,
            header.class_defs_size
        );

        Ok(Self { data, header, map })
    }

    pub fn header(&self) -> &HeaderItem {
        &self.header
    }

    /// Bytes of the container, `file_size` long.
    pub fn begin(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn map_list(&self) -> &[MapItem] {
        &self.map
    }

    /// Map entry of a section, if listed.
    pub fn map_item(&self, typ: MapItemType) -> Option<&MapItem> {
        self.map.iter().find(|item| item.typ == typ)
    }

    pub fn num_string_ids(&self) -> u32 {
        self.header.string_ids_size
    }

    pub fn num_type_ids(&self) -> u32 {
        self.header.type_ids_size
    }

    pub fn num_proto_ids(&self) -> u32 {
        self.header.proto_ids_size
    }

    pub fn num_field_ids(&self) -> u32 {
        self.header.field_ids_size
    }

    pub fn num_method_ids(&self) -> u32 {
        self.header.method_ids_size
    }

    pub fn num_class_defs(&self) -> u32 {
        self.header.class_defs_size
    }

    pub fn num_call_site_ids(&self) -> u32 {
        self.map_item(MapItemType::CallSiteIdItem)
            .map_or(0, |item| item.size)
    }

    pub fn num_method_handles(&self) -> u32 {
        self.map_item(MapItemType::MethodHandleItem)
            .map_or(0, |item| item.size)
    }

    fn at(&self, offset: u32, what: &str) -> DexResult<&'a [u8]> {
        if offset < HEADER_SIZE {
            return Err(DexError::InvalidOffset(format!("{what} at {offset:#x}")));
        }
        self.data
            .get(offset as usize..)
            .ok_or_else(|| DexError::InvalidOffset(format!("{what} at {offset:#x}")))
    }

    fn parse_at<T, P>(&self, offset: u32, what: &str, parser: P) -> DexResult<(T, u32)>
    where
        P: Fn(&'a [u8]) -> IResult<&'a [u8], T, DexError>,
    {
        let input = self.at(offset, what)?;
        let (rest, value) = parser(input).finish()?;
        Ok((value, input.offset(rest) as u32))
    }

    // Offset of the `index`-th record of a fixed-size table.
    fn record(
        &self,
        kind: &'static str,
        index: u32,
        size: u32,
        off: u32,
        item_size: u32,
    ) -> DexResult<u32> {
        if index >= size {
            return Err(DexError::out_of_range(kind, index, size as usize));
        }
        index
            .checked_mul(item_size)
            .and_then(|delta| delta.checked_add(off))
            .ok_or_else(|| DexError::Overflow(format!("{kind} #{index} offset")))
    }

    pub fn string_id_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("string id", index, h.string_ids_size, h.string_ids_off, STRING_ID_ITEM_SIZE)
    }

    pub fn type_id_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("type id", index, h.type_ids_size, h.type_ids_off, TYPE_ID_ITEM_SIZE)
    }

    pub fn proto_id_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("proto id", index, h.proto_ids_size, h.proto_ids_off, PROTO_ID_ITEM_SIZE)
    }

    pub fn field_id_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("field id", index, h.field_ids_size, h.field_ids_off, FIELD_ID_ITEM_SIZE)
    }

    pub fn method_id_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("method id", index, h.method_ids_size, h.method_ids_off, METHOD_ID_ITEM_SIZE)
    }

    pub fn class_def_offset(&self, index: u32) -> DexResult<u32> {
        let h = &self.header;
        self.record("class def", index, h.class_defs_size, h.class_defs_off, CLASS_DEF_ITEM_SIZE)
    }

    pub fn call_site_id_offset(&self, index: u32) -> DexResult<u32> {
        let item = self
            .map_item(MapItemType::CallSiteIdItem)
            .ok_or_else(|| DexError::out_of_range("call site id", index, 0))?;
        self.record("call site id", index, item.size, item.offset, CALL_SITE_ID_ITEM_SIZE)
    }

    pub fn method_handle_offset(&self, index: u32) -> DexResult<u32> {
        let item = self
            .map_item(MapItemType::MethodHandleItem)
            .ok_or_else(|| DexError::out_of_range("method handle", index, 0))?;
        self.record("method handle", index, item.size, item.offset, METHOD_HANDLE_ITEM_SIZE)
    }

    /// Offset of the string data of the `index`-th string.
    pub fn string_data_offset(&self, index: u32) -> DexResult<u32> {
        let off = self.string_id_offset(index)?;
        Ok(self.parse_at(off, "string id", nom::number::complete::le_u32)?.0)
    }

    /// MUTF-8 payload of the `index`-th string, with its declared UTF-16
    /// length and its on-disk size.
    pub fn string_data(&self, index: u32) -> DexResult<(&'a [u8], u32, u32)> {
        let off = self.string_data_offset(index)?;
        let ((utf16_len, data), size) = self.parse_at(off, "string data", string_data_item_parser)?;
        Ok((data, utf16_len, size))
    }

    pub fn type_id(&self, index: u32) -> DexResult<u32> {
        let off = self.type_id_offset(index)?;
        Ok(self.parse_at(off, "type id", nom::number::complete::le_u32)?.0)
    }

    pub fn proto_id(&self, index: u32) -> DexResult<ProtoIdItem> {
        let off = self.proto_id_offset(index)?;
        Ok(self.parse_at(off, "proto id", proto_id_item_parser)?.0)
    }

    pub fn field_id(&self, index: u32) -> DexResult<FieldIdItem> {
        let off = self.field_id_offset(index)?;
        Ok(self.parse_at(off, "field id", field_id_item_parser)?.0)
    }

    pub fn method_id(&self, index: u32) -> DexResult<MethodIdItem> {
        let off = self.method_id_offset(index)?;
        Ok(self.parse_at(off, "method id", method_id_item_parser)?.0)
    }

    pub fn class_def(&self, index: u32) -> DexResult<ClassDefItem> {
        let off = self.class_def_offset(index)?;
        Ok(self.parse_at(off, "class def", class_def_item_parser)?.0)
    }

    /// Offset of the encoded array holding the `index`-th call site.
    pub fn call_site_id(&self, index: u32) -> DexResult<u32> {
        let off = self.call_site_id_offset(index)?;
        Ok(self.parse_at(off, "call site id", nom::number::complete::le_u32)?.0)
    }

    pub fn method_handle(&self, index: u32) -> DexResult<MethodHandleItem> {
        let off = self.method_handle_offset(index)?;
        Ok(self.parse_at(off, "method handle", method_handle_item_parser)?.0)
    }

    /// Type indices of a type list, with the list size in bytes.
    pub fn type_list(&self, offset: u32) -> DexResult<(Vec<u16>, u32)> {
        self.check_aligned(offset, "type list")?;
        self.parse_at(offset, "type list", type_list_parser)
    }

    pub fn class_data(&self, offset: u32) -> DexResult<ClassDataItem> {
        Ok(self.parse_at(offset, "class data", class_data_item_parser)?.0)
    }

    pub fn code_item(&self, offset: u32) -> DexResult<CodeItem> {
        self.check_aligned(offset, "code item")?;
        Ok(self.parse_at(offset, "code item", code_item_parser(offset))?.0)
    }

    pub fn debug_info(&self, offset: u32) -> DexResult<DebugInfoItem> {
        self.parse_item(offset, debug_info_item_parser)
    }

    pub fn encoded_array(&self, offset: u32) -> DexResult<EncodedArrayItem> {
        self.parse_item(offset, encoded_array_item_parser)
    }

    pub fn annotation(&self, offset: u32) -> DexResult<AnnotationItem> {
        self.parse_item(offset, annotation_item_parser)
    }

    /// Annotation item offsets of an annotation set, with the set size.
    pub fn annotation_set(&self, offset: u32) -> DexResult<(Vec<u32>, u32)> {
        self.check_aligned(offset, "annotation set")?;
        self.parse_at(offset, "annotation set", offset_list_parser)
    }

    /// Annotation set offsets of a ref list, with the list size.
    pub fn annotation_set_ref_list(&self, offset: u32) -> DexResult<(Vec<u32>, u32)> {
        self.check_aligned(offset, "annotation set ref list")?;
        self.parse_at(offset, "annotation set ref list", offset_list_parser)
    }

    pub fn annotations_directory(&self, offset: u32) -> DexResult<AnnotationsDirectoryItem> {
        self.check_aligned(offset, "annotations directory")?;
        Ok(self
            .parse_at(offset, "annotations directory", annotations_directory_item_parser)?
            .0)
    }

    fn parse_item<T, P>(&self, offset: u32, parser: P) -> DexResult<T>
    where
        T: Item,
        P: Fn(&'a [u8]) -> IResult<&'a [u8], T, DexError>,
    {
        let (mut item, size) = self.parse_at(offset, T::KIND, parser)?;
        item.set_offset(offset);
        item.set_size(size);
        Ok(item)
    }

    fn check_aligned(&self, offset: u32, what: &str) -> DexResult<()> {
        if offset % 4 != 0 {
            return Err(DexError::InvalidOffset(format!(
                "{what} at {offset:#x} is not 4-byte aligned"
            )));
        }
        Ok(())
    }
}

fn check_table(header: &HeaderItem, name: &str, size: u32, off: u32, item_size: u32) -> DexResult<()> {
    if size == 0 {
        return Ok(());
    }
    let end = size
        .checked_mul(item_size)
        .and_then(|len| len.checked_add(off))
        .ok_or_else(|| DexError::Overflow(format!("{name} table bounds")))?;
    if off < HEADER_SIZE || end > header.file_size {
        return Err(DexError::InvalidOffset(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(method_ids_size: u32, method_ids_off: u32) -> HeaderItem {
        HeaderItem {
            magic: *b"dex\n035\0",
            version: 35,
            checksum: 0,
            signature: [0; 20],
            file_size: u32::MAX,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off: 0,
            string_ids_size: 0,
            string_ids_off: 0,
            type_ids_size: 0,
            type_ids_off: 0,
            proto_ids_size: 0,
            proto_ids_off: 0,
            field_ids_size: 0,
            field_ids_off: 0,
            method_ids_size,
            method_ids_off,
            class_defs_size: 0,
            class_defs_off: 0,
            data_size: 0,
            data_off: 0,
        }
    }

    #[test]
    fn record_offsets() {
        let dex = DexFile {
            data: &[],
            header: header(4, 0x70),
            map: Vec::new(),
        };
        assert_eq!(dex.method_id_offset(0).unwrap(), 0x70);
        assert_eq!(dex.method_id_offset(3).unwrap(), 0x70 + 3 * METHOD_ID_ITEM_SIZE);
        assert!(matches!(
            dex.method_id_offset(4),
            Err(DexError::IndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn record_offsets_overflow() {
        let dex = DexFile {
            data: &[],
            header: header(u32::MAX, u32::MAX - 4),
            map: Vec::new(),
        };
        assert!(matches!(dex.method_id_offset(1), Err(DexError::Overflow(_))));
        assert!(matches!(
            dex.method_id_offset(u32::MAX / 2),
            Err(DexError::Overflow(_))
        ));

        let h = header(u32::MAX, 0x70);
        assert!(matches!(
            check_table(&h, "method ids", h.method_ids_size, h.method_ids_off, METHOD_ID_ITEM_SIZE),
            Err(DexError::Overflow(_))
        ));
    }
}
