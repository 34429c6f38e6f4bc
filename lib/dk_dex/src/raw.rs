//! On-disk records, as read from a container before any cross-reference
//! is resolved. Indices and offsets are kept as raw integers.

use crate::ir::CatchHandler;

/// Size of the fixed header record.
pub const HEADER_SIZE: u32 = 0x70;
/// Expected value of the header endian tag.
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;
/// "No index" marker used by optional fixed-width index fields.
pub const NO_INDEX: u32 = 0xFFFF_FFFF;
/// "No index" marker of 16-bit index fields.
pub const NO_INDEX16: u16 = 0xFFFF;

pub const STRING_ID_ITEM_SIZE: u32 = 4;
pub const TYPE_ID_ITEM_SIZE: u32 = 4;
pub const PROTO_ID_ITEM_SIZE: u32 = 12;
pub const FIELD_ID_ITEM_SIZE: u32 = 8;
pub const METHOD_ID_ITEM_SIZE: u32 = 8;
pub const CLASS_DEF_ITEM_SIZE: u32 = 32;
pub const CALL_SITE_ID_ITEM_SIZE: u32 = 4;
pub const METHOD_HANDLE_ITEM_SIZE: u32 = 8;
pub const MAP_ITEM_SIZE: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderItem {
    pub magic: [u8; 8],
    pub version: u32,
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHandleItem {
    pub method_handle_type: u16,
    pub field_or_method_id: u16,
}

/// A class data member, with its index already un-delta'd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
    pub size: u32,
}

impl ClassDataItem {
    /// All methods, direct ones first.
    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler_off: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    /// Catch handlers keyed by their offset from the start of the handler list.
    pub handlers: Vec<(u16, CatchHandler)>,
    /// Offset of the first instruction code unit, from the container start.
    pub insns_off: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationOffItem {
    pub idx: u32,
    pub annotations_off: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationsDirectoryItem {
    pub class_annotations_off: u32,
    pub field_annotations: Vec<AnnotationOffItem>,
    pub method_annotations: Vec<AnnotationOffItem>,
    pub parameter_annotations: Vec<AnnotationOffItem>,
    pub size: u32,
}
