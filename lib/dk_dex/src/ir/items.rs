use super::{impl_item, Idx, ItemInfo};
use crate::errors::{DexError, DexResult};
use crate::mutf8;
use bitflags::bitflags;
use std::convert::TryFrom;
use std::fmt;

bitflags! {
    /// Access flags of classes, fields and methods.
    pub struct AccessFlags: u32 {
        const ACC_PUBLIC                = 0x00001;
        const ACC_PRIVATE               = 0x00002;
        const ACC_PROTECTED             = 0x00004;
        const ACC_STATIC                = 0x00008;
        const ACC_FINAL                 = 0x00010;
        const ACC_SYNCHRONIZED          = 0x00020;
        const ACC_VOLATILE              = 0x00040;
        const ACC_BRIDGE                = 0x00040;
        const ACC_TRANSIENT             = 0x00080;
        const ACC_VARARGS               = 0x00080;
        const ACC_NATIVE                = 0x00100;
        const ACC_INTERFACE             = 0x00200;
        const ACC_ABSTRACT              = 0x00400;
        const ACC_STRICT                = 0x00800;
        const ACC_SYNTHETIC             = 0x01000;
        const ACC_ANNOTATION            = 0x02000;
        const ACC_ENUM                  = 0x04000;
        const ACC_CONSTRUCTOR           = 0x10000;
        const ACC_DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// Modified UTF-8 payload of a string, without its trailing null byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringData {
    pub(crate) info: ItemInfo,
    data: Vec<u8>,
    utf16_len: u32,
}

impl StringData {
    pub fn new(s: &str) -> Self {
        let utf16_len = s.encode_utf16().count() as u32;
        Self {
            info: ItemInfo::default(),
            data: mutf8::encode(s),
            utf16_len,
        }
    }

    /// Builds a string from raw MUTF-8 bytes, which are validated.
    pub fn from_mutf8(data: Vec<u8>) -> DexResult<Self> {
        let utf16_len = u32::try_from(mutf8::decode(&data)?.len())
            .map_err(|_| DexError::Overflow("string length".to_string()))?;
        Ok(Self {
            info: ItemInfo::default(),
            data,
            utf16_len,
        })
    }

    pub fn as_mutf8(&self) -> &[u8] {
        &self.data
    }

    /// Length in UTF-16 code units, as recorded on disk.
    pub fn utf16_len(&self) -> u32 {
        self.utf16_len
    }

    pub fn to_string_lossy(&self) -> String {
        match mutf8::decode(&self.data) {
            Ok(units) => String::from_utf16_lossy(&units),
            Err(_) => String::from_utf8_lossy(&self.data).into_owned(),
        }
    }
}

impl fmt::Display for StringData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringId {
    pub(crate) info: ItemInfo,
    pub data: Idx<StringData>,
}

impl StringId {
    pub fn new(data: Idx<StringData>) -> Self {
        Self {
            info: ItemInfo::default(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeId {
    pub(crate) info: ItemInfo,
    pub descriptor: Idx<StringId>,
}

impl TypeId {
    pub fn new(descriptor: Idx<StringId>) -> Self {
        Self {
            info: ItemInfo::default(),
            descriptor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeList {
    pub(crate) info: ItemInfo,
    pub types: Vec<Idx<TypeId>>,
}

impl TypeList {
    pub fn new(types: Vec<Idx<TypeId>>) -> Self {
        Self {
            info: ItemInfo::default(),
            types,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoId {
    pub(crate) info: ItemInfo,
    pub shorty: Idx<StringId>,
    pub return_type: Idx<TypeId>,
    pub parameters: Option<Idx<TypeList>>,
}

impl ProtoId {
    pub fn new(
        shorty: Idx<StringId>,
        return_type: Idx<TypeId>,
        parameters: Option<Idx<TypeList>>,
    ) -> Self {
        Self {
            info: ItemInfo::default(),
            shorty,
            return_type,
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldId {
    pub(crate) info: ItemInfo,
    pub class: Idx<TypeId>,
    pub typ: Idx<TypeId>,
    pub name: Idx<StringId>,
    class_def: Option<Idx<ClassDef>>,
}

impl FieldId {
    pub fn new(class: Idx<TypeId>, typ: Idx<TypeId>, name: Idx<StringId>) -> Self {
        Self {
            info: ItemInfo::default(),
            class,
            typ,
            name,
            class_def: None,
        }
    }

    /// Class definition declaring this field, if any.
    pub fn class_def(&self) -> Option<Idx<ClassDef>> {
        self.class_def
    }

    /// Records the declaring class; a field belongs to at most one class.
    pub fn set_class_def(&mut self, class_def: Idx<ClassDef>) -> DexResult<()> {
        match self.class_def {
            Some(current) if current != class_def => Err(DexError::Structure(format!(
                "field declared by class defs {current} and {class_def}"
            ))),
            _ => {
                self.class_def = Some(class_def);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodId {
    pub(crate) info: ItemInfo,
    pub class: Idx<TypeId>,
    pub proto: Idx<ProtoId>,
    pub name: Idx<StringId>,
    class_def: Option<Idx<ClassDef>>,
}

impl MethodId {
    pub fn new(class: Idx<TypeId>, proto: Idx<ProtoId>, name: Idx<StringId>) -> Self {
        Self {
            info: ItemInfo::default(),
            class,
            proto,
            name,
            class_def: None,
        }
    }

    pub fn class_def(&self) -> Option<Idx<ClassDef>> {
        self.class_def
    }

    pub fn set_class_def(&mut self, class_def: Idx<ClassDef>) -> DexResult<()> {
        match self.class_def {
            Some(current) if current != class_def => Err(DexError::Structure(format!(
                "method declared by class defs {current} and {class_def}"
            ))),
            _ => {
                self.class_def = Some(class_def);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub(crate) info: ItemInfo,
    pub class_type: Idx<TypeId>,
    pub access_flags: u32,
    pub superclass: Option<Idx<TypeId>>,
    pub interfaces: Option<Idx<TypeList>>,
    pub source_file: Option<Idx<StringId>>,
    pub annotations: Option<Idx<AnnotationsDirectoryItem>>,
    pub class_data: Option<Idx<ClassData>>,
    pub static_values: Option<Idx<EncodedArrayItem>>,
}

impl ClassDef {
    pub fn new(class_type: Idx<TypeId>, access_flags: u32) -> Self {
        Self {
            info: ItemInfo::default(),
            class_type,
            access_flags,
            superclass: None,
            interfaces: None,
            source_file: None,
            annotations: None,
            class_data: None,
            static_values: None,
        }
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldItem {
    pub access_flags: u32,
    pub field: Idx<FieldId>,
}

impl FieldItem {
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodItem {
    pub access_flags: u32,
    pub method: Idx<MethodId>,
    pub code: Option<Idx<CodeItem>>,
}

impl MethodItem {
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_truncate(self.access_flags)
    }
}

/// Members of a class. Each list is sorted by ascending member index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassData {
    pub(crate) info: ItemInfo,
    pub static_fields: Vec<FieldItem>,
    pub instance_fields: Vec<FieldItem>,
    pub direct_methods: Vec<MethodItem>,
    pub virtual_methods: Vec<MethodItem>,
}

impl ClassData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldItem> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodItem> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeAddrPair {
    pub typ: Idx<TypeId>,
    pub addr: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchHandler {
    pub handlers: Vec<TypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

/// A try block; `handler` is a position in the owning [`CodeItem::handlers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handler: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem {
    pub(crate) info: ItemInfo,
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info: Option<Idx<DebugInfoItem>>,
    pub insns: Vec<u16>,
    pub tries: Vec<TryItem>,
    /// Handler lists, shared between tries.
    pub handlers: Vec<CatchHandler>,
}

impl CodeItem {
    pub fn new(registers_size: u16, ins_size: u16, outs_size: u16, insns: Vec<u16>) -> Self {
        Self {
            info: ItemInfo::default(),
            registers_size,
            ins_size,
            outs_size,
            debug_info: None,
            insns,
            tries: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbgInstr {
    EndSequence,
    AdvancePc {
        addr_diff: u32,
    },
    AdvanceLine {
        line_diff: i32,
    },
    StartLocal {
        register_num: u32,
        name: Option<Idx<StringId>>,
        typ: Option<Idx<TypeId>>,
    },
    StartLocalExtended {
        register_num: u32,
        name: Option<Idx<StringId>>,
        typ: Option<Idx<TypeId>>,
        sig: Option<Idx<StringId>>,
    },
    EndLocal {
        register_num: u32,
    },
    RestartLocal {
        register_num: u32,
    },
    SetPrologueEnd,
    SetEpilogueBegin,
    SetFile {
        name: Option<Idx<StringId>>,
    },
    Special(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfoItem {
    pub(crate) info: ItemInfo,
    pub line_start: u32,
    pub parameter_names: Vec<Option<Idx<StringId>>>,
    /// State machine bytecode, ending with [`DbgInstr::EndSequence`].
    pub bytecode: Vec<DbgInstr>,
}

impl DebugInfoItem {
    pub fn new(
        line_start: u32,
        parameter_names: Vec<Option<Idx<StringId>>>,
        bytecode: Vec<DbgInstr>,
    ) -> Self {
        Self {
            info: ItemInfo::default(),
            line_start,
            parameter_names,
            bytecode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(Idx<ProtoId>),
    MethodHandle(Idx<MethodHandleItem>),
    String(Idx<StringId>),
    Type(Idx<TypeId>),
    Field(Idx<FieldId>),
    Method(Idx<MethodId>),
    Enum(Idx<FieldId>),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

impl EncodedValue {
    /// On-disk value type tag.
    pub const fn value_type(&self) -> u8 {
        match self {
            Self::Byte(_) => 0x00,
            Self::Short(_) => 0x02,
            Self::Char(_) => 0x03,
            Self::Int(_) => 0x04,
            Self::Long(_) => 0x06,
            Self::Float(_) => 0x10,
            Self::Double(_) => 0x11,
            Self::MethodType(_) => 0x15,
            Self::MethodHandle(_) => 0x16,
            Self::String(_) => 0x17,
            Self::Type(_) => 0x18,
            Self::Field(_) => 0x19,
            Self::Method(_) => 0x1a,
            Self::Enum(_) => 0x1b,
            Self::Array(_) => 0x1c,
            Self::Annotation(_) => 0x1d,
            Self::Null => 0x1e,
            Self::Boolean(_) => 0x1f,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationElement {
    pub name: Idx<StringId>,
    pub value: EncodedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAnnotation {
    pub typ: Idx<TypeId>,
    pub elements: Vec<AnnotationElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArrayItem {
    pub(crate) info: ItemInfo,
    pub values: Vec<EncodedValue>,
}

impl EncodedArrayItem {
    pub fn new(values: Vec<EncodedValue>) -> Self {
        Self {
            info: ItemInfo::default(),
            values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Build,
    Runtime,
    System,
}

impl Visibility {
    pub const fn code(self) -> u8 {
        match self {
            Self::Build => 0x00,
            Self::Runtime => 0x01,
            Self::System => 0x02,
        }
    }
}

impl TryFrom<u8> for Visibility {
    type Error = DexError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(Self::Build),
            0x01 => Ok(Self::Runtime),
            0x02 => Ok(Self::System),
            _ => Err(DexError::Structure(format!(
                "unknown annotation visibility {v:#04x}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    pub(crate) info: ItemInfo,
    pub visibility: Visibility,
    pub annotation: EncodedAnnotation,
}

impl AnnotationItem {
    pub fn new(visibility: Visibility, annotation: EncodedAnnotation) -> Self {
        Self {
            info: ItemInfo::default(),
            visibility,
            annotation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetItem {
    pub(crate) info: ItemInfo,
    pub items: Vec<Idx<AnnotationItem>>,
}

impl AnnotationSetItem {
    pub fn new(items: Vec<Idx<AnnotationItem>>) -> Self {
        Self {
            info: ItemInfo::default(),
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetRefList {
    pub(crate) info: ItemInfo,
    pub items: Vec<Option<Idx<AnnotationSetItem>>>,
}

impl AnnotationSetRefList {
    pub fn new(items: Vec<Option<Idx<AnnotationSetItem>>>) -> Self {
        Self {
            info: ItemInfo::default(),
            items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAnnotation {
    pub field: Idx<FieldId>,
    pub annotations: Idx<AnnotationSetItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodAnnotation {
    pub method: Idx<MethodId>,
    pub annotations: Idx<AnnotationSetItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterAnnotation {
    pub method: Idx<MethodId>,
    pub annotations: Idx<AnnotationSetRefList>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationsDirectoryItem {
    pub(crate) info: ItemInfo,
    pub class_annotation: Option<Idx<AnnotationSetItem>>,
    pub field_annotations: Vec<FieldAnnotation>,
    pub method_annotations: Vec<MethodAnnotation>,
    pub parameter_annotations: Vec<ParameterAnnotation>,
}

impl AnnotationsDirectoryItem {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteId {
    pub(crate) info: ItemInfo,
    pub data: Idx<EncodedArrayItem>,
}

impl CallSiteId {
    pub fn new(data: Idx<EncodedArrayItem>) -> Self {
        Self {
            info: ItemInfo::default(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleKind {
    StaticPut,
    StaticGet,
    InstancePut,
    InstanceGet,
    InvokeStatic,
    InvokeInstance,
    InvokeConstructor,
    InvokeDirect,
    InvokeInterface,
}

impl MethodHandleKind {
    pub const fn code(self) -> u16 {
        match self {
            Self::StaticPut => 0x00,
            Self::StaticGet => 0x01,
            Self::InstancePut => 0x02,
            Self::InstanceGet => 0x03,
            Self::InvokeStatic => 0x04,
            Self::InvokeInstance => 0x05,
            Self::InvokeConstructor => 0x06,
            Self::InvokeDirect => 0x07,
            Self::InvokeInterface => 0x08,
        }
    }

    /// Whether the handle targets a field (rather than a method).
    pub const fn is_field_accessor(self) -> bool {
        matches!(
            self,
            Self::StaticPut | Self::StaticGet | Self::InstancePut | Self::InstanceGet
        )
    }
}

impl TryFrom<u16> for MethodHandleKind {
    type Error = DexError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(Self::StaticPut),
            0x01 => Ok(Self::StaticGet),
            0x02 => Ok(Self::InstancePut),
            0x03 => Ok(Self::InstanceGet),
            0x04 => Ok(Self::InvokeStatic),
            0x05 => Ok(Self::InvokeInstance),
            0x06 => Ok(Self::InvokeConstructor),
            0x07 => Ok(Self::InvokeDirect),
            0x08 => Ok(Self::InvokeInterface),
            _ => Err(DexError::Structure(format!(
                "unknown method handle type {v:#06x}"
            ))),
        }
    }
}

/// A method handle; `target` is a field id or a method id index depending on
/// the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandleItem {
    pub(crate) info: ItemInfo,
    pub kind: MethodHandleKind,
    pub target: u16,
}

impl MethodHandleItem {
    pub fn new(kind: MethodHandleKind, target: u16) -> Self {
        Self {
            info: ItemInfo::default(),
            kind,
            target,
        }
    }
}

impl_item! {
    StringData => "string data",
    StringId => "string id",
    TypeId => "type id",
    TypeList => "type list",
    ProtoId => "proto id",
    FieldId => "field id",
    MethodId => "method id",
    ClassDef => "class def",
    ClassData => "class data",
    CodeItem => "code item",
    DebugInfoItem => "debug info",
    EncodedArrayItem => "encoded array",
    AnnotationItem => "annotation",
    AnnotationSetItem => "annotation set",
    AnnotationSetRefList => "annotation set ref list",
    AnnotationsDirectoryItem => "annotations directory",
    CallSiteId => "call site id",
    MethodHandleItem => "method handle",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_data_lengths() {
        let s = StringData::new("h\u{e9}\u{1f600}");
        assert_eq!(s.utf16_len(), 4);
        assert_eq!(s.as_mutf8().len(), 1 + 2 + 6);
        assert_eq!(s.to_string_lossy(), "h\u{e9}\u{1f600}");

        let raw = StringData::from_mutf8(s.as_mutf8().to_vec()).unwrap();
        assert_eq!(raw, s);
        assert!(StringData::from_mutf8(vec![0x41, 0x00]).is_err());
    }

    #[test]
    fn declaring_class_is_unique() {
        let mut field = FieldId::new(Idx::new(0), Idx::new(1), Idx::new(2));
        assert_eq!(field.class_def(), None);
        field.set_class_def(Idx::new(4)).unwrap();
        field.set_class_def(Idx::new(4)).unwrap();
        assert!(field.set_class_def(Idx::new(5)).is_err());
        assert_eq!(field.class_def(), Some(Idx::new(4)));
    }

    #[test]
    fn access_flags_view() {
        let class = ClassDef::new(Idx::new(0), 0x0001 | 0x0010 | 0x8000_0000);
        assert!(class.flags().contains(AccessFlags::ACC_PUBLIC | AccessFlags::ACC_FINAL));
        assert!(!class.flags().contains(AccessFlags::ACC_INTERFACE));
    }
}
