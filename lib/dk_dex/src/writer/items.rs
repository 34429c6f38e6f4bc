//! Encoders of individual items. Items referencing other items take the
//! collections holding them, whose offsets must already be final.

use crate::errors::{DexError, DexResult};
use crate::ir::*;
use crate::map::MapItem;
use crate::raw::{HeaderItem, NO_INDEX};
use dk_utils::values::*;
use dk_utils::writers::*;
use std::convert::TryFrom;
use std::io::{Result, Write};

fn u16_index<T>(idx: Idx<T>, what: &str) -> DexResult<u16> {
    u16::try_from(idx.as_u32())
        .map_err(|_| DexError::Overflow(format!("{what} index {idx} on 16 bits")))
}

fn count(len: usize, what: &str) -> DexResult<u32> {
    u32::try_from(len).map_err(|_| DexError::Overflow(format!("{what} count")))
}

fn optional_offset<T: Item>(collection: &Collection<T>, idx: Option<Idx<T>>) -> DexResult<u32> {
    match idx {
        Some(idx) => collection.offset_of(idx),
        None => Ok(0),
    }
}

pub(crate) fn header_item_writer<W: Write>(output: &mut W, item: &HeaderItem) -> Result<usize> {
    let mut siz = 0;
    siz += bytes(output, &item.magic)?;
    siz += le_u32(output, item.checksum)?;
    siz += bytes(output, &item.signature)?;
    siz += le_u32(output, item.file_size)?;
    siz += le_u32(output, item.header_size)?;
    siz += le_u32(output, item.endian_tag)?;
    siz += le_u32(output, item.link_size)?;
    siz += le_u32(output, item.link_off)?;
    siz += le_u32(output, item.map_off)?;
    siz += le_u32(output, item.string_ids_size)?;
    siz += le_u32(output, item.string_ids_off)?;
    siz += le_u32(output, item.type_ids_size)?;
    siz += le_u32(output, item.type_ids_off)?;
    siz += le_u32(output, item.proto_ids_size)?;
    siz += le_u32(output, item.proto_ids_off)?;
    siz += le_u32(output, item.field_ids_size)?;
    siz += le_u32(output, item.field_ids_off)?;
    siz += le_u32(output, item.method_ids_size)?;
    siz += le_u32(output, item.method_ids_off)?;
    siz += le_u32(output, item.class_defs_size)?;
    siz += le_u32(output, item.class_defs_off)?;
    siz += le_u32(output, item.data_size)?;
    siz += le_u32(output, item.data_off)?;
    Ok(siz)
}

pub(crate) fn type_id_writer<W: Write>(output: &mut W, item: &TypeId) -> Result<usize> {
    le_u32(output, item.descriptor.as_u32())
}

pub(crate) fn proto_id_writer<W: Write>(
    output: &mut W,
    item: &ProtoId,
    type_lists: &Collection<TypeList>,
) -> DexResult<usize> {
    // An empty parameter list is written as no list at all.
    let parameters_off = match item.parameters {
        Some(idx) if !type_lists.get(idx)?.types.is_empty() => type_lists.offset_of(idx)?,
        _ => 0,
    };

    let mut siz = 0;
    siz += le_u32(output, item.shorty.as_u32())?;
    siz += le_u32(output, item.return_type.as_u32())?;
    siz += le_u32(output, parameters_off)?;
    Ok(siz)
}

pub(crate) fn field_id_writer<W: Write>(output: &mut W, item: &FieldId) -> DexResult<usize> {
    let mut siz = 0;
    siz += le_u16(output, u16_index(item.class, "field class")?)?;
    siz += le_u16(output, u16_index(item.typ, "field type")?)?;
    siz += le_u32(output, item.name.as_u32())?;
    Ok(siz)
}

pub(crate) fn method_id_writer<W: Write>(output: &mut W, item: &MethodId) -> DexResult<usize> {
    let mut siz = 0;
    siz += le_u16(output, u16_index(item.class, "method class")?)?;
    siz += le_u16(output, u16_index(item.proto, "method proto")?)?;
    siz += le_u32(output, item.name.as_u32())?;
    Ok(siz)
}

pub(crate) fn class_def_writer<W: Write>(
    output: &mut W,
    item: &ClassDef,
    cols: &Collections,
) -> DexResult<usize> {
    let mut siz = 0;
    siz += le_u32(output, item.class_type.as_u32())?;
    siz += le_u32(output, item.access_flags)?;
    siz += le_u32(output, item.superclass.map_or(NO_INDEX, Idx::as_u32))?;
    siz += le_u32(output, optional_offset(cols.type_lists(), item.interfaces)?)?;
    siz += le_u32(output, item.source_file.map_or(NO_INDEX, Idx::as_u32))?;
    siz += le_u32(
        output,
        optional_offset(cols.annotations_directories(), item.annotations)?,
    )?;
    siz += le_u32(output, optional_offset(cols.class_datas(), item.class_data)?)?;
    siz += le_u32(
        output,
        optional_offset(cols.encoded_arrays(), item.static_values)?,
    )?;
    Ok(siz)
}

pub(crate) fn method_handle_writer<W: Write>(
    output: &mut W,
    item: &MethodHandleItem,
) -> Result<usize> {
    let mut siz = 0;
    siz += le_u16(output, item.kind.code())?;
    siz += le_u16(output, 0)?;
    siz += le_u16(output, item.target)?;
    siz += le_u16(output, 0)?;
    Ok(siz)
}

pub(crate) fn map_list_writer<W: Write>(output: &mut W, items: &[MapItem]) -> DexResult<usize> {
    let mut siz = le_u32(output, count(items.len(), "map item")?)?;
    for item in items {
        siz += le_u16(output, item.typ.code())?;
        siz += le_u16(output, 0)?;
        siz += le_u32(output, item.size)?;
        siz += le_u32(output, item.offset)?;
    }
    Ok(siz)
}

pub(crate) fn type_list_writer<W: Write>(output: &mut W, list: &TypeList) -> DexResult<usize> {
    let mut siz = le_u32(output, count(list.types.len(), "type list")?)?;
    for typ in &list.types {
        siz += le_u16(output, u16_index(*typ, "type list")?)?;
    }
    Ok(siz)
}

pub(crate) fn annotation_set_writer<W: Write>(
    output: &mut W,
    set: &AnnotationSetItem,
    annotations: &Collection<AnnotationItem>,
) -> DexResult<usize> {
    let mut siz = le_u32(output, count(set.items.len(), "annotation set")?)?;
    for item in &set.items {
        siz += le_u32(output, annotations.offset_of(*item)?)?;
    }
    Ok(siz)
}

pub(crate) fn annotation_set_ref_list_writer<W: Write>(
    output: &mut W,
    list: &AnnotationSetRefList,
    sets: &Collection<AnnotationSetItem>,
) -> DexResult<usize> {
    let mut siz = le_u32(output, count(list.items.len(), "annotation set ref")?)?;
    for item in &list.items {
        siz += le_u32(output, optional_offset(sets, *item)?)?;
    }
    Ok(siz)
}

pub(crate) fn annotations_directory_writer<W: Write>(
    output: &mut W,
    dir: &AnnotationsDirectoryItem,
    sets: &Collection<AnnotationSetItem>,
    ref_lists: &Collection<AnnotationSetRefList>,
) -> DexResult<usize> {
    let mut siz = 0;
    siz += le_u32(output, optional_offset(sets, dir.class_annotation)?)?;
    siz += le_u32(output, count(dir.field_annotations.len(), "field annotation")?)?;
    siz += le_u32(output, count(dir.method_annotations.len(), "method annotation")?)?;
    siz += le_u32(
        output,
        count(dir.parameter_annotations.len(), "parameter annotation")?,
    )?;
    for a in &dir.field_annotations {
        siz += le_u32(output, a.field.as_u32())?;
        siz += le_u32(output, sets.offset_of(a.annotations)?)?;
    }
    for a in &dir.method_annotations {
        siz += le_u32(output, a.method.as_u32())?;
        siz += le_u32(output, sets.offset_of(a.annotations)?)?;
    }
    for a in &dir.parameter_annotations {
        siz += le_u32(output, a.method.as_u32())?;
        siz += le_u32(output, ref_lists.offset_of(a.annotations)?)?;
    }
    Ok(siz)
}

pub(crate) fn class_data_writer<W: Write>(
    output: &mut W,
    data: &ClassData,
    code_items: &Collection<CodeItem>,
) -> DexResult<usize> {
    let mut siz = 0;
    siz += uleb128(output, count(data.static_fields.len(), "static field")?)?;
    siz += uleb128(output, count(data.instance_fields.len(), "instance field")?)?;
    siz += uleb128(output, count(data.direct_methods.len(), "direct method")?)?;
    siz += uleb128(output, count(data.virtual_methods.len(), "virtual method")?)?;
    siz += encoded_fields_writer(output, &data.static_fields)?;
    siz += encoded_fields_writer(output, &data.instance_fields)?;
    siz += encoded_methods_writer(output, &data.direct_methods, code_items)?;
    siz += encoded_methods_writer(output, &data.virtual_methods, code_items)?;
    Ok(siz)
}

// Member indices must be strictly increasing for the deltas to be valid.
fn index_diff(prev: Option<u32>, idx: u32) -> DexResult<u32> {
    match prev {
        None => Ok(idx),
        Some(prev) => idx
            .checked_sub(prev)
            .filter(|diff| *diff != 0)
            .ok_or_else(|| DexError::Structure(format!("class members not sorted at index {idx}"))),
    }
}

fn encoded_fields_writer<W: Write>(output: &mut W, fields: &[FieldItem]) -> DexResult<usize> {
    let mut siz = 0;
    let mut prev = None;
    for field in fields {
        let idx = field.field.as_u32();
        siz += uleb128(output, index_diff(prev, idx)?)?;
        siz += uleb128(output, field.access_flags)?;
        prev = Some(idx);
    }
    Ok(siz)
}

fn encoded_methods_writer<W: Write>(
    output: &mut W,
    methods: &[MethodItem],
    code_items: &Collection<CodeItem>,
) -> DexResult<usize> {
    let mut siz = 0;
    let mut prev = None;
    for method in methods {
        let idx = method.method.as_u32();
        siz += uleb128(output, index_diff(prev, idx)?)?;
        siz += uleb128(output, method.access_flags)?;
        siz += uleb128(output, optional_offset(code_items, method.code)?)?;
        prev = Some(idx);
    }
    Ok(siz)
}

pub(crate) fn code_item_writer<W: Write>(
    output: &mut W,
    code: &CodeItem,
    debug_infos: &Collection<DebugInfoItem>,
) -> DexResult<usize> {
    let tries_size = u16::try_from(code.tries.len())
        .map_err(|_| DexError::Overflow("tries count".to_string()))?;
    let insns_size = count(code.insns.len(), "code unit")?;

    let mut siz = 0;
    siz += le_u16(output, code.registers_size)?;
    siz += le_u16(output, code.ins_size)?;
    siz += le_u16(output, code.outs_size)?;
    siz += le_u16(output, tries_size)?;
    siz += le_u32(output, optional_offset(debug_infos, code.debug_info)?)?;
    siz += le_u32(output, insns_size)?;
    for unit in &code.insns {
        siz += le_u16(output, *unit)?;
    }

    if tries_size != 0 {
        if insns_size % 2 == 1 {
            siz += le_u16(output, 0)?;
        }
        let (pool, handler_offs) = handler_pool(code)?;
        for t in &code.tries {
            let handler_off = handler_offs.get(t.handler).ok_or_else(|| {
                DexError::Structure(format!(
                    "try at {:#x} refers to missing handler list {}",
                    t.start_addr, t.handler
                ))
            })?;
            siz += le_u32(output, t.start_addr)?;
            siz += le_u16(output, t.insn_count)?;
            siz += le_u16(output, *handler_off)?;
        }
        siz += bytes(output, &pool)?;
    }
    Ok(siz)
}

// Encodes the handler lists of a code item, sharing identical lists.
// Returns the encoded pool and the offset of each handler list in it.
fn handler_pool(code: &CodeItem) -> DexResult<(Vec<u8>, Vec<u16>)> {
    let mut unique: Vec<&CatchHandler> = Vec::new();
    let mut slots = Vec::with_capacity(code.handlers.len());
    for handler in &code.handlers {
        match unique.iter().position(|u| *u == handler) {
            Some(slot) => slots.push(slot),
            None => {
                slots.push(unique.len());
                unique.push(handler);
            }
        }
    }

    let mut pool = Vec::new();
    uleb128(&mut pool, count(unique.len(), "catch handler")?)?;
    let mut unique_offs = Vec::with_capacity(unique.len());
    for handler in unique {
        unique_offs.push(
            u16::try_from(pool.len())
                .map_err(|_| DexError::Overflow("catch handler offset".to_string()))?,
        );
        let size = i32::try_from(handler.handlers.len())
            .map_err(|_| DexError::Overflow("catch handler size".to_string()))?;
        match handler.catch_all_addr {
            Some(_) => sleb128(&mut pool, -size)?,
            None if size == 0 => {
                return Err(DexError::Structure("empty catch handler".to_string()));
            }
            None => sleb128(&mut pool, size)?,
        };
        for pair in &handler.handlers {
            uleb128(&mut pool, pair.typ.as_u32())?;
            uleb128(&mut pool, pair.addr)?;
        }
        if let Some(addr) = handler.catch_all_addr {
            uleb128(&mut pool, addr)?;
        }
    }

    let offs = slots.into_iter().map(|slot| unique_offs[slot]).collect();
    Ok((pool, offs))
}

pub(crate) fn string_data_writer<W: Write>(output: &mut W, data: &StringData) -> Result<usize> {
    let mut siz = 0;
    siz += uleb128(output, data.utf16_len())?;
    siz += bytes(output, data.as_mutf8())?;
    siz += le_u8(output, 0)?;
    Ok(siz)
}

pub(crate) fn debug_info_writer<W: Write>(output: &mut W, item: &DebugInfoItem) -> DexResult<usize> {
    let mut siz = 0;
    siz += uleb128(output, item.line_start)?;
    siz += uleb128(output, count(item.parameter_names.len(), "parameter name")?)?;
    for name in &item.parameter_names {
        siz += uleb128p1(output, name.map(Idx::as_u32))?;
    }
    for instr in &item.bytecode {
        siz += dbg_instr_writer(output, instr)?;
    }
    if !matches!(item.bytecode.last(), Some(DbgInstr::EndSequence)) {
        siz += le_u8(output, 0x00)?;
    }
    Ok(siz)
}

fn dbg_instr_writer<W: Write>(output: &mut W, instr: &DbgInstr) -> Result<usize> {
    let mut siz = 0;
    match instr {
        DbgInstr::EndSequence => siz += le_u8(output, 0x00)?,
        DbgInstr::AdvancePc { addr_diff } => {
            siz += le_u8(output, 0x01)?;
            siz += uleb128(output, *addr_diff)?;
        }
        DbgInstr::AdvanceLine { line_diff } => {
            siz += le_u8(output, 0x02)?;
            siz += sleb128(output, *line_diff)?;
        }
        DbgInstr::StartLocal {
            register_num,
            name,
            typ,
        } => {
            siz += le_u8(output, 0x03)?;
            siz += uleb128(output, *register_num)?;
            siz += uleb128p1(output, name.map(Idx::as_u32))?;
            siz += uleb128p1(output, typ.map(Idx::as_u32))?;
        }
        DbgInstr::StartLocalExtended {
            register_num,
            name,
            typ,
            sig,
        } => {
            siz += le_u8(output, 0x04)?;
            siz += uleb128(output, *register_num)?;
            siz += uleb128p1(output, name.map(Idx::as_u32))?;
            siz += uleb128p1(output, typ.map(Idx::as_u32))?;
            siz += uleb128p1(output, sig.map(Idx::as_u32))?;
        }
        DbgInstr::EndLocal { register_num } => {
            siz += le_u8(output, 0x05)?;
            siz += uleb128(output, *register_num)?;
        }
        DbgInstr::RestartLocal { register_num } => {
            siz += le_u8(output, 0x06)?;
            siz += uleb128(output, *register_num)?;
        }
        DbgInstr::SetPrologueEnd => siz += le_u8(output, 0x07)?,
        DbgInstr::SetEpilogueBegin => siz += le_u8(output, 0x08)?,
        DbgInstr::SetFile { name } => {
            siz += le_u8(output, 0x09)?;
            siz += uleb128p1(output, name.map(Idx::as_u32))?;
        }
        DbgInstr::Special(opcode) => siz += le_u8(output, *opcode)?,
    }
    Ok(siz)
}

pub(crate) fn annotation_item_writer<W: Write>(
    output: &mut W,
    item: &AnnotationItem,
) -> DexResult<usize> {
    let mut siz = le_u8(output, item.visibility.code())?;
    siz += encoded_annotation_writer(output, &item.annotation)?;
    Ok(siz)
}

fn encoded_annotation_writer<W: Write>(
    output: &mut W,
    annotation: &EncodedAnnotation,
) -> DexResult<usize> {
    let mut siz = 0;
    siz += uleb128(output, annotation.typ.as_u32())?;
    siz += uleb128(output, count(annotation.elements.len(), "annotation element")?)?;
    for element in &annotation.elements {
        siz += uleb128(output, element.name.as_u32())?;
        siz += encoded_value_writer(output, &element.value)?;
    }
    Ok(siz)
}

pub(crate) fn encoded_array_item_writer<W: Write>(
    output: &mut W,
    item: &EncodedArrayItem,
) -> DexResult<usize> {
    encoded_array_writer(output, &item.values)
}

fn encoded_array_writer<W: Write>(output: &mut W, values: &[EncodedValue]) -> DexResult<usize> {
    let mut siz = uleb128(output, count(values.len(), "encoded value")?)?;
    for value in values {
        siz += encoded_value_writer(output, value)?;
    }
    Ok(siz)
}

// Header byte: (size - 1) in the upper three bits, value type below.
#[allow(clippy::cast_possible_truncation)]
fn sized_value_writer<W: Write>(output: &mut W, value_type: u8, value: &[u8]) -> Result<usize> {
    debug_assert!(!value.is_empty() && value.len() <= 8);
    let mut siz = le_u8(output, (((value.len() - 1) as u8) << 5) | value_type)?;
    siz += bytes(output, value)?;
    Ok(siz)
}

pub(crate) fn encoded_value_writer<W: Write>(
    output: &mut W,
    value: &EncodedValue,
) -> DexResult<usize> {
    let typ = value.value_type();
    let siz = match value {
        EncodedValue::Byte(v) => le_u8(output, typ)? + le_u8(output, *v as u8)?,
        EncodedValue::Short(v) => sized_value_writer(output, typ, &encode_int_value(i32::from(*v)))?,
        EncodedValue::Char(v) => sized_value_writer(output, typ, &encode_uint_value(u32::from(*v)))?,
        EncodedValue::Int(v) => sized_value_writer(output, typ, &encode_int_value(*v))?,
        EncodedValue::Long(v) => sized_value_writer(output, typ, &encode_long_value(*v))?,
        EncodedValue::Float(v) => sized_value_writer(output, typ, &encode_float_value(*v))?,
        EncodedValue::Double(v) => sized_value_writer(output, typ, &encode_double_value(*v))?,
        EncodedValue::MethodType(idx) => {
            sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?
        }
        EncodedValue::MethodHandle(idx) => {
            sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?
        }
        EncodedValue::String(idx) => {
            sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?
        }
        EncodedValue::Type(idx) => sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?,
        EncodedValue::Field(idx) | EncodedValue::Enum(idx) => {
            sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?
        }
        EncodedValue::Method(idx) => {
            sized_value_writer(output, typ, &encode_uint_value(idx.as_u32()))?
        }
        EncodedValue::Array(values) => le_u8(output, typ)? + encoded_array_writer(output, values)?,
        EncodedValue::Annotation(annotation) => {
            le_u8(output, typ)? + encoded_annotation_writer(output, annotation)?
        }
        EncodedValue::Null => le_u8(output, typ)?,
        EncodedValue::Boolean(b) => le_u8(output, (u8::from(*b) << 5) | typ)?,
    };
    Ok(siz)
}
