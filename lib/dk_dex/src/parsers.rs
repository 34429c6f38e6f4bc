//! nom parsers for every on-disk record of a dex container.

use crate::errors::DexError;
use crate::ir::{
    AnnotationElement, AnnotationItem, CatchHandler, DbgInstr, DebugInfoItem, EncodedAnnotation,
    EncodedArrayItem, EncodedValue, Idx, TypeAddrPair, Visibility,
};
use crate::map::{MapItem, MapItemType};
use crate::raw::*;
use dk_utils::leb::{decode_sleb128, decode_uleb128};
use dk_utils::values::*;
use nom::bytes::complete::{tag, take, take_until};
use nom::character::complete::digit1;
use nom::combinator::{cond, map, verify};
use nom::error::{ErrorKind, ParseError};
use nom::multi::count;
use nom::number::complete::{le_i8, le_u16, le_u32, le_u8};
use nom::Err::Error;
use nom::{IResult, Offset};
use std::convert::TryFrom;

pub(crate) fn uleb128(input: &[u8]) -> IResult<&[u8], u32, DexError> {
    match decode_uleb128(input) {
        Ok(v) => Ok((&input[v.size()..], v.value())),
        Err(err) => Err(Error(DexError::from(err))),
    }
}

pub(crate) fn sleb128(input: &[u8]) -> IResult<&[u8], i32, DexError> {
    match decode_sleb128(input) {
        Ok(v) => Ok((&input[v.size()..], v.value())),
        Err(err) => Err(Error(DexError::from(err))),
    }
}

/// uleb128 value biased by one: 0 stands for "none".
pub(crate) fn uleb128p1(input: &[u8]) -> IResult<&[u8], Option<u32>, DexError> {
    map(uleb128, |v| v.checked_sub(1))(input)
}

fn magic_parser(input: &[u8]) -> IResult<&[u8], ([u8; 8], u32), DexError> {
    let start = input;
    let (input, _) = tag("dex\n")(input)?;
    let (input, version) = map(verify(digit1, |ds: &[u8]| ds.len() == 3), |vs: &[u8]| {
        u32::from(vs[0] - b'0') * 100 + u32::from(vs[1] - b'0') * 10 + u32::from(vs[2] - b'0')
    })(input)?;
    let (input, _) = tag("\x00")(input)?;

    let mut magic = [0; 8];
    magic.copy_from_slice(&start[..8]);
    Ok((input, (magic, version)))
}

pub(crate) fn header_item_parser(input: &[u8]) -> IResult<&[u8], HeaderItem, DexError> {
    let (input, (magic, version)) =
        magic_parser(input).map_err(|_| Error(DexError::BadMagic))?;
    let (input, checksum) = le_u32(input)?;
    let (input, sig) = take(20usize)(input)?;
    let (input, file_size) = le_u32(input)?;
    let (input, header_size) = le_u32(input)?;
    let (input, endian_tag) = le_u32(input)?;
    let (input, link_size) = le_u32(input)?;
    let (input, link_off) = le_u32(input)?;
    let (input, map_off) = le_u32(input)?;
    let (input, string_ids_size) = le_u32(input)?;
    let (input, string_ids_off) = le_u32(input)?;
    let (input, type_ids_size) = le_u32(input)?;
    let (input, type_ids_off) = le_u32(input)?;
    let (input, proto_ids_size) = le_u32(input)?;
    let (input, proto_ids_off) = le_u32(input)?;
    let (input, field_ids_size) = le_u32(input)?;
    let (input, field_ids_off) = le_u32(input)?;
    let (input, method_ids_size) = le_u32(input)?;
    let (input, method_ids_off) = le_u32(input)?;
    let (input, class_defs_size) = le_u32(input)?;
    let (input, class_defs_off) = le_u32(input)?;
    let (input, data_size) = le_u32(input)?;
    let (input, data_off) = le_u32(input)?;

    let mut signature = [0; 20];
    signature.copy_from_slice(sig);

    Ok((
        input,
        HeaderItem {
            magic,
            version,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        },
    ))
}

pub(crate) fn proto_id_item_parser(input: &[u8]) -> IResult<&[u8], ProtoIdItem, DexError> {
    let (input, shorty_idx) = le_u32(input)?;
    let (input, return_type_idx) = le_u32(input)?;
    let (input, parameters_off) = le_u32(input)?;

    Ok((
        input,
        ProtoIdItem {
            shorty_idx,
            return_type_idx,
            parameters_off,
        },
    ))
}

pub(crate) fn field_id_item_parser(input: &[u8]) -> IResult<&[u8], FieldIdItem, DexError> {
    let (input, class_idx) = le_u16(input)?;
    let (input, type_idx) = le_u16(input)?;
    let (input, name_idx) = le_u32(input)?;

    Ok((
        input,
        FieldIdItem {
            class_idx,
            type_idx,
            name_idx,
        },
    ))
}

pub(crate) fn method_id_item_parser(input: &[u8]) -> IResult<&[u8], MethodIdItem, DexError> {
    let (input, class_idx) = le_u16(input)?;
    let (input, proto_idx) = le_u16(input)?;
    let (input, name_idx) = le_u32(input)?;

    Ok((
        input,
        MethodIdItem {
            class_idx,
            proto_idx,
            name_idx,
        },
    ))
}

pub(crate) fn class_def_item_parser(input: &[u8]) -> IResult<&[u8], ClassDefItem, DexError> {
    let (input, class_idx) = le_u32(input)?;
    let (input, access_flags) = le_u32(input)?;
    let (input, superclass_idx) = le_u32(input)?;
    let (input, interfaces_off) = le_u32(input)?;
    let (input, source_file_idx) = le_u32(input)?;
    let (input, annotations_off) = le_u32(input)?;
    let (input, class_data_off) = le_u32(input)?;
    let (input, static_values_off) = le_u32(input)?;

    Ok((
        input,
        ClassDefItem {
            class_idx,
            access_flags,
            superclass_idx,
            interfaces_off,
            source_file_idx,
            annotations_off,
            class_data_off,
            static_values_off,
        },
    ))
}

pub(crate) fn method_handle_item_parser(
    input: &[u8],
) -> IResult<&[u8], MethodHandleItem, DexError> {
    let (input, method_handle_type) = le_u16(input)?;
    let (input, _unused) = le_u16(input)?;
    let (input, field_or_method_id) = le_u16(input)?;
    let (input, _unused) = le_u16(input)?;

    Ok((
        input,
        MethodHandleItem {
            method_handle_type,
            field_or_method_id,
        },
    ))
}

pub(crate) fn map_list_parser(input: &[u8]) -> IResult<&[u8], Vec<MapItem>, DexError> {
    let (input, nb) = le_u32(input)?;
    count(map_item_parser, nb as usize)(input)
}

fn map_item_parser(input: &[u8]) -> IResult<&[u8], MapItem, DexError> {
    let (input, typ_tag) = le_u16(input)?;
    let typ = MapItemType::try_from(typ_tag).map_err(Error)?;
    let (input, _unused) = le_u16(input)?;
    let (input, size) = le_u32(input)?;
    let (input, offset) = le_u32(input)?;

    Ok((input, MapItem::new(typ, size, offset)))
}

pub(crate) fn type_list_parser(input: &[u8]) -> IResult<&[u8], Vec<u16>, DexError> {
    let (input, nb) = le_u32(input)?;
    count(le_u16, nb as usize)(input)
}

/// Annotation sets and annotation set ref lists: a counted list of offsets.
pub(crate) fn offset_list_parser(input: &[u8]) -> IResult<&[u8], Vec<u32>, DexError> {
    let (input, nb) = le_u32(input)?;
    count(le_u32, nb as usize)(input)
}

pub(crate) fn string_data_item_parser(input: &[u8]) -> IResult<&[u8], (u32, &[u8]), DexError> {
    let (input, utf16_size) = uleb128(input)?;
    let (input, data) = take_until("\x00")(input)?;
    let (input, _null) = tag("\x00")(input)?;

    Ok((input, (utf16_size, data)))
}

pub(crate) fn class_data_item_parser(input: &[u8]) -> IResult<&[u8], ClassDataItem, DexError> {
    let start = input;
    let (input, static_fields_size) = uleb128(input)?;
    let (input, instance_fields_size) = uleb128(input)?;
    let (input, direct_methods_size) = uleb128(input)?;
    let (input, virtual_methods_size) = uleb128(input)?;

    let (input, static_fields) = encoded_fields_parser(static_fields_size, input)?;
    let (input, instance_fields) = encoded_fields_parser(instance_fields_size, input)?;
    let (input, direct_methods) = encoded_methods_parser(direct_methods_size, input)?;
    let (input, virtual_methods) = encoded_methods_parser(virtual_methods_size, input)?;

    Ok((
        input,
        ClassDataItem {
            static_fields,
            instance_fields,
            direct_methods,
            virtual_methods,
            size: start.offset(input) as u32,
        },
    ))
}

// Member indices are delta-encoded against the previous member of the list.
fn encoded_fields_parser(nb: u32, input: &[u8]) -> IResult<&[u8], Vec<EncodedField>, DexError> {
    let mut input = input;
    let mut idx: u32 = 0;
    let mut fields = Vec::new();
    for _ in 0..nb {
        let (inp, diff) = uleb128(input)?;
        let (inp, access_flags) = uleb128(inp)?;
        idx = idx
            .checked_add(diff)
            .ok_or_else(|| Error(DexError::from_error_kind(inp, ErrorKind::TooLarge)))?;
        fields.push(EncodedField {
            field_idx: idx,
            access_flags,
        });
        input = inp;
    }
    Ok((input, fields))
}

fn encoded_methods_parser(
    nb: u32,
    input: &[u8],
) -> IResult<&[u8], Vec<EncodedMethod>, DexError> {
    let mut input = input;
    let mut idx: u32 = 0;
    let mut methods = Vec::new();
    for _ in 0..nb {
        let (inp, diff) = uleb128(input)?;
        let (inp, access_flags) = uleb128(inp)?;
        let (inp, code_off) = uleb128(inp)?;
        idx = idx
            .checked_add(diff)
            .ok_or_else(|| Error(DexError::from_error_kind(inp, ErrorKind::TooLarge)))?;
        methods.push(EncodedMethod {
            method_idx: idx,
            access_flags,
            code_off,
        });
        input = inp;
    }
    Ok((input, methods))
}

/// Parses a code item; `offset` is the position of `input` in the container.
pub(crate) fn code_item_parser(
    offset: u32,
) -> impl Fn(&[u8]) -> IResult<&[u8], CodeItem, DexError> {
    move |input: &[u8]| {
        let start = input;
        let (input, registers_size) = le_u16(input)?;
        let (input, ins_size) = le_u16(input)?;
        let (input, outs_size) = le_u16(input)?;
        let (input, tries_size) = le_u16(input)?;
        let (input, debug_info_off) = le_u32(input)?;
        let (input, insns_size) = le_u32(input)?;
        let insns_off = offset + start.offset(input) as u32;

        if (input.len() / 2) < insns_size as usize {
            return Err(Error(DexError::from_error_kind(input, ErrorKind::Eof)));
        }
        let (input, insns) = count(le_u16, insns_size as usize)(input)?;
        let (input, _) = cond(tries_size != 0 && insns_size % 2 == 1, le_u16)(input)?;
        let (input, tries) = count(try_item_parser, tries_size as usize)(input)?;
        let (input, handlers) = if tries_size != 0 {
            catch_handler_list_parser(input)?
        } else {
            (input, Vec::new())
        };

        Ok((
            input,
            CodeItem {
                registers_size,
                ins_size,
                outs_size,
                debug_info_off,
                insns,
                tries,
                handlers,
                insns_off,
                size: start.offset(input) as u32,
            },
        ))
    }
}

fn try_item_parser(input: &[u8]) -> IResult<&[u8], TryItem, DexError> {
    let (input, start_addr) = le_u32(input)?;
    let (input, insn_count) = le_u16(input)?;
    let (input, handler_off) = le_u16(input)?;

    Ok((
        input,
        TryItem {
            start_addr,
            insn_count,
            handler_off,
        },
    ))
}

fn catch_handler_list_parser(
    input: &[u8],
) -> IResult<&[u8], Vec<(u16, CatchHandler)>, DexError> {
    let (mut current, nb) = uleb128(input)?;

    let mut list = Vec::new();
    for _ in 0..nb {
        let offset = u16::try_from(input.offset(current))
            .map_err(|_| Error(DexError::from_error_kind(current, ErrorKind::TooLarge)))?;
        let (i, handler) = catch_handler_parser(current)?;
        current = i;
        list.push((offset, handler));
    }

    Ok((current, list))
}

// A non-positive size announces a trailing catch-all address.
fn catch_handler_parser(input: &[u8]) -> IResult<&[u8], CatchHandler, DexError> {
    let (input, size) = sleb128(input)?;
    let (input, handlers) = count(type_addr_pair_parser, size.unsigned_abs() as usize)(input)?;
    let (input, catch_all_addr) = cond(size <= 0, uleb128)(input)?;

    Ok((
        input,
        CatchHandler {
            handlers,
            catch_all_addr,
        },
    ))
}

fn type_addr_pair_parser(input: &[u8]) -> IResult<&[u8], TypeAddrPair, DexError> {
    let (input, type_idx) = uleb128(input)?;
    let (input, addr) = uleb128(input)?;

    Ok((
        input,
        TypeAddrPair {
            typ: Idx::new(type_idx),
            addr,
        },
    ))
}

pub(crate) fn debug_info_item_parser(input: &[u8]) -> IResult<&[u8], DebugInfoItem, DexError> {
    let (input, line_start) = uleb128(input)?;
    let (input, parameters_size) = uleb128(input)?;
    let (input, parameter_names) = count(
        map(uleb128p1, |n| n.map(Idx::new)),
        parameters_size as usize,
    )(input)?;
    let (input, bytecode) = debug_bytecode_parser(input)?;

    Ok((
        input,
        DebugInfoItem::new(line_start, parameter_names, bytecode),
    ))
}

fn debug_bytecode_parser(input: &[u8]) -> IResult<&[u8], Vec<DbgInstr>, DexError> {
    let mut inp = input;
    let mut bc = Vec::new();
    loop {
        let (i, opcode) = le_u8(inp)?;
        inp = i;
        match opcode {
            0x00 => {
                bc.push(DbgInstr::EndSequence);
                break;
            }
            0x01 => {
                let (i, addr_diff) = uleb128(inp)?;
                bc.push(DbgInstr::AdvancePc { addr_diff });
                inp = i;
            }
            0x02 => {
                let (i, line_diff) = sleb128(inp)?;
                bc.push(DbgInstr::AdvanceLine { line_diff });
                inp = i;
            }
            0x03 => {
                let (i, register_num) = uleb128(inp)?;
                let (i, name) = uleb128p1(i)?;
                let (i, typ) = uleb128p1(i)?;
                bc.push(DbgInstr::StartLocal {
                    register_num,
                    name: name.map(Idx::new),
                    typ: typ.map(Idx::new),
                });
                inp = i;
            }
            0x04 => {
                let (i, register_num) = uleb128(inp)?;
                let (i, name) = uleb128p1(i)?;
                let (i, typ) = uleb128p1(i)?;
                let (i, sig) = uleb128p1(i)?;
                bc.push(DbgInstr::StartLocalExtended {
                    register_num,
                    name: name.map(Idx::new),
                    typ: typ.map(Idx::new),
                    sig: sig.map(Idx::new),
                });
                inp = i;
            }
            0x05 => {
                let (i, register_num) = uleb128(inp)?;
                bc.push(DbgInstr::EndLocal { register_num });
                inp = i;
            }
            0x06 => {
                let (i, register_num) = uleb128(inp)?;
                bc.push(DbgInstr::RestartLocal { register_num });
                inp = i;
            }
            0x07 => bc.push(DbgInstr::SetPrologueEnd),
            0x08 => bc.push(DbgInstr::SetEpilogueBegin),
            0x09 => {
                let (i, name) = uleb128p1(inp)?;
                bc.push(DbgInstr::SetFile {
                    name: name.map(Idx::new),
                });
                inp = i;
            }
            _ => bc.push(DbgInstr::Special(opcode)),
        }
    }
    Ok((inp, bc))
}

pub(crate) fn annotation_item_parser(input: &[u8]) -> IResult<&[u8], AnnotationItem, DexError> {
    let (input, visibility) = le_u8(input)?;
    let visibility = Visibility::try_from(visibility).map_err(Error)?;
    let (input, annotation) = encoded_annotation_parser(input)?;

    Ok((input, AnnotationItem::new(visibility, annotation)))
}

fn encoded_annotation_parser(input: &[u8]) -> IResult<&[u8], EncodedAnnotation, DexError> {
    let (input, type_idx) = uleb128(input)?;
    let (input, size) = uleb128(input)?;
    let (input, elements) = count(annotation_element_parser, size as usize)(input)?;

    Ok((
        input,
        EncodedAnnotation {
            typ: Idx::new(type_idx),
            elements,
        },
    ))
}

fn annotation_element_parser(input: &[u8]) -> IResult<&[u8], AnnotationElement, DexError> {
    let (input, name_idx) = uleb128(input)?;
    let (input, value) = encoded_value_parser(input)?;

    Ok((
        input,
        AnnotationElement {
            name: Idx::new(name_idx),
            value,
        },
    ))
}

fn value_bytes(input: &[u8], value_arg: u8, max_arg: u8) -> IResult<&[u8], &[u8], DexError> {
    if value_arg > max_arg {
        return Err(Error(DexError::from_error_kind(input, ErrorKind::Tag)));
    }
    take(usize::from(value_arg) + 1)(input)
}

pub(crate) fn encoded_value_parser(input: &[u8]) -> IResult<&[u8], EncodedValue, DexError> {
    let (input, header) = le_u8(input)?;
    let value_arg = (header & 0b1110_0000) >> 5;
    let value_typ = header & 0b1_1111;

    match value_typ {
        0x00 => {
            if value_arg != 0 {
                return Err(Error(DexError::from_error_kind(input, ErrorKind::Tag)));
            }
            map(le_i8, EncodedValue::Byte)(input)
        }
        0x02 => map(
            |i| value_bytes(i, value_arg, 1),
            |bs| EncodedValue::Short(decode_int_value(bs) as i16),
        )(input),
        0x03 => map(
            |i| value_bytes(i, value_arg, 1),
            |bs| EncodedValue::Char(decode_uint_value(bs) as u16),
        )(input),
        0x04 => map(
            |i| value_bytes(i, value_arg, 3),
            |bs| EncodedValue::Int(decode_int_value(bs)),
        )(input),
        0x06 => map(
            |i| value_bytes(i, value_arg, 7),
            |bs| EncodedValue::Long(decode_long_value(bs)),
        )(input),
        0x10 => map(
            |i| value_bytes(i, value_arg, 3),
            |bs| EncodedValue::Float(decode_float_value(bs)),
        )(input),
        0x11 => map(
            |i| value_bytes(i, value_arg, 7),
            |bs| EncodedValue::Double(decode_double_value(bs)),
        )(input),
        0x15..=0x1b => {
            let (input, bs) = value_bytes(input, value_arg, 3)?;
            let idx = decode_uint_value(bs);
            let value = match value_typ {
                0x15 => EncodedValue::MethodType(Idx::new(idx)),
                0x16 => EncodedValue::MethodHandle(Idx::new(idx)),
                0x17 => EncodedValue::String(Idx::new(idx)),
                0x18 => EncodedValue::Type(Idx::new(idx)),
                0x19 => EncodedValue::Field(Idx::new(idx)),
                0x1a => EncodedValue::Method(Idx::new(idx)),
                _ => EncodedValue::Enum(Idx::new(idx)),
            };
            Ok((input, value))
        }
        0x1c => {
            if value_arg != 0 {
                return Err(Error(DexError::from_error_kind(input, ErrorKind::Tag)));
            }
            map(encoded_array_parser, EncodedValue::Array)(input)
        }
        0x1d => {
            if value_arg != 0 {
                return Err(Error(DexError::from_error_kind(input, ErrorKind::Tag)));
            }
            map(encoded_annotation_parser, EncodedValue::Annotation)(input)
        }
        0x1e => {
            if value_arg != 0 {
                return Err(Error(DexError::from_error_kind(input, ErrorKind::Tag)));
            }
            Ok((input, EncodedValue::Null))
        }
        0x1f => match value_arg {
            0 => Ok((input, EncodedValue::Boolean(false))),
            1 => Ok((input, EncodedValue::Boolean(true))),
            _ => Err(Error(DexError::from_error_kind(input, ErrorKind::Switch))),
        },
        _ => Err(Error(DexError::from_error_kind(input, ErrorKind::Switch))),
    }
}

pub(crate) fn encoded_array_item_parser(
    input: &[u8],
) -> IResult<&[u8], EncodedArrayItem, DexError> {
    map(encoded_array_parser, EncodedArrayItem::new)(input)
}

fn encoded_array_parser(input: &[u8]) -> IResult<&[u8], Vec<EncodedValue>, DexError> {
    let (input, nb) = uleb128(input)?;
    count(encoded_value_parser, nb as usize)(input)
}

pub(crate) fn annotations_directory_item_parser(
    input: &[u8],
) -> IResult<&[u8], AnnotationsDirectoryItem, DexError> {
    let start = input;
    let (input, class_annotations_off) = le_u32(input)?;
    let (input, fields_size) = le_u32(input)?;
    let (input, annotated_methods_size) = le_u32(input)?;
    let (input, annotated_parameters_size) = le_u32(input)?;
    let (input, field_annotations) = count(annotation_off_item_parser, fields_size as usize)(input)?;
    let (input, method_annotations) =
        count(annotation_off_item_parser, annotated_methods_size as usize)(input)?;
    let (input, parameter_annotations) = count(
        annotation_off_item_parser,
        annotated_parameters_size as usize,
    )(input)?;

    Ok((
        input,
        AnnotationsDirectoryItem {
            class_annotations_off,
            field_annotations,
            method_annotations,
            parameter_annotations,
            size: start.offset(input) as u32,
        },
    ))
}

fn annotation_off_item_parser(input: &[u8]) -> IResult<&[u8], AnnotationOffItem, DexError> {
    let (input, idx) = le_u32(input)?;
    let (input, annotations_off) = le_u32(input)?;

    Ok((
        input,
        AnnotationOffItem {
            idx,
            annotations_off,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_values() {
        let (rest, v) = encoded_value_parser(&[0x04, 0x7f]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(v, EncodedValue::Int(0x7f));

        let (_, v) = encoded_value_parser(&[0x24, 0xff, 0xff]).unwrap();
        assert_eq!(v, EncodedValue::Int(-1));

        let (_, v) = encoded_value_parser(&[0x30, 0x80, 0x3f]).unwrap();
        assert_eq!(v, EncodedValue::Float(1.0));

        let (_, v) = encoded_value_parser(&[0x3f]).unwrap();
        assert_eq!(v, EncodedValue::Boolean(true));

        let (_, v) = encoded_value_parser(&[0x1c, 0x02, 0x1e, 0x17, 0x05]).unwrap();
        assert_eq!(
            v,
            EncodedValue::Array(vec![EncodedValue::Null, EncodedValue::String(Idx::new(5))])
        );

        // int on five bytes
        assert!(encoded_value_parser(&[0x84, 0, 0, 0, 0, 0]).is_err());
        // unknown type
        assert!(encoded_value_parser(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn class_data_indices_are_accumulated() {
        let data = [
            0x01, 0x00, 0x00, 0x02, // sizes
            0x03, 0x08, // static field 3
            0x02, 0x01, 0x00, // virtual method 2
            0x03, 0x01, 0x90, 0x02, // virtual method 5, code at 0x110
        ];
        let (rest, item) = class_data_item_parser(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(item.size, data.len() as u32);
        assert_eq!(item.static_fields[0].field_idx, 3);
        assert_eq!(item.virtual_methods[0].method_idx, 2);
        assert_eq!(item.virtual_methods[1].method_idx, 5);
        assert_eq!(item.virtual_methods[1].code_off, 0x110);
    }

    #[test]
    fn code_item_with_tries() {
        #[rustfmt::skip]
        let data = [
            0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, // registers, ins, outs, tries
            0x00, 0x00, 0x00, 0x00,                         // debug info
            0x01, 0x00, 0x00, 0x00,                         // insns size
            0x0e, 0x00,                                     // return-void
            0x00, 0x00,                                     // padding
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, // try
            0x01,                                           // one handler list
            0x00, 0x00,                                     // catch-all only, at 0
        ];
        let (rest, item) = code_item_parser(0x100)(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(item.insns, vec![0x000e]);
        assert_eq!(item.insns_off, 0x110);
        assert_eq!(item.tries[0].handler_off, 1);
        assert_eq!(item.handlers.len(), 1);
        assert_eq!(item.handlers[0].0, 1);
        assert_eq!(item.handlers[0].1.catch_all_addr, Some(0));
        assert_eq!(item.size, data.len() as u32);
    }

    #[test]
    fn debug_info_stops_at_end_sequence() {
        let data = [0x05, 0x01, 0x03, 0x07, 0x0e, 0x00, 0xff];
        let (rest, item) = debug_info_item_parser(&data).unwrap();
        assert_eq!(rest, &[0xff]);
        assert_eq!(item.line_start, 5);
        assert_eq!(item.parameter_names, vec![Some(Idx::new(2))]);
        assert_eq!(
            item.bytecode,
            vec![DbgInstr::SetPrologueEnd, DbgInstr::Special(0x0e), DbgInstr::EndSequence]
        );

        assert!(debug_info_item_parser(&[0x05, 0x00, 0x07]).is_err());
    }

    #[test]
    fn bad_magic() {
        let mut data = vec![0u8; 0x70];
        data[..8].copy_from_slice(b"dey\n035\0");
        assert!(matches!(
            header_item_parser(&data),
            Err(Error(DexError::BadMagic))
        ));
    }
}
