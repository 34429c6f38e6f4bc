//! Builds the in-memory model from a [`DexFile`].
//!
//! Id tables are created in strict table order (strings, types, protos,
//! fields, methods, method handles, call sites, class defs) so that the
//! `i`-th on-disk record becomes `Idx::new(i)`, and every reference can be
//! range-checked against already built tables. Data items reachable from
//! several places are created once, keyed by their source offset.

use super::*;
use crate::errors::{DexError, DexResult};
use crate::file::DexFile;
use crate::map::MapItemType;
use crate::raw::{NO_INDEX, STRING_ID_ITEM_SIZE, TYPE_ID_ITEM_SIZE};
use crate::raw::{CLASS_DEF_ITEM_SIZE, FIELD_ID_ITEM_SIZE, METHOD_ID_ITEM_SIZE, PROTO_ID_ITEM_SIZE};
use crate::raw::{CALL_SITE_ID_ITEM_SIZE, METHOD_HANDLE_ITEM_SIZE};
use std::convert::TryFrom;

/// Reads a whole container into a [`Header`].
pub fn build(dex_file: &DexFile) -> DexResult<Header> {
    let mut header = Header::from_item(dex_file.header());
    let cols = header.collections_mut();

    for i in 0..dex_file.num_string_ids() {
        cols.create_string_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_type_ids() {
        cols.create_type_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_proto_ids() {
        cols.create_proto_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_field_ids() {
        cols.create_field_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_method_ids() {
        cols.create_method_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_method_handles() {
        cols.create_method_handle(dex_file, i)?;
    }
    for i in 0..dex_file.num_call_site_ids() {
        cols.create_call_site_id(dex_file, i)?;
    }
    for i in 0..dex_file.num_class_defs() {
        cols.create_class_def(dex_file, i)?;
    }

    cols.copy_section_offsets(dex_file);

    log::debug!(
        "built model: {} strings, {} types, {} methods, {} classes, {} code items",
        cols.string_ids.len(),
        cols.type_ids.len(),
        cols.method_ids.len(),
        cols.class_defs.len(),
        cols.code_items.len()
    );
    Ok(header)
}

fn expect_next<T: Item>(collection: &Collection<T>, index: u32) -> DexResult<()> {
    if collection.size() != index {
        return Err(DexError::Structure(format!(
            "{} {index} created out of table order",
            T::KIND
        )));
    }
    Ok(())
}

fn optional_index<T: Item>(collection: &Collection<T>, raw: u32) -> DexResult<Option<Idx<T>>> {
    if raw == NO_INDEX {
        return Ok(None);
    }
    let idx = Idx::new(raw);
    collection.check(idx)?;
    Ok(Some(idx))
}

fn index<T: Item>(collection: &Collection<T>, raw: u32) -> DexResult<Idx<T>> {
    let idx = Idx::new(raw);
    collection.check(idx)?;
    Ok(idx)
}

impl Collections {
    pub fn create_string_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<StringId>> {
        expect_next(&self.string_ids, i)?;
        let data_off = dex_file.string_data_offset(i)?;
        let (bytes, utf16_len, size) = dex_file.string_data(i)?;

        let mut data = StringData::from_mutf8(bytes.to_vec())?;
        if data.utf16_len() != utf16_len {
            log::warn!(
                "string {i} declares {utf16_len} UTF-16 units but holds {}",
                data.utf16_len()
            );
        }
        data.set_offset(data_off);
        data.set_size(size);
        let data = self.string_datas.push(data);

        let mut id = StringId::new(data);
        id.info = ItemInfo::new(dex_file.string_id_offset(i)?, STRING_ID_ITEM_SIZE);
        Ok(self.string_ids.push(id))
    }

    pub fn create_type_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<TypeId>> {
        expect_next(&self.type_ids, i)?;
        let descriptor = index(&self.string_ids, dex_file.type_id(i)?)?;

        let mut id = TypeId::new(descriptor);
        id.info = ItemInfo::new(dex_file.type_id_offset(i)?, TYPE_ID_ITEM_SIZE);
        Ok(self.type_ids.push(id))
    }

    pub fn create_proto_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<ProtoId>> {
        expect_next(&self.proto_ids, i)?;
        let raw = dex_file.proto_id(i)?;
        let shorty = index(&self.string_ids, raw.shorty_idx)?;
        let return_type = index(&self.type_ids, raw.return_type_idx)?;
        let parameters = self.create_type_list(dex_file, raw.parameters_off, false)?;

        let mut id = ProtoId::new(shorty, return_type, parameters);
        id.info = ItemInfo::new(dex_file.proto_id_offset(i)?, PROTO_ID_ITEM_SIZE);
        Ok(self.proto_ids.push(id))
    }

    pub fn create_field_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<FieldId>> {
        expect_next(&self.field_ids, i)?;
        let raw = dex_file.field_id(i)?;
        let class = index(&self.type_ids, u32::from(raw.class_idx))?;
        let typ = index(&self.type_ids, u32::from(raw.type_idx))?;
        let name = index(&self.string_ids, raw.name_idx)?;

        let mut id = FieldId::new(class, typ, name);
        id.info = ItemInfo::new(dex_file.field_id_offset(i)?, FIELD_ID_ITEM_SIZE);
        Ok(self.field_ids.push(id))
    }

    pub fn create_method_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<MethodId>> {
        expect_next(&self.method_ids, i)?;
        let raw = dex_file.method_id(i)?;
        let class = index(&self.type_ids, u32::from(raw.class_idx))?;
        let proto = index(&self.proto_ids, u32::from(raw.proto_idx))?;
        let name = index(&self.string_ids, raw.name_idx)?;

        let mut id = MethodId::new(class, proto, name);
        id.info = ItemInfo::new(dex_file.method_id_offset(i)?, METHOD_ID_ITEM_SIZE);
        Ok(self.method_ids.push(id))
    }

    pub fn create_method_handle(
        &mut self,
        dex_file: &DexFile,
        i: u32,
    ) -> DexResult<Idx<MethodHandleItem>> {
        expect_next(&self.method_handles, i)?;
        let raw = dex_file.method_handle(i)?;
        let kind = MethodHandleKind::try_from(raw.method_handle_type)?;
        let target = u32::from(raw.field_or_method_id);
        if kind.is_field_accessor() {
            self.field_ids.check(Idx::new(target))?;
        } else {
            self.method_ids.check(Idx::new(target))?;
        }

        let mut item = MethodHandleItem::new(kind, raw.field_or_method_id);
        item.info = ItemInfo::new(dex_file.method_handle_offset(i)?, METHOD_HANDLE_ITEM_SIZE);
        Ok(self.method_handles.push(item))
    }

    pub fn create_call_site_id(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<CallSiteId>> {
        expect_next(&self.call_site_ids, i)?;
        let data = self
            .create_encoded_array(dex_file, dex_file.call_site_id(i)?)?
            .ok_or_else(|| DexError::InvalidOffset(format!("call site {i}")))?;

        let mut id = CallSiteId::new(data);
        id.info = ItemInfo::new(dex_file.call_site_id_offset(i)?, CALL_SITE_ID_ITEM_SIZE);
        Ok(self.call_site_ids.push(id))
    }

    pub fn create_class_def(&mut self, dex_file: &DexFile, i: u32) -> DexResult<Idx<ClassDef>> {
        expect_next(&self.class_defs, i)?;
        let raw = dex_file.class_def(i)?;

        let mut def = ClassDef::new(index(&self.type_ids, raw.class_idx)?, raw.access_flags);
        def.superclass = optional_index(&self.type_ids, raw.superclass_idx)?;
        def.interfaces = self.create_type_list(dex_file, raw.interfaces_off, false)?;
        def.source_file = optional_index(&self.string_ids, raw.source_file_idx)?;
        def.annotations = self.create_annotations_directory(dex_file, raw.annotations_off)?;
        def.class_data = self.create_class_data(dex_file, raw.class_data_off)?;
        def.static_values = self.create_encoded_array(dex_file, raw.static_values_off)?;
        def.info = ItemInfo::new(dex_file.class_def_offset(i)?, CLASS_DEF_ITEM_SIZE);

        self.add_class_def(def)
    }

    /// Type list at `offset`, shared with every previous request for the
    /// same offset. Offset 0 means "no list", unless `allow_empty` is set,
    /// in which case a (shared) empty list is returned.
    pub fn create_type_list(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
        allow_empty: bool,
    ) -> DexResult<Option<Idx<TypeList>>> {
        if offset == 0 && !allow_empty {
            return Ok(None);
        }
        if let Some(idx) = self.type_lists_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }
        if offset == 0 {
            let idx = self.type_lists.push(TypeList::new(Vec::new()));
            self.type_lists_by_offset.insert(0, idx);
            return Ok(Some(idx));
        }

        let (raw, size) = dex_file.type_list(offset)?;
        let types = raw
            .into_iter()
            .map(|t| index(&self.type_ids, u32::from(t)))
            .collect::<DexResult<Vec<_>>>()?;

        let mut list = TypeList::new(types);
        list.info = ItemInfo::new(offset, size);
        let idx = self.type_lists.push(list);
        self.type_lists_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_encoded_array(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<EncodedArrayItem>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.encoded_arrays_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let array = dex_file.encoded_array(offset)?;
        array.values.iter().try_for_each(|v| self.check_value(v))?;
        let idx = self.encoded_arrays.push(array);
        self.encoded_arrays_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_annotation_item(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Idx<AnnotationItem>> {
        if let Some(idx) = self.annotations_by_offset.get(&offset) {
            return Ok(*idx);
        }

        let item = dex_file.annotation(offset)?;
        self.check_annotation(&item.annotation)?;
        let idx = self.annotations.push(item);
        self.annotations_by_offset.insert(offset, idx);
        Ok(idx)
    }

    pub fn create_annotation_set(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<AnnotationSetItem>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.annotation_sets_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let (offsets, size) = dex_file.annotation_set(offset)?;
        let items = offsets
            .into_iter()
            .map(|off| self.create_annotation_item(dex_file, off))
            .collect::<DexResult<Vec<_>>>()?;

        let mut set = AnnotationSetItem::new(items);
        set.info = ItemInfo::new(offset, size);
        let idx = self.annotation_sets.push(set);
        self.annotation_sets_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_annotation_set_ref_list(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Idx<AnnotationSetRefList>> {
        if let Some(idx) = self.annotation_set_ref_lists_by_offset.get(&offset) {
            return Ok(*idx);
        }

        let (offsets, size) = dex_file.annotation_set_ref_list(offset)?;
        let items = offsets
            .into_iter()
            .map(|off| self.create_annotation_set(dex_file, off))
            .collect::<DexResult<Vec<_>>>()?;

        let mut list = AnnotationSetRefList::new(items);
        list.info = ItemInfo::new(offset, size);
        let idx = self.annotation_set_ref_lists.push(list);
        self.annotation_set_ref_lists_by_offset.insert(offset, idx);
        Ok(idx)
    }

    pub fn create_annotations_directory(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<AnnotationsDirectoryItem>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.annotations_directories_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let raw = dex_file.annotations_directory(offset)?;
        let mut dir = AnnotationsDirectoryItem::new();
        dir.class_annotation = self.create_annotation_set(dex_file, raw.class_annotations_off)?;
        for entry in &raw.field_annotations {
            let field = index(&self.field_ids, entry.idx)?;
            let annotations = self
                .create_annotation_set(dex_file, entry.annotations_off)?
                .ok_or_else(|| DexError::InvalidOffset(format!("annotations of field {field}")))?;
            dir.field_annotations.push(FieldAnnotation { field, annotations });
        }
        for entry in &raw.method_annotations {
            let method = index(&self.method_ids, entry.idx)?;
            let annotations = self
                .create_annotation_set(dex_file, entry.annotations_off)?
                .ok_or_else(|| {
                    DexError::InvalidOffset(format!("annotations of method {method}"))
                })?;
            dir.method_annotations.push(MethodAnnotation {
                method,
                annotations,
            });
        }
        for entry in &raw.parameter_annotations {
            let method = index(&self.method_ids, entry.idx)?;
            if entry.annotations_off == 0 {
                return Err(DexError::InvalidOffset(format!(
                    "parameter annotations of method {method}"
                )));
            }
            let annotations = self.create_annotation_set_ref_list(dex_file, entry.annotations_off)?;
            dir.parameter_annotations.push(ParameterAnnotation {
                method,
                annotations,
            });
        }

        dir.info = ItemInfo::new(offset, raw.size);
        let idx = self.annotations_directories.push(dir);
        self.annotations_directories_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_debug_info(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<DebugInfoItem>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.debug_infos_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let item = dex_file.debug_info(offset)?;
        self.check_debug_info(&item)?;
        let idx = self.debug_infos.push(item);
        self.debug_infos_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_code_item(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<CodeItem>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.code_items_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let raw = dex_file.code_item(offset)?;
        let mut code = CodeItem::new(raw.registers_size, raw.ins_size, raw.outs_size, raw.insns);
        code.debug_info = self.create_debug_info(dex_file, raw.debug_info_off)?;

        for (_, handler) in &raw.handlers {
            for pair in &handler.handlers {
                self.type_ids.check(pair.typ)?;
            }
        }
        for try_item in &raw.tries {
            let handler = raw
                .handlers
                .iter()
                .position(|(off, _)| *off == try_item.handler_off)
                .ok_or_else(|| {
                    DexError::Structure(format!(
                        "try at {:#x} has no handler list at {:#x}",
                        try_item.start_addr, try_item.handler_off
                    ))
                })?;
            code.tries.push(TryItem {
                start_addr: try_item.start_addr,
                insn_count: try_item.insn_count,
                handler,
            });
        }
        code.handlers = raw.handlers.into_iter().map(|(_, h)| h).collect();

        code.info = ItemInfo::new(offset, raw.size);
        let idx = self.code_items.push(code);
        self.code_items_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    pub fn create_class_data(
        &mut self,
        dex_file: &DexFile,
        offset: u32,
    ) -> DexResult<Option<Idx<ClassData>>> {
        if offset == 0 {
            return Ok(None);
        }
        if let Some(idx) = self.class_datas_by_offset.get(&offset) {
            return Ok(Some(*idx));
        }

        let raw = dex_file.class_data(offset)?;
        let mut data = ClassData::new();
        for (raw_fields, fields) in [
            (&raw.static_fields, &mut data.static_fields),
            (&raw.instance_fields, &mut data.instance_fields),
        ] {
            for f in raw_fields {
                fields.push(FieldItem {
                    access_flags: f.access_flags,
                    field: index(&self.field_ids, f.field_idx)?,
                });
            }
        }
        for (raw_methods, methods) in [
            (&raw.direct_methods, &mut data.direct_methods),
            (&raw.virtual_methods, &mut data.virtual_methods),
        ] {
            for m in raw_methods {
                let method = index(&self.method_ids, m.method_idx)?;
                let code = self.create_code_item(dex_file, m.code_off)?;
                methods.push(MethodItem {
                    access_flags: m.access_flags,
                    method,
                    code,
                });
            }
        }

        data.info = ItemInfo::new(offset, raw.size);
        let idx = self.class_datas.push(data);
        self.class_datas_by_offset.insert(offset, idx);
        Ok(Some(idx))
    }

    fn copy_section_offsets(&mut self, dex_file: &DexFile) {
        let h = dex_file.header();
        let table = |size: u32, off: u32| (size != 0).then_some(off);
        self.string_ids.set_offset(table(h.string_ids_size, h.string_ids_off));
        self.type_ids.set_offset(table(h.type_ids_size, h.type_ids_off));
        self.proto_ids.set_offset(table(h.proto_ids_size, h.proto_ids_off));
        self.field_ids.set_offset(table(h.field_ids_size, h.field_ids_off));
        self.method_ids.set_offset(table(h.method_ids_size, h.method_ids_off));
        self.class_defs.set_offset(table(h.class_defs_size, h.class_defs_off));

        let section = |typ: MapItemType| dex_file.map_item(typ).map(|item| item.offset);
        self.call_site_ids.set_offset(section(MapItemType::CallSiteIdItem));
        self.method_handles.set_offset(section(MapItemType::MethodHandleItem));
        self.string_datas.set_offset(section(MapItemType::StringDataItem));
        self.type_lists.set_offset(section(MapItemType::TypeList));
        self.annotation_set_ref_lists.set_offset(section(MapItemType::AnnotationSetRefList));
        self.annotation_sets.set_offset(section(MapItemType::AnnotationSetItem));
        self.class_datas.set_offset(section(MapItemType::ClassDataItem));
        self.code_items.set_offset(section(MapItemType::CodeItem));
        self.debug_infos.set_offset(section(MapItemType::DebugInfoItem));
        self.annotations.set_offset(section(MapItemType::AnnotationItem));
        self.encoded_arrays.set_offset(section(MapItemType::EncodedArrayItem));
        self.annotations_directories
            .set_offset(section(MapItemType::AnnotationsDirectoryItem));
        self.map_list_offset = section(MapItemType::MapList);
    }
}
