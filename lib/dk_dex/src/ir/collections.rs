use super::*;
use crate::errors::{DexError, DexResult};
use std::collections::HashMap;

/// Arena of items of one kind, with the offset of the section holding them.
#[derive(Debug)]
pub struct Collection<T> {
    items: Vec<T>,
    offset: Option<u32>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            offset: None,
        }
    }
}

impl<T: Item> Collection<T> {
    pub fn push(&mut self, item: T) -> Idx<T> {
        let idx = Idx::new(self.items.len() as u32);
        self.items.push(item);
        idx
    }

    pub fn get(&self, idx: Idx<T>) -> DexResult<&T> {
        self.items
            .get(idx.as_usize())
            .ok_or_else(|| DexError::out_of_range(T::KIND, idx.as_u32(), self.items.len()))
    }

    pub fn get_mut(&mut self, idx: Idx<T>) -> DexResult<&mut T> {
        let len = self.items.len();
        self.items
            .get_mut(idx.as_usize())
            .ok_or_else(|| DexError::out_of_range(T::KIND, idx.as_u32(), len))
    }

    /// Fails unless `idx` designates an item of this collection.
    pub fn check(&self, idx: Idx<T>) -> DexResult<()> {
        self.get(idx).map(|_| ())
    }

    /// Offset of `idx`, 0 when the item has no offset yet.
    pub fn offset_of(&self, idx: Idx<T>) -> DexResult<u32> {
        Ok(self.get(idx)?.offset_or_zero())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn indexed(&self) -> impl Iterator<Item = (Idx<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Idx::new(i as u32), item))
    }

    /// Offset of the section, if the section has been placed.
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Option<u32>) {
        self.offset = offset;
    }

    /// Item count, as recorded in the header and the map list.
    pub fn size(&self) -> u32 {
        self.items.len() as u32
    }
}

/// Every item collection of a dex container, plus the offset-keyed lookup
/// tables the builder uses so that items referenced from several places are
/// created once.
#[derive(Debug, Default)]
pub struct Collections {
    pub(crate) string_datas: Collection<StringData>,
    pub(crate) string_ids: Collection<StringId>,
    pub(crate) type_ids: Collection<TypeId>,
    pub(crate) proto_ids: Collection<ProtoId>,
    pub(crate) field_ids: Collection<FieldId>,
    pub(crate) method_ids: Collection<MethodId>,
    pub(crate) class_defs: Collection<ClassDef>,
    pub(crate) call_site_ids: Collection<CallSiteId>,
    pub(crate) method_handles: Collection<MethodHandleItem>,
    pub(crate) type_lists: Collection<TypeList>,
    pub(crate) class_datas: Collection<ClassData>,
    pub(crate) code_items: Collection<CodeItem>,
    pub(crate) debug_infos: Collection<DebugInfoItem>,
    pub(crate) encoded_arrays: Collection<EncodedArrayItem>,
    pub(crate) annotations: Collection<AnnotationItem>,
    pub(crate) annotation_sets: Collection<AnnotationSetItem>,
    pub(crate) annotation_set_ref_lists: Collection<AnnotationSetRefList>,
    pub(crate) annotations_directories: Collection<AnnotationsDirectoryItem>,
    pub(crate) map_list_offset: Option<u32>,

    pub(crate) type_lists_by_offset: HashMap<u32, Idx<TypeList>>,
    pub(crate) class_datas_by_offset: HashMap<u32, Idx<ClassData>>,
    pub(crate) code_items_by_offset: HashMap<u32, Idx<CodeItem>>,
    pub(crate) debug_infos_by_offset: HashMap<u32, Idx<DebugInfoItem>>,
    pub(crate) encoded_arrays_by_offset: HashMap<u32, Idx<EncodedArrayItem>>,
    pub(crate) annotations_by_offset: HashMap<u32, Idx<AnnotationItem>>,
    pub(crate) annotation_sets_by_offset: HashMap<u32, Idx<AnnotationSetItem>>,
    pub(crate) annotation_set_ref_lists_by_offset: HashMap<u32, Idx<AnnotationSetRefList>>,
    pub(crate) annotations_directories_by_offset: HashMap<u32, Idx<AnnotationsDirectoryItem>>,
}

macro_rules! accessors {
    ($($name:ident, $name_mut:ident: $typ:ty;)*) => {
        $(
            pub fn $name(&self) -> &Collection<$typ> {
                &self.$name
            }

            pub fn $name_mut(&mut self) -> &mut Collection<$typ> {
                &mut self.$name
            }
        )*
    };
}

impl Collections {
    accessors! {
        string_datas, string_datas_mut: StringData;
        string_ids, string_ids_mut: StringId;
        type_ids, type_ids_mut: TypeId;
        proto_ids, proto_ids_mut: ProtoId;
        field_ids, field_ids_mut: FieldId;
        method_ids, method_ids_mut: MethodId;
        class_defs, class_defs_mut: ClassDef;
        call_site_ids, call_site_ids_mut: CallSiteId;
        method_handles, method_handles_mut: MethodHandleItem;
        type_lists, type_lists_mut: TypeList;
        class_datas, class_datas_mut: ClassData;
        code_items, code_items_mut: CodeItem;
        debug_infos, debug_infos_mut: DebugInfoItem;
        encoded_arrays, encoded_arrays_mut: EncodedArrayItem;
        annotations, annotations_mut: AnnotationItem;
        annotation_sets, annotation_sets_mut: AnnotationSetItem;
        annotation_set_ref_lists, annotation_set_ref_lists_mut: AnnotationSetRefList;
        annotations_directories, annotations_directories_mut: AnnotationsDirectoryItem;
    }

    pub fn map_list_offset(&self) -> Option<u32> {
        self.map_list_offset
    }

    pub(crate) fn set_map_list_offset(&mut self, offset: Option<u32>) {
        self.map_list_offset = offset;
    }

    /// Adds a string and its id.
    pub fn add_string(&mut self, s: &str) -> Idx<StringId> {
        let data = self.string_datas.push(StringData::new(s));
        self.string_ids.push(StringId::new(data))
    }

    /// Adds a string and a type id whose descriptor is that string.
    pub fn add_type(&mut self, descriptor: &str) -> Idx<TypeId> {
        let descriptor = self.add_string(descriptor);
        self.type_ids.push(TypeId::new(descriptor))
    }

    /// Registers a class definition, linking every field and method of its
    /// class data back to it.
    pub fn add_class_def(&mut self, class_def: ClassDef) -> DexResult<Idx<ClassDef>> {
        self.type_ids.check(class_def.class_type)?;
        let idx = Idx::new(self.class_defs.size());
        if let Some(data) = class_def.class_data {
            self.link_members(idx, data)?;
        }
        Ok(self.class_defs.push(class_def))
    }

    // Members are only linked once all of them are known to be free.
    fn link_members(&mut self, class_def: Idx<ClassDef>, data: Idx<ClassData>) -> DexResult<()> {
        let data = self.class_datas.get(data)?;
        let fields: Vec<Idx<FieldId>> = data.fields().map(|f| f.field).collect();
        let methods: Vec<Idx<MethodId>> = data.methods().map(|m| m.method).collect();
        let field_owners = fields
            .iter()
            .map(|f| self.field_ids.get(*f).map(FieldId::class_def));
        let method_owners = methods
            .iter()
            .map(|m| self.method_ids.get(*m).map(MethodId::class_def));
        for owner in field_owners.chain(method_owners) {
            if let Some(owner) = owner? {
                if owner != class_def {
                    return Err(DexError::Structure(format!(
                        "class def {class_def} declares a member of class def {owner}"
                    )));
                }
            }
        }
        for field in fields {
            self.field_ids.get_mut(field)?.set_class_def(class_def)?;
        }
        for method in methods {
            self.method_ids.get_mut(method)?.set_class_def(class_def)?;
        }
        Ok(())
    }

    /// Resolves a string id to its text.
    pub fn string(&self, idx: Idx<StringId>) -> DexResult<String> {
        let id = self.string_ids.get(idx)?;
        Ok(self.string_datas.get(id.data)?.to_string_lossy())
    }

    /// Resolves a type id to its descriptor.
    pub fn type_descriptor(&self, idx: Idx<TypeId>) -> DexResult<String> {
        self.string(self.type_ids.get(idx)?.descriptor)
    }

    /// Fails unless every index held by `value` is in range.
    pub fn check_value(&self, value: &EncodedValue) -> DexResult<()> {
        match value {
            EncodedValue::MethodType(idx) => self.proto_ids.check(*idx),
            EncodedValue::MethodHandle(idx) => self.method_handles.check(*idx),
            EncodedValue::String(idx) => self.string_ids.check(*idx),
            EncodedValue::Type(idx) => self.type_ids.check(*idx),
            EncodedValue::Field(idx) | EncodedValue::Enum(idx) => self.field_ids.check(*idx),
            EncodedValue::Method(idx) => self.method_ids.check(*idx),
            EncodedValue::Array(values) => values.iter().try_for_each(|v| self.check_value(v)),
            EncodedValue::Annotation(annotation) => self.check_annotation(annotation),
            _ => Ok(()),
        }
    }

    pub fn check_annotation(&self, annotation: &EncodedAnnotation) -> DexResult<()> {
        self.type_ids.check(annotation.typ)?;
        for element in &annotation.elements {
            self.string_ids.check(element.name)?;
            self.check_value(&element.value)?;
        }
        Ok(())
    }

    pub fn check_debug_info(&self, debug_info: &DebugInfoItem) -> DexResult<()> {
        let check_string = |idx: &Option<Idx<StringId>>| match idx {
            Some(idx) => self.string_ids.check(*idx),
            None => Ok(()),
        };
        let check_type = |idx: &Option<Idx<TypeId>>| match idx {
            Some(idx) => self.type_ids.check(*idx),
            None => Ok(()),
        };

        debug_info.parameter_names.iter().try_for_each(check_string)?;
        for instr in &debug_info.bytecode {
            match instr {
                DbgInstr::StartLocal { name, typ, .. } => {
                    check_string(name)?;
                    check_type(typ)?;
                }
                DbgInstr::StartLocalExtended { name, typ, sig, .. } => {
                    check_string(name)?;
                    check_type(typ)?;
                    check_string(sig)?;
                }
                DbgInstr::SetFile { name } => check_string(name)?,
                _ => (),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_out_of_range() {
        let mut cols = Collections::default();
        let s = cols.add_string("Lfoo;");
        assert!(cols.string_ids().get(s).is_ok());
        match cols.string_ids().get(Idx::new(7)) {
            Err(DexError::IndexOutOfRange { kind, index, size }) => {
                assert_eq!(kind, "string id");
                assert_eq!(index, 7);
                assert_eq!(size, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn class_def_links_members() {
        let mut cols = Collections::default();
        let class = cols.add_type("LFoo;");
        let int = cols.add_type("I");
        let name = cols.add_string("x");
        let field = cols.field_ids_mut().push(FieldId::new(class, int, name));

        let mut data = ClassData::new();
        data.instance_fields.push(FieldItem {
            access_flags: 0,
            field,
        });
        let data = cols.class_datas_mut().push(data);

        let mut def = ClassDef::new(class, 1);
        def.class_data = Some(data);
        let def = cols.add_class_def(def).unwrap();
        assert_eq!(cols.field_ids().get(field).unwrap().class_def(), Some(def));

        let mut other = ClassDef::new(class, 1);
        other.class_data = Some(data);
        assert!(cols.add_class_def(other).is_err());
        assert_eq!(cols.class_defs().len(), 1);
    }

    #[test]
    fn value_checking_recurses() {
        let mut cols = Collections::default();
        let s = cols.add_string("a");
        let ok = EncodedValue::Array(vec![EncodedValue::String(s), EncodedValue::Int(3)]);
        assert!(cols.check_value(&ok).is_ok());
        let bad = EncodedValue::Array(vec![EncodedValue::Type(Idx::new(0))]);
        assert!(cols.check_value(&bad).is_err());
    }
}
