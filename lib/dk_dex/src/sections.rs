//! Section classification of byte offsets and pages.
//!
//! Everything here is derived from the section offsets recorded in the
//! [`Collections`] of a [`Header`], either as parsed or as placed by the
//! writer. Nothing is mutated.

use crate::errors::{DexError, DexResult};
use crate::ir::{Collection, Collections, Header, Item};
use crate::map::MapItemType;
use serde::Serialize;
use std::collections::BTreeMap;

/// Default page size used for page statistics and visualization.
pub const PAGE_SIZE: u32 = 4096;

/// One section of a dex container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DexFileSection {
    pub name: &'static str,
    pub map_type: MapItemType,
    /// Item count.
    pub size: u32,
    pub offset: u32,
}

impl DexFileSection {
    fn new(map_type: MapItemType, size: u32, offset: u32) -> Self {
        Self {
            name: section_name(map_type),
            map_type,
            size,
            offset,
        }
    }

    fn of<T: Item>(map_type: MapItemType, collection: &Collection<T>) -> Self {
        Self::new(
            map_type,
            collection.size(),
            collection.offset().unwrap_or(0),
        )
    }

    pub fn letter(&self) -> char {
        section_letter(self.map_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

pub const fn section_name(map_type: MapItemType) -> &'static str {
    match map_type {
        MapItemType::HeaderItem => "Header",
        MapItemType::StringIdItem => "StringId",
        MapItemType::TypeIdItem => "TypeId",
        MapItemType::ProtoIdItem => "ProtoId",
        MapItemType::FieldIdItem => "FieldId",
        MapItemType::MethodIdItem => "MethodId",
        MapItemType::ClassDefItem => "ClassDef",
        MapItemType::CallSiteIdItem => "CallSiteId",
        MapItemType::MethodHandleItem => "MethodHandle",
        MapItemType::MapList => "TypeMap",
        MapItemType::TypeList => "TypeList",
        MapItemType::AnnotationSetRefList => "AnnotationSetReferenceItem",
        MapItemType::AnnotationSetItem => "AnnotationSetItem",
        MapItemType::ClassDataItem => "ClassData",
        MapItemType::CodeItem => "CodeItem",
        MapItemType::StringDataItem => "StringData",
        MapItemType::DebugInfoItem => "DebugInfo",
        MapItemType::AnnotationItem => "AnnotationItem",
        MapItemType::EncodedArrayItem => "EncodedArrayItem",
        MapItemType::AnnotationsDirectoryItem => "AnnotationsDirectoryItem",
        MapItemType::HiddenapiClassDataItem => "HiddenapiClassData",
    }
}

/// One-character key of a section in page dumps.
pub const fn section_letter(map_type: MapItemType) -> char {
    match map_type {
        MapItemType::HeaderItem => 'H',
        MapItemType::StringIdItem => 'S',
        MapItemType::TypeIdItem => 'T',
        MapItemType::ProtoIdItem => 'P',
        MapItemType::FieldIdItem => 'F',
        MapItemType::MethodIdItem => 'M',
        MapItemType::ClassDefItem => 'C',
        MapItemType::CallSiteIdItem => 'z',
        MapItemType::MethodHandleItem => 'Z',
        MapItemType::MapList => 'L',
        MapItemType::TypeList => 't',
        MapItemType::AnnotationSetRefList => '1',
        MapItemType::AnnotationSetItem => '2',
        MapItemType::ClassDataItem => 'c',
        MapItemType::CodeItem => 'X',
        MapItemType::StringDataItem => 's',
        MapItemType::DebugInfoItem => 'D',
        MapItemType::AnnotationItem => '3',
        MapItemType::EncodedArrayItem => 'E',
        MapItemType::AnnotationsDirectoryItem => '4',
        MapItemType::HiddenapiClassDataItem => '-',
    }
}

fn all_sections(collections: &Collections) -> Vec<DexFileSection> {
    use MapItemType::*;

    let map_list = match collections.map_list_offset() {
        Some(offset) => DexFileSection::new(MapList, 1, offset),
        None => DexFileSection::new(MapList, 0, 0),
    };
    vec![
        DexFileSection::new(HeaderItem, 1, 0),
        DexFileSection::of(StringIdItem, collections.string_ids()),
        DexFileSection::of(TypeIdItem, collections.type_ids()),
        DexFileSection::of(ProtoIdItem, collections.proto_ids()),
        DexFileSection::of(FieldIdItem, collections.field_ids()),
        DexFileSection::of(MethodIdItem, collections.method_ids()),
        DexFileSection::of(ClassDefItem, collections.class_defs()),
        DexFileSection::of(CallSiteIdItem, collections.call_site_ids()),
        DexFileSection::of(MethodHandleItem, collections.method_handles()),
        map_list,
        DexFileSection::of(TypeList, collections.type_lists()),
        DexFileSection::of(AnnotationSetRefList, collections.annotation_set_ref_lists()),
        DexFileSection::of(AnnotationSetItem, collections.annotation_sets()),
        DexFileSection::of(ClassDataItem, collections.class_datas()),
        DexFileSection::of(CodeItem, collections.code_items()),
        DexFileSection::of(StringDataItem, collections.string_datas()),
        DexFileSection::of(DebugInfoItem, collections.debug_infos()),
        DexFileSection::of(AnnotationItem, collections.annotations()),
        DexFileSection::of(EncodedArrayItem, collections.encoded_arrays()),
        DexFileSection::of(AnnotationsDirectoryItem, collections.annotations_directories()),
    ]
}

/// Every section of `header`, sorted by offset. Sections sharing an offset
/// keep their map order.
pub fn sorted_sections(header: &Header, order: SortOrder) -> Vec<DexFileSection> {
    let mut sections = all_sections(header.collections());
    match order {
        SortOrder::Ascending => sections.sort_by_key(|s| s.offset),
        SortOrder::Descending => sections.sort_by(|a, b| b.offset.cmp(&a.offset)),
    }
    sections
}

/// Maps byte offsets to the plot color of the section they fall in.
#[derive(Debug)]
pub struct ColorTable {
    table: Vec<(MapItemType, u32)>,
}

impl ColorTable {
    pub fn new(collections: &Collections) -> Self {
        let mut table: Vec<(MapItemType, u32)> = all_sections(collections)
            .into_iter()
            .filter(|s| s.map_type != MapItemType::MapList)
            .map(|s| (s.map_type, s.offset))
            .collect();
        table.sort_by(|a, b| b.1.cmp(&a.1));
        Self { table }
    }

    /// Section holding `offset`: the first one, in descending order, that
    /// starts strictly below it.
    pub fn section_of(&self, offset: u32) -> Option<MapItemType> {
        self.table
            .iter()
            .find(|(_, start)| *start < offset)
            .map(|(typ, _)| *typ)
    }

    pub fn color(&self, offset: u32) -> u32 {
        match self.section_of(offset) {
            Some(MapItemType::ClassDefItem) => 1,
            Some(MapItemType::ClassDataItem) => 3,
            Some(MapItemType::CodeItem) => 4,
            _ => 0,
        }
    }
}

/// Attributes `page` to the highest-offset non-empty section starting at or
/// before it. `sections` must be sorted in descending order.
pub fn find_section_type_for_page(
    page: u32,
    sections: &[DexFileSection],
    page_size: u32,
) -> MapItemType {
    sections
        .iter()
        .filter(|s| s.size != 0)
        .find(|s| s.offset / page_size <= page)
        .map(|s| s.map_type)
        .unwrap_or(MapItemType::HeaderItem)
}

/// Number of pages attributed to each section type.
#[derive(Debug, Default, Clone)]
pub struct PageCount {
    counts: BTreeMap<MapItemType, usize>,
}

impl PageCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, typ: MapItemType) {
        *self.counts.entry(typ).or_insert(0) += 1;
    }

    pub fn get(&self, typ: MapItemType) -> usize {
        self.counts.get(&typ).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionStatistics {
    pub name: &'static str,
    pub letter: char,
    pub offset: u32,
    pub items: u32,
    pub pages: usize,
}

fn check_page_size(page_size: u32) -> DexResult<()> {
    if page_size == 0 || !page_size.is_power_of_two() {
        return Err(DexError::BadSize(format!("page size {}", page_size)));
    }
    Ok(())
}

/// Counts, for every page of a `file_size` bytes container, the section it
/// belongs to, and returns one entry per section in ascending offset order.
pub fn section_statistics(
    header: &Header,
    file_size: u32,
    page_size: u32,
) -> DexResult<Vec<SectionStatistics>> {
    check_page_size(page_size)?;

    let sections = sorted_sections(header, SortOrder::Descending);
    let pages = file_size / page_size + u32::from(file_size % page_size != 0);
    let mut counts = PageCount::new();
    for page in 0..pages {
        counts.increment(find_section_type_for_page(page, &sections, page_size));
    }

    Ok(sections
        .iter()
        .rev()
        .map(|s| SectionStatistics {
            name: s.name,
            letter: s.letter(),
            offset: s.offset,
            items: s.size,
            pages: counts.get(s.map_type),
        })
        .collect())
}

/// One letter per page of the container, as dexdiag prints them.
pub fn page_letters(header: &Header, file_size: u32, page_size: u32) -> DexResult<String> {
    check_page_size(page_size)?;

    let sections = sorted_sections(header, SortOrder::Descending);
    let pages = file_size / page_size + u32::from(file_size % page_size != 0);
    Ok((0..pages)
        .map(|page| section_letter(find_section_type_for_page(page, &sections, page_size)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(map_type: MapItemType, size: u32, offset: u32) -> DexFileSection {
        DexFileSection::new(map_type, size, offset)
    }

    fn sample_header() -> Header {
        let mut header = Header::default();
        let cols = header.collections_mut();
        cols.add_type("LFoo;");
        cols.string_ids_mut().set_offset(Some(0x70));
        cols.type_ids_mut().set_offset(Some(0x74));
        cols.string_datas_mut().set_offset(Some(0x2000));
        cols.set_map_list_offset(Some(0x3000));
        header
    }

    #[test]
    fn pages_go_to_highest_started_section() {
        let sections = vec![
            section(MapItemType::CodeItem, 3, 0x3000),
            section(MapItemType::ClassDataItem, 0, 0x2000),
            section(MapItemType::StringIdItem, 10, 0x70),
        ];
        assert_eq!(
            find_section_type_for_page(0, &sections, 0x1000),
            MapItemType::StringIdItem
        );
        assert_eq!(
            find_section_type_for_page(2, &sections, 0x1000),
            MapItemType::StringIdItem
        );
        assert_eq!(
            find_section_type_for_page(3, &sections, 0x1000),
            MapItemType::CodeItem
        );
        assert_eq!(
            find_section_type_for_page(0, &sections[..1], 0x1000),
            MapItemType::HeaderItem
        );
    }

    #[test]
    fn colors() {
        let mut cols = Collections::default();
        cols.class_defs_mut().set_offset(Some(0x100));
        cols.class_datas_mut().set_offset(Some(0x400));
        cols.code_items_mut().set_offset(Some(0x200));
        let table = ColorTable::new(&cols);

        assert_eq!(table.color(0x100), 0);
        assert_eq!(table.color(0x101), 1);
        assert_eq!(table.color(0x250), 4);
        assert_eq!(table.color(0x400), 4);
        assert_eq!(table.color(0x401), 3);
    }

    #[test]
    fn sorting() {
        let header = sample_header();
        let asc = sorted_sections(&header, SortOrder::Ascending);
        let desc = sorted_sections(&header, SortOrder::Descending);
        assert_eq!(asc.len(), desc.len());
        assert_eq!(asc[0].map_type, MapItemType::HeaderItem);
        assert_eq!(desc[0].map_type, MapItemType::MapList);
        assert!(asc.windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn statistics() {
        let header = sample_header();
        let stats = section_statistics(&header, 0x3010, 0x1000).unwrap();
        let pages: usize = stats.iter().map(|s| s.pages).sum();
        assert_eq!(pages, 4);

        let of = |name: &str| stats.iter().find(|s| s.name == name).unwrap().pages;
        assert_eq!(of("Header"), 0);
        assert_eq!(of("TypeId"), 2);
        assert_eq!(of("StringData"), 1);
        assert_eq!(of("TypeMap"), 1);
        // empty sections never own a page
        assert_eq!(of("ClassData"), 0);

        assert_eq!(page_letters(&header, 0x3010, 0x1000).unwrap(), "TTsL");
        assert!(section_statistics(&header, 0x3010, 1000).is_err());
    }
}
