//! Map list: the trailing section directory of a dex container.

use crate::errors::DexError;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::convert::TryFrom;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
pub enum MapItemType {
    HeaderItem,
    StringIdItem,
    TypeIdItem,
    ProtoIdItem,
    FieldIdItem,
    MethodIdItem,
    ClassDefItem,
    CallSiteIdItem,
    MethodHandleItem,
    MapList,
    TypeList,
    AnnotationSetRefList,
    AnnotationSetItem,
    ClassDataItem,
    CodeItem,
    StringDataItem,
    DebugInfoItem,
    AnnotationItem,
    EncodedArrayItem,
    AnnotationsDirectoryItem,
    HiddenapiClassDataItem,
}

impl MapItemType {
    /// On-disk type code.
    pub const fn code(self) -> u16 {
        match self {
            Self::HeaderItem => 0x0000,
            Self::StringIdItem => 0x0001,
            Self::TypeIdItem => 0x0002,
            Self::ProtoIdItem => 0x0003,
            Self::FieldIdItem => 0x0004,
            Self::MethodIdItem => 0x0005,
            Self::ClassDefItem => 0x0006,
            Self::CallSiteIdItem => 0x0007,
            Self::MethodHandleItem => 0x0008,
            Self::MapList => 0x1000,
            Self::TypeList => 0x1001,
            Self::AnnotationSetRefList => 0x1002,
            Self::AnnotationSetItem => 0x1003,
            Self::ClassDataItem => 0x2000,
            Self::CodeItem => 0x2001,
            Self::StringDataItem => 0x2002,
            Self::DebugInfoItem => 0x2003,
            Self::AnnotationItem => 0x2004,
            Self::EncodedArrayItem => 0x2005,
            Self::AnnotationsDirectoryItem => 0x2006,
            Self::HiddenapiClassDataItem => 0xF000,
        }
    }

    /// Sections whose items are not 4-byte aligned.
    pub const fn is_byte_aligned(self) -> bool {
        matches!(
            self,
            Self::ClassDataItem
                | Self::StringDataItem
                | Self::DebugInfoItem
                | Self::AnnotationItem
                | Self::EncodedArrayItem
                | Self::HiddenapiClassDataItem
        )
    }
}

impl fmt::Display for MapItemType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HeaderItem => write!(f, "HEADER_ITEM"),
            Self::StringIdItem => write!(f, "STRING_ID_ITEM"),
            Self::TypeIdItem => write!(f, "TYPE_ID_ITEM"),
            Self::ProtoIdItem => write!(f, "PROTO_ID_ITEM"),
            Self::FieldIdItem => write!(f, "FIELD_ID_ITEM"),
            Self::MethodIdItem => write!(f, "METHOD_ID_ITEM"),
            Self::ClassDefItem => write!(f, "CLASS_DEF_ITEM"),
            Self::CallSiteIdItem => write!(f, "CALL_SITE_ID_ITEM"),
            Self::MethodHandleItem => write!(f, "METHOD_HANDLE_ITEM"),
            Self::MapList => write!(f, "MAP_LIST"),
            Self::TypeList => write!(f, "TYPE_LIST"),
            Self::AnnotationSetRefList => write!(f, "ANNOTATION_SET_REF_LIST"),
            Self::AnnotationSetItem => write!(f, "ANNOTATION_SET_ITEM"),
            Self::ClassDataItem => write!(f, "CLASS_DATA_ITEM"),
            Self::CodeItem => write!(f, "CODE_ITEM"),
            Self::StringDataItem => write!(f, "STRING_DATA_ITEM"),
            Self::DebugInfoItem => write!(f, "DEBUG_INFO_ITEM"),
            Self::AnnotationItem => write!(f, "ANNOTATION_ITEM"),
            Self::EncodedArrayItem => write!(f, "ENCODED_ARRAY_ITEM"),
            Self::AnnotationsDirectoryItem => write!(f, "ANNOTATIONS_DIRECTORY_ITEM"),
            Self::HiddenapiClassDataItem => write!(f, "HIDDENAPI_CLASS_DATA_ITEM"),
        }
    }
}

impl TryFrom<u16> for MapItemType {
    type Error = DexError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x0000 => Ok(Self::HeaderItem),
            0x0001 => Ok(Self::StringIdItem),
            0x0002 => Ok(Self::TypeIdItem),
            0x0003 => Ok(Self::ProtoIdItem),
            0x0004 => Ok(Self::FieldIdItem),
            0x0005 => Ok(Self::MethodIdItem),
            0x0006 => Ok(Self::ClassDefItem),
            0x0007 => Ok(Self::CallSiteIdItem),
            0x0008 => Ok(Self::MethodHandleItem),
            0x1000 => Ok(Self::MapList),
            0x1001 => Ok(Self::TypeList),
            0x1002 => Ok(Self::AnnotationSetRefList),
            0x1003 => Ok(Self::AnnotationSetItem),
            0x2000 => Ok(Self::ClassDataItem),
            0x2001 => Ok(Self::CodeItem),
            0x2002 => Ok(Self::StringDataItem),
            0x2003 => Ok(Self::DebugInfoItem),
            0x2004 => Ok(Self::AnnotationItem),
            0x2005 => Ok(Self::EncodedArrayItem),
            0x2006 => Ok(Self::AnnotationsDirectoryItem),
            0xF000 => Ok(Self::HiddenapiClassDataItem),
            _ => Err(DexError::Structure(format!("unknown map type: '{v:#06x}'"))),
        }
    }
}

/// One row of the map list: a section type, its item count and its start
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapItem {
    pub typ: MapItemType,
    pub size: u32,
    pub offset: u32,
}

impl MapItem {
    pub const fn new(typ: MapItemType, size: u32, offset: u32) -> Self {
        Self { typ, size, offset }
    }
}

// Reversed on offset so that the max-heap pops the lowest offset first.
impl Ord for MapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .offset
            .cmp(&self.offset)
            .then_with(|| other.typ.cmp(&self.typ))
    }
}

impl PartialOrd for MapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collects map items and yields them by ascending offset.
#[derive(Debug, Default)]
pub struct MapItemQueue {
    heap: BinaryHeap<MapItem>,
}

impl MapItemQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: MapItem) {
        self.heap.push(item);
    }

    /// Empty sections are not listed in the map.
    pub fn add_if_not_empty(&mut self, item: MapItem) {
        if item.size != 0 {
            self.heap.push(item);
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains the queue, lowest offset first.
    pub fn into_sorted(mut self) -> Vec<MapItem> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.heap.pop() {
            items.push(item);
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_pops_by_ascending_offset() {
        let mut queue = MapItemQueue::new();
        queue.push(MapItem::new(MapItemType::MapList, 1, 0x400));
        queue.add_if_not_empty(MapItem::new(MapItemType::StringIdItem, 3, 0x70));
        queue.add_if_not_empty(MapItem::new(MapItemType::TypeIdItem, 0, 0x7c));
        queue.push(MapItem::new(MapItemType::HeaderItem, 1, 0));
        queue.add_if_not_empty(MapItem::new(MapItemType::CodeItem, 2, 0x200));
        assert_eq!(queue.len(), 4);

        let offsets: Vec<u32> = queue.into_sorted().iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 0x70, 0x200, 0x400]);
    }

    #[test]
    fn type_codes_roundtrip() {
        for typ in [
            MapItemType::HeaderItem,
            MapItemType::MapList,
            MapItemType::CodeItem,
            MapItemType::StringDataItem,
            MapItemType::AnnotationsDirectoryItem,
        ] {
            assert_eq!(MapItemType::try_from(typ.code()).unwrap(), typ);
        }
        assert!(MapItemType::try_from(0x1234).is_err());
    }
}
