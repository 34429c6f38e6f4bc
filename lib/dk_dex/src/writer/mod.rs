//! Lays out and serializes a [`Header`] into a dex container.
//!
//! Writing goes through five strictly sequential phases:
//!
//! 1. id tables, some of them only reserved because they point into the
//!    data section,
//! 2. the data section, in dependency order so that every item is placed
//!    before the items referencing it,
//! 3. fixups of the reserved id tables,
//! 4. the map list,
//! 5. the header, with checksum and signature.
//!
//! Every item gets its final offset and size recorded in the model.

mod dedupe;
mod items;

pub use dedupe::Deduper;

use crate::errors::{DexError, DexResult};
use crate::file::{compute_checksum, compute_signature};
use crate::ir::*;
use crate::map::{MapItem, MapItemQueue, MapItemType};
use crate::raw::*;
use dk_utils::writers::{align4, align8, align_to, bytes, le_u32};
use items::*;
use std::convert::TryFrom;
use std::io::{Cursor, Seek, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutLevel {
    /// One copy of every item of the model.
    Standard,
    /// Items with identical encodings are written once.
    Compact,
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub level: LayoutLevel,
    /// Deduplicate data items (compact level only).
    pub dedupe: bool,
    /// Also deduplicate code items (compact level only).
    pub dedupe_code_items: bool,
    /// Recompute the header checksum and signature.
    pub recompute_checksums: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            level: LayoutLevel::Standard,
            dedupe: true,
            dedupe_code_items: false,
            recompute_checksums: true,
        }
    }
}

impl WriterOptions {
    pub fn compact() -> Self {
        Self {
            level: LayoutLevel::Compact,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WritePhase {
    ReserveIds,
    Data,
    Fixups,
    MapList,
    Header,
}

type Stream = Cursor<Vec<u8>>;

pub struct DexWriter<'h> {
    header: &'h mut Header,
    options: WriterOptions,
    stream: Stream,
    phase: Option<WritePhase>,
    data_dedupe: Deduper,
    code_dedupe: Deduper,
    queue: MapItemQueue,
    data_off: u32,
    data_size: u32,
    map_off: u32,
}

fn position<S: Seek>(stream: &mut S) -> DexResult<u32> {
    let pos = stream.stream_position()?;
    u32::try_from(pos).map_err(|_| DexError::Overflow(format!("stream position {pos:#x}")))
}

fn seek_to<T: Item>(stream: &mut Stream, item: &T) -> DexResult<()> {
    let offset = item
        .offset()
        .ok_or_else(|| DexError::Structure(format!("{} was not reserved", T::KIND)))?;
    stream.set_position(u64::from(offset));
    Ok(())
}

fn reserve<T>(size: u32) -> impl FnMut(&mut Stream, &T) -> DexResult<usize> {
    move |stream, _| Ok(bytes(stream, &vec![0; size as usize])?)
}

// Writes a fixed-size id table; `writer` may only reserve the space.
fn id_section<T, F>(
    stream: &mut Stream,
    collection: &mut Collection<T>,
    typ: MapItemType,
    item_size: u32,
    mut writer: F,
) -> DexResult<MapItem>
where
    T: Item,
    F: FnMut(&mut Stream, &T) -> DexResult<usize>,
{
    align4(stream)?;
    let start = position(stream)?;
    for item in collection.iter() {
        let siz = writer(stream, item)?;
        debug_assert_eq!(siz, item_size as usize);
    }
    position(stream)?;

    for (i, item) in collection.iter_mut().enumerate() {
        item.set_offset(start + i as u32 * item_size);
        item.set_size(item_size);
    }
    collection.set_offset((!collection.is_empty()).then_some(start));
    log::trace!("wrote {} {typ} items at {start:#x}", collection.len());
    Ok(MapItem::new(typ, collection.size(), start))
}

// Writes a data section. With an enabled deduper, an item whose bytes were
// already written is rewound and points at the earlier copy.
fn data_section<T, F>(
    stream: &mut Stream,
    deduper: &mut Deduper,
    collection: &mut Collection<T>,
    typ: MapItemType,
    mut writer: F,
) -> DexResult<MapItem>
where
    T: Item,
    F: FnMut(&mut Stream, &T) -> DexResult<usize>,
{
    let alignment = if typ.is_byte_aligned() { 1 } else { 4 };
    align_to(stream, u64::from(alignment))?;
    let start = position(stream)?;

    let mut placed = Vec::with_capacity(collection.len());
    let mut written = 0;
    for item in collection.iter() {
        align_to(stream, u64::from(alignment))?;
        let item_start = position(stream)?;
        let siz = writer(stream, item)?;
        let item_end = position(stream)?;
        debug_assert_eq!(siz, (item_end - item_start) as usize);

        let size = item_end - item_start;
        match deduper.dedupe(stream.get_ref(), item_start, item_end, alignment) {
            Some(previous) => {
                stream.get_mut().truncate(item_start as usize);
                stream.set_position(u64::from(item_start));
                placed.push((previous, size));
            }
            None => {
                written += 1;
                placed.push((item_start, size));
            }
        }
    }

    for (item, (offset, size)) in collection.iter_mut().zip(placed) {
        item.set_offset(offset);
        item.set_size(size);
    }
    collection.set_offset((written != 0).then_some(start));
    log::trace!(
        "wrote {written} {typ} items at {start:#x} ({} deduplicated)",
        collection.size() - written
    );
    Ok(MapItem::new(typ, written, start))
}

impl<'h> DexWriter<'h> {
    pub fn new(header: &'h mut Header, options: WriterOptions) -> Self {
        let compact = options.level == LayoutLevel::Compact;
        let data_dedupe = Deduper::new(compact && options.dedupe);
        let code_dedupe = Deduper::new(compact && options.dedupe_code_items);
        Self {
            header,
            options,
            stream: Cursor::new(Vec::new()),
            phase: None,
            data_dedupe,
            code_dedupe,
            queue: MapItemQueue::new(),
            data_off: 0,
            data_size: 0,
            map_off: 0,
        }
    }

    /// Lays out `header` and returns the container bytes. Offsets and sizes
    /// of every item, and the header checksum and signature, are updated.
    pub fn output(header: &mut Header, options: &WriterOptions) -> DexResult<Vec<u8>> {
        DexWriter::new(header, options.clone()).write()
    }

    pub fn write(mut self) -> DexResult<Vec<u8>> {
        log::trace!("writing dex ({:?} layout)", self.options.level);
        self.write_ids()?;
        self.write_data()?;
        self.write_fixups()?;
        self.write_map_list()?;
        self.write_header()?;
        Ok(self.stream.into_inner())
    }

    fn enter(&mut self, phase: WritePhase) {
        debug_assert!(self.phase.map_or(true, |current| current < phase));
        log::trace!("{phase:?} phase at {:#x}", self.stream.position());
        self.phase = Some(phase);
    }

    fn write_ids(&mut self) -> DexResult<()> {
        self.enter(WritePhase::ReserveIds);
        let Self {
            header,
            stream,
            queue,
            ..
        } = self;
        let cols = header.collections_mut();

        bytes(stream, &[0; HEADER_SIZE as usize])?;

        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.string_ids,
            MapItemType::StringIdItem,
            STRING_ID_ITEM_SIZE,
            reserve(STRING_ID_ITEM_SIZE),
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.type_ids,
            MapItemType::TypeIdItem,
            TYPE_ID_ITEM_SIZE,
            |stream, item| Ok(type_id_writer(stream, item)?),
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.proto_ids,
            MapItemType::ProtoIdItem,
            PROTO_ID_ITEM_SIZE,
            reserve(PROTO_ID_ITEM_SIZE),
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.field_ids,
            MapItemType::FieldIdItem,
            FIELD_ID_ITEM_SIZE,
            field_id_writer,
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.method_ids,
            MapItemType::MethodIdItem,
            METHOD_ID_ITEM_SIZE,
            method_id_writer,
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.class_defs,
            MapItemType::ClassDefItem,
            CLASS_DEF_ITEM_SIZE,
            reserve(CLASS_DEF_ITEM_SIZE),
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.call_site_ids,
            MapItemType::CallSiteIdItem,
            CALL_SITE_ID_ITEM_SIZE,
            reserve(CALL_SITE_ID_ITEM_SIZE),
        )?);
        queue.add_if_not_empty(id_section(
            stream,
            &mut cols.method_handles,
            MapItemType::MethodHandleItem,
            METHOD_HANDLE_ITEM_SIZE,
            |stream, item| Ok(method_handle_writer(stream, item)?),
        )?);
        Ok(())
    }

    fn write_data(&mut self) -> DexResult<()> {
        self.enter(WritePhase::Data);
        let Self {
            header,
            stream,
            queue,
            data_dedupe,
            code_dedupe,
            ..
        } = self;
        let cols = header.collections_mut();

        align8(stream)?;
        let data_off = position(stream)?;

        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.debug_infos,
            MapItemType::DebugInfoItem,
            debug_info_writer,
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            code_dedupe,
            &mut cols.code_items,
            MapItemType::CodeItem,
            |stream, item| code_item_writer(stream, item, &cols.debug_infos),
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.encoded_arrays,
            MapItemType::EncodedArrayItem,
            encoded_array_item_writer,
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.annotations,
            MapItemType::AnnotationItem,
            annotation_item_writer,
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.annotation_sets,
            MapItemType::AnnotationSetItem,
            |stream, item| annotation_set_writer(stream, item, &cols.annotations),
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.annotation_set_ref_lists,
            MapItemType::AnnotationSetRefList,
            |stream, item| annotation_set_ref_list_writer(stream, item, &cols.annotation_sets),
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.annotations_directories,
            MapItemType::AnnotationsDirectoryItem,
            |stream, item| {
                annotations_directory_writer(
                    stream,
                    item,
                    &cols.annotation_sets,
                    &cols.annotation_set_ref_lists,
                )
            },
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.type_lists,
            MapItemType::TypeList,
            type_list_writer,
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.class_datas,
            MapItemType::ClassDataItem,
            |stream, item| class_data_writer(stream, item, &cols.code_items),
        )?);
        queue.add_if_not_empty(data_section(
            stream,
            data_dedupe,
            &mut cols.string_datas,
            MapItemType::StringDataItem,
            |stream, item| Ok(string_data_writer(stream, item)?),
        )?);

        align8(stream)?;
        let data_end = position(stream)?;
        self.data_size = data_end - data_off;
        self.data_off = if self.data_size == 0 { 0 } else { data_off };
        log::trace!("data section: {:#x} bytes at {data_off:#x}", self.data_size);
        Ok(())
    }

    fn write_fixups(&mut self) -> DexResult<()> {
        self.enter(WritePhase::Fixups);
        let stream = &mut self.stream;
        let cols = self.header.collections();
        let end = stream.position();

        for id in cols.string_ids().iter() {
            seek_to(stream, id)?;
            le_u32(stream, cols.string_datas().offset_of(id.data)?)?;
        }
        for proto in cols.proto_ids().iter() {
            seek_to(stream, proto)?;
            proto_id_writer(stream, proto, cols.type_lists())?;
        }
        for class_def in cols.class_defs().iter() {
            seek_to(stream, class_def)?;
            class_def_writer(stream, class_def, cols)?;
        }
        for call_site in cols.call_site_ids().iter() {
            seek_to(stream, call_site)?;
            le_u32(stream, cols.encoded_arrays().offset_of(call_site.data)?)?;
        }

        stream.set_position(end);
        Ok(())
    }

    fn write_map_list(&mut self) -> DexResult<()> {
        self.enter(WritePhase::MapList);
        align4(&mut self.stream)?;
        self.map_off = position(&mut self.stream)?;

        let mut queue = std::mem::take(&mut self.queue);
        queue.push(MapItem::new(MapItemType::HeaderItem, 1, 0));
        queue.push(MapItem::new(MapItemType::MapList, 1, self.map_off));
        let items = queue.into_sorted();
        for item in &items {
            log::debug!("map: {} x{} at {:#x}", item.typ, item.size, item.offset);
        }
        map_list_writer(&mut self.stream, &items)?;
        position(&mut self.stream)?;

        self.header
            .collections_mut()
            .set_map_list_offset(Some(self.map_off));
        Ok(())
    }

    fn write_header(&mut self) -> DexResult<()> {
        self.enter(WritePhase::Header);
        let file_size = u32::try_from(self.stream.get_ref().len())
            .map_err(|_| DexError::Overflow("file size".to_string()))?;

        let cols = self.header.collections();
        let table = |size: u32, offset: Option<u32>| (size, offset.unwrap_or(0));
        let (string_ids_size, string_ids_off) = table(cols.string_ids().size(), cols.string_ids().offset());
        let (type_ids_size, type_ids_off) = table(cols.type_ids().size(), cols.type_ids().offset());
        let (proto_ids_size, proto_ids_off) = table(cols.proto_ids().size(), cols.proto_ids().offset());
        let (field_ids_size, field_ids_off) = table(cols.field_ids().size(), cols.field_ids().offset());
        let (method_ids_size, method_ids_off) = table(cols.method_ids().size(), cols.method_ids().offset());
        let (class_defs_size, class_defs_off) = table(cols.class_defs().size(), cols.class_defs().offset());

        let item = HeaderItem {
            magic: *self.header.magic(),
            version: self.header.version(),
            checksum: self.header.checksum(),
            signature: *self.header.signature(),
            file_size,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off: self.map_off,
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
            data_size: self.data_size,
            data_off: self.data_off,
        };
        self.stream.set_position(0);
        let siz = header_item_writer(&mut self.stream, &item)?;
        debug_assert_eq!(siz, HEADER_SIZE as usize);

        if self.options.recompute_checksums {
            let signature = compute_signature(self.stream.get_ref())?;
            self.stream.set_position(12);
            self.stream.write_all(&signature)?;
            let checksum = compute_checksum(self.stream.get_ref())?;
            self.stream.set_position(8);
            le_u32(&mut self.stream, checksum)?;
            self.header.set_signature(signature);
            self.header.set_checksum(checksum);
            log::debug!("checksum {checksum:#010x}");
        }
        self.header.set_file_size(file_size);
        Ok(())
    }
}
