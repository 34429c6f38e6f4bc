//! In-memory representation of a dex container.
//!
//! Every item lives in a per-kind [`Collection`] owned by [`Collections`].
//! Cross references are typed indices ([`Idx`]) into those collections, so
//! the whole model is a set of flat arenas: no reference counting, no
//! cycles. Each item carries an [`ItemInfo`] recording where it lives on
//! disk (as parsed, or as assigned by the writer) and how many bytes it
//! takes.

pub mod builder;
mod collections;
mod items;

pub use collections::{Collection, Collections};
pub use items::*;

use crate::raw::HeaderItem;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed position of an item in its [`Collection`].
pub struct Idx<T> {
    value: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Idx<T> {
    pub const fn new(value: u32) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    pub const fn as_u32(self) -> u32 {
        self.value
    }

    pub const fn as_usize(self) -> usize {
        self.value as usize
    }
}

impl<T> Clone for Idx<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Idx<T> {}

impl<T> PartialEq for Idx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Idx<T> {}

impl<T> PartialOrd for Idx<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Idx<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Idx<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for Idx<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> fmt::Display for Idx<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Location of an item: its offset (unset until parsed or written) and its
/// encoded size in bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    offset: Option<u32>,
    size: u32,
}

impl ItemInfo {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self {
            offset: Some(offset),
            size,
        }
    }
}

/// Common accessors of every dex item.
pub trait Item {
    /// Human readable kind, used in error messages.
    const KIND: &'static str;

    fn info(&self) -> &ItemInfo;

    fn info_mut(&mut self) -> &mut ItemInfo;

    fn offset(&self) -> Option<u32> {
        self.info().offset
    }

    /// Offset, with 0 standing for "none" as on disk.
    fn offset_or_zero(&self) -> u32 {
        self.info().offset.unwrap_or(0)
    }

    fn set_offset(&mut self, offset: u32) {
        self.info_mut().offset = Some(offset);
    }

    fn size(&self) -> u32 {
        self.info().size
    }

    fn set_size(&mut self, size: u32) {
        self.info_mut().size = size;
    }
}

macro_rules! impl_item {
    ($($typ:ident => $kind:literal),* $(,)?) => {
        $(
            impl $crate::ir::Item for $typ {
                const KIND: &'static str = $kind;

                fn info(&self) -> &$crate::ir::ItemInfo {
                    &self.info
                }

                fn info_mut(&mut self) -> &mut $crate::ir::ItemInfo {
                    &mut self.info
                }
            }
        )*
    };
}
pub(crate) use impl_item;

/// Root of the model: the header fields that are not derived from the
/// layout, plus every item collection.
#[derive(Debug)]
pub struct Header {
    magic: [u8; 8],
    checksum: u32,
    signature: [u8; 20],
    /// Size of the container this model was read from (0 if built from
    /// scratch).
    file_size: u32,
    collections: Collections,
}

/// Magic of the dex version written by default.
pub const DEFAULT_MAGIC: [u8; 8] = *b"dex\n035\0";

impl Header {
    pub fn new(magic: [u8; 8]) -> Self {
        Self {
            magic,
            checksum: 0,
            signature: [0; 20],
            file_size: 0,
            collections: Collections::default(),
        }
    }

    pub(crate) fn from_item(item: &HeaderItem) -> Self {
        Self {
            magic: item.magic,
            checksum: item.checksum,
            signature: item.signature,
            file_size: item.file_size,
            collections: Collections::default(),
        }
    }

    pub fn magic(&self) -> &[u8; 8] {
        &self.magic
    }

    /// Three-digit format version taken from the magic.
    pub fn version(&self) -> u32 {
        self.magic[4..7]
            .iter()
            .fold(0, |acc, d| acc * 10 + u32::from(d.wrapping_sub(b'0')))
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn set_checksum(&mut self, checksum: u32) {
        self.checksum = checksum;
    }

    pub fn signature(&self) -> &[u8; 20] {
        &self.signature
    }

    pub fn set_signature(&mut self, signature: [u8; 20]) {
        self.signature = signature;
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub(crate) fn set_file_size(&mut self, file_size: u32) {
        self.file_size = file_size;
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn collections_mut(&mut self) -> &mut Collections {
        &mut self.collections
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC)
    }
}
