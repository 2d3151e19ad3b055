//! Binary codec layer - fixed-width record layouts
//!
//! Every store file is a 15-byte [`StoreHeader`] followed by a contiguous
//! run of fixed-size records:
//!
//! | Record               | Size | Layout                                                  |
//! |----------------------|------|---------------------------------------------------------|
//! | [`NodeRecord`]       | 13   | in_use, label_ptr, next_rel, next_prop                  |
//! | [`RelationshipRecord`] | 33 | in_use, first, second, type, 4 chain ptrs, next_prop    |
//! | [`LabelRecord`]      | 65   | in_use, reserved:4, payload:60                          |
//! | [`PropertyRecord`]   | 37   | in_use, next:2, prev:2, 4 x [`PropertyBlock`]           |
//! | [`StringRecord`]     | 64   | in_use, next:4, len:1, data:58                          |
//! | [`PropertyKeyRecord`]| 32   | in_use, len:1, name:30                                  |
//! | [`NodeIdRecord`]     | 5    | in_use, node_id:4                                       |
//!
//! Multi-byte integers follow the endianness recorded in the store header
//! (little endian unless the file says otherwise). Absent pointers are all
//! ones.

mod header;
mod key;
mod label;
mod node;
mod property;
mod relationship;
mod string;

pub use header::{HEADER_SIZE, STORE_MAGIC, StoreHeader, StoreKind};
pub use key::{MAX_KEY_NAME_LEN, PropertyKeyRecord};
pub use label::{LABEL_PAYLOAD_SIZE, LabelRecord, MAX_LABELS};
pub use node::{NodeIdRecord, NodeRecord};
pub use property::{
    BLOCKS_PER_RECORD, MAX_KEY_ID, MAX_TYPE_TAG, PropertyBlock, PropertyRecord, PropertyType,
    VALUE_BITS, VALUE_MASK,
};
pub use relationship::RelationshipRecord;
pub use string::{STRING_CHUNK_SIZE, StringRecord};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// 4-byte record pointer
pub type RecordId = u32;

/// Encoding of an absent 4-byte pointer
pub const NULL_REF: u32 = u32::MAX;

/// Encoding of an absent 2-byte pointer
pub const NULL_SHORT_REF: u16 = u16::MAX;

/// Byte order of multi-byte fields in a store file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

impl Endian {
    /// Header flag value for this byte order
    pub fn flag(self) -> u8 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    /// Decode a header flag
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Endian::Little),
            1 => Some(Endian::Big),
            _ => None,
        }
    }
}

impl std::str::FromStr for Endian {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" => Ok(Endian::Little),
            "big" => Ok(Endian::Big),
            other => Err(format!("unknown byte order '{}' (expected little or big)", other)),
        }
    }
}

/// A fixed-size record stored in a store file
pub trait StoreRecord: Sized {
    /// Encoded size in bytes
    const SIZE: usize;
    /// Name used in error messages
    const KIND: &'static str;

    /// Append the encoded record to `w`
    fn encode(&self, w: &mut ByteWriter);

    /// Decode a record from a reader positioned at its first byte
    fn decode(r: &mut ByteReader<'_>) -> Result<Self>;

    /// Whether the `in-use` flag is set
    fn in_use(&self) -> bool;

    /// Serialize using little endian
    fn serialize(&self) -> Vec<u8> {
        self.serialize_with(Endian::Little)
    }

    /// Serialize using an explicit byte order
    fn serialize_with(&self, endian: Endian) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(endian, Self::SIZE);
        self.encode(&mut w);
        debug_assert_eq!(w.len(), Self::SIZE, "{} encoder wrote wrong size", Self::KIND);
        w.into_inner()
    }

    /// Deserialize using little endian
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        Self::deserialize_with(bytes, Endian::Little)
    }

    /// Deserialize using an explicit byte order
    fn deserialize_with(bytes: &[u8], endian: Endian) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::malformed(Self::KIND, Self::SIZE, bytes.len()));
        }
        Self::decode(&mut ByteReader::new(bytes, endian))
    }
}

/// Append-only byte sink honoring a byte order
pub struct ByteWriter {
    buf: Vec<u8>,
    endian: Endian,
}

impl ByteWriter {
    /// Create a writer with preallocated capacity
    pub fn with_capacity(endian: Endian, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            endian,
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        match self.endian {
            Endian::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    pub fn put_u32(&mut self, v: u32) {
        match self.endian {
            Endian::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    /// Write an optional 4-byte pointer
    pub fn put_ref(&mut self, v: Option<RecordId>) {
        self.put_u32(v.unwrap_or(NULL_REF));
    }

    /// Write an optional 2-byte pointer
    pub fn put_short_ref(&mut self, v: Option<u16>) {
        self.put_u16(v.unwrap_or(NULL_SHORT_REF));
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write `bytes` and zero-pad up to `width`
    pub fn put_padded(&mut self, bytes: &[u8], width: usize) {
        debug_assert!(bytes.len() <= width);
        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + (width - bytes.len()), 0);
    }
}

/// Cursor over an encoded record honoring a byte order
///
/// Callers check the total length up front ([`StoreRecord::deserialize_with`]),
/// so the accessors index directly.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        let raw = self.take::<2>();
        match self.endian {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        }
    }

    pub fn u32(&mut self) -> u32 {
        let raw = self.take::<4>();
        match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }

    pub fn reference(&mut self) -> Option<RecordId> {
        match self.u32() {
            NULL_REF => None,
            id => Some(id),
        }
    }

    pub fn short_reference(&mut self) -> Option<u16> {
        match self.u16() {
            NULL_SHORT_REF => None,
            id => Some(id),
        }
    }

    pub fn bytes(&mut self, len: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        out
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        self.take::<N>()
    }
}
