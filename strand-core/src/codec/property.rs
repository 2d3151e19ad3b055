//! Property records (37 bytes) and bit-packed property blocks (8 bytes)
//!
//! Block layout, most significant bit first:
//!
//! ```text
//! byte:  0        1        2        3        4        5        6        7
//!        kkkktttt tttttttt tttttttt ttttvvvv vvvvvvvv vvvvvvvv vvvvvvvv vvvvvvvv
//! ```
//!
//! `k` = 4-bit key id, `t` = 24-bit type tag, `v` = 36-bit value. The block
//! layout is defined byte by byte and does not depend on the store's
//! endianness.

use super::{ByteReader, ByteWriter, StoreRecord};
use crate::{Error, Result};

/// Blocks embedded in one property record
pub const BLOCKS_PER_RECORD: usize = 4;

/// Largest key id a block can carry
pub const MAX_KEY_ID: u8 = 0x0F;

/// Largest type tag a block can carry
pub const MAX_TYPE_TAG: u32 = 0x00FF_FFFF;

/// Width of the value field
pub const VALUE_BITS: u32 = 36;

/// Mask of the value field
pub const VALUE_MASK: u64 = (1 << VALUE_BITS) - 1;

const INT_MIN: i64 = -(1 << (VALUE_BITS - 1));
const INT_MAX: i64 = (1 << (VALUE_BITS - 1)) - 1;

/// Type tags understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Unused block
    Empty,
    /// Inline boolean
    Bool,
    /// Inline 36-bit two's complement integer
    Int,
    /// Head record id of a chain in the string store
    String,
    /// Head record of an array (reserved)
    Array,
    /// Tag written by a newer format
    Unknown(u32),
}

impl PropertyType {
    /// Numeric tag stored in the block
    pub fn tag(self) -> u32 {
        match self {
            PropertyType::Empty => 0,
            PropertyType::Bool => 1,
            PropertyType::Int => 2,
            PropertyType::String => 3,
            PropertyType::Array => 4,
            PropertyType::Unknown(tag) => tag,
        }
    }

    /// Decode a numeric tag
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => PropertyType::Empty,
            1 => PropertyType::Bool,
            2 => PropertyType::Int,
            3 => PropertyType::String,
            4 => PropertyType::Array,
            other => PropertyType::Unknown(other),
        }
    }
}

/// One packed (key, type, value) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyBlock {
    key: u8,
    type_tag: u32,
    value: u64,
}

impl PropertyBlock {
    /// Encoded size
    pub const SIZE: usize = 8;

    /// Build a block, rejecting fields wider than their bit slots
    pub fn new(key: u8, type_tag: u32, value: u64) -> Result<Self> {
        if key > MAX_KEY_ID {
            return Err(Error::ValueOutOfRange(format!(
                "property key id {} exceeds {}",
                key, MAX_KEY_ID
            )));
        }
        if type_tag > MAX_TYPE_TAG {
            return Err(Error::ValueOutOfRange(format!(
                "property type tag {:#x} exceeds 24 bits",
                type_tag
            )));
        }
        if value > VALUE_MASK {
            return Err(Error::ValueOutOfRange(format!(
                "property value {:#x} exceeds 36 bits",
                value
            )));
        }
        Ok(Self {
            key,
            type_tag,
            value,
        })
    }

    /// Inline integer block
    pub fn int(key: u8, value: i64) -> Result<Self> {
        if !(INT_MIN..=INT_MAX).contains(&value) {
            return Err(Error::ValueOutOfRange(format!(
                "integer {} does not fit in {} bits",
                value, VALUE_BITS
            )));
        }
        Self::new(key, PropertyType::Int.tag(), (value as u64) & VALUE_MASK)
    }

    /// Inline boolean block
    pub fn bool(key: u8, value: bool) -> Result<Self> {
        Self::new(key, PropertyType::Bool.tag(), value as u64)
    }

    /// Block pointing at a string chain
    pub fn string_ref(key: u8, head: u32) -> Result<Self> {
        Self::new(key, PropertyType::String.tag(), head as u64)
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    pub fn property_type(&self) -> PropertyType {
        PropertyType::from_tag(self.type_tag)
    }

    /// Raw 36-bit value
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Value sign-extended from 36 bits
    pub fn as_int(&self) -> i64 {
        let shift = 64 - VALUE_BITS;
        ((self.value << shift) as i64) >> shift
    }

    pub fn is_empty(&self) -> bool {
        self.type_tag == 0
    }

    /// Pack into 8 bytes
    pub fn pack(&self) -> [u8; 8] {
        let t = self.type_tag;
        let v = self.value;
        [
            (self.key << 4) | ((t >> 20) & 0x0F) as u8,
            ((t >> 12) & 0xFF) as u8,
            ((t >> 4) & 0xFF) as u8,
            (((t & 0x0F) << 4) as u8) | ((v >> 32) & 0x0F) as u8,
            ((v >> 24) & 0xFF) as u8,
            ((v >> 16) & 0xFF) as u8,
            ((v >> 8) & 0xFF) as u8,
            (v & 0xFF) as u8,
        ]
    }

    /// Unpack 8 bytes. Every bit pattern decodes to a valid block.
    pub fn unpack(b: [u8; 8]) -> Self {
        let key = b[0] >> 4;
        let type_tag = (((b[0] as u32) & 0x0F) << 20)
            | ((b[1] as u32) << 12)
            | ((b[2] as u32) << 4)
            | ((b[3] as u32) >> 4);
        let value = (((b[3] as u64) & 0x0F) << 32)
            | ((b[4] as u64) << 24)
            | ((b[5] as u64) << 16)
            | ((b[6] as u64) << 8)
            | b[7] as u64;
        Self {
            key,
            type_tag,
            value,
        }
    }
}

/// Up to four property blocks, chained to further records through 2-byte pointers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyRecord {
    /// Record slot is occupied
    pub in_use: bool,
    /// Next record in the owner's property chain
    pub next: Option<u16>,
    /// Previous record in the owner's property chain
    pub prev: Option<u16>,
    /// Embedded blocks; unused slots are empty blocks
    pub blocks: [PropertyBlock; BLOCKS_PER_RECORD],
}

impl PropertyRecord {
    /// In-use record holding `blocks`
    pub fn new(blocks: &[PropertyBlock]) -> Result<Self> {
        if blocks.len() > BLOCKS_PER_RECORD {
            return Err(Error::too_large(
                "inline property list",
                BLOCKS_PER_RECORD,
                blocks.len(),
            ));
        }
        let mut slots = [PropertyBlock::default(); BLOCKS_PER_RECORD];
        slots[..blocks.len()].copy_from_slice(blocks);
        Ok(Self {
            in_use: true,
            next: None,
            prev: None,
            blocks: slots,
        })
    }

    /// Non-empty blocks in slot order
    pub fn used_blocks(&self) -> impl Iterator<Item = &PropertyBlock> {
        self.blocks.iter().filter(|b| !b.is_empty())
    }
}

impl StoreRecord for PropertyRecord {
    const SIZE: usize = 1 + 2 + 2 + BLOCKS_PER_RECORD * PropertyBlock::SIZE;
    const KIND: &'static str = "property";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_short_ref(self.next);
        w.put_short_ref(self.prev);
        for block in &self.blocks {
            w.put_bytes(&block.pack());
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let in_use = r.bool();
        let next = r.short_reference();
        let prev = r.short_reference();
        let mut blocks = [PropertyBlock::default(); BLOCKS_PER_RECORD];
        for block in &mut blocks {
            *block = PropertyBlock::unpack(r.array::<8>());
        }
        Ok(Self {
            in_use,
            next,
            prev,
            blocks,
        })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Endian;
    use proptest::prelude::*;

    #[test]
    fn test_block_nibble_layout() {
        let block = PropertyBlock::new(0xA, 0x12_3456, 0x7_89AB_CDEF).unwrap();
        assert_eq!(
            block.pack(),
            [0xA1, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]
        );
        assert_eq!(PropertyBlock::unpack(block.pack()), block);
    }

    #[test]
    fn test_int_extremes_survive() {
        for value in [INT_MIN, INT_MAX, -1, 0, 1] {
            let block = PropertyBlock::int(3, value).unwrap();
            let decoded = PropertyBlock::unpack(block.pack());
            assert_eq!(decoded.as_int(), value);
            assert_eq!(decoded.property_type(), PropertyType::Int);
        }
    }

    #[test]
    fn test_raw_value_extremes_survive() {
        for value in [0, VALUE_MASK] {
            let block = PropertyBlock::new(MAX_KEY_ID, MAX_TYPE_TAG, value).unwrap();
            assert_eq!(PropertyBlock::unpack(block.pack()).value(), value);
        }
    }

    #[test]
    fn test_int_out_of_range() {
        assert!(PropertyBlock::int(0, INT_MAX + 1).is_err());
        assert!(PropertyBlock::int(0, INT_MIN - 1).is_err());
    }

    #[test]
    fn test_field_overflow_rejected() {
        assert!(PropertyBlock::new(16, 1, 0).is_err());
        assert!(PropertyBlock::new(0, MAX_TYPE_TAG + 1, 0).is_err());
        assert!(PropertyBlock::new(0, 1, VALUE_MASK + 1).is_err());
    }

    #[test]
    fn test_property_record_layout() {
        let blocks = [
            PropertyBlock::int(0, 42).unwrap(),
            PropertyBlock::string_ref(1, 7).unwrap(),
        ];
        let mut record = PropertyRecord::new(&blocks).unwrap();
        record.next = Some(5);
        for endian in [Endian::Little, Endian::Big] {
            let bytes = record.serialize_with(endian);
            assert_eq!(bytes.len(), 37);
            let decoded = PropertyRecord::deserialize_with(&bytes, endian).unwrap();
            assert_eq!(decoded, record);
            assert_eq!(decoded.used_blocks().count(), 2);
        }
    }

    #[test]
    fn test_property_record_rejects_fifth_block() {
        let blocks = vec![PropertyBlock::bool(0, true).unwrap(); 5];
        assert!(matches!(
            PropertyRecord::new(&blocks),
            Err(Error::PayloadTooLarge { limit: 4, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_block_pack_is_bit_exact(
            key in 0u8..=MAX_KEY_ID,
            tag in 0u32..=MAX_TYPE_TAG,
            value in 0u64..=VALUE_MASK,
        ) {
            let block = PropertyBlock::new(key, tag, value).unwrap();
            prop_assert_eq!(PropertyBlock::unpack(block.pack()), block);
        }

        #[test]
        fn prop_unpack_then_pack_is_identity(bytes in any::<[u8; 8]>()) {
            prop_assert_eq!(PropertyBlock::unpack(bytes).pack(), bytes);
        }
    }
}
