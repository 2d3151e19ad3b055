//! Store header - the 15-byte self-describing prologue of every store file
//!
//! ```text
//! 0      format version
//! 1      file type id
//! 2      header version
//! 3..5   magic number
//! 5      record size
//! 6      endianness flag (0 = little, 1 = big)
//! 7..9   reserved parameters
//! 9      transaction-log sequence number
//! 10..12 checksum (low 16 bits of CRC-32 over the other 13 bytes)
//! 12     last-known-good-state marker
//! 13..15 reserved tail
//! ```

use super::{ByteReader, ByteWriter, Endian};
use crate::{Error, Result};
use std::path::Path;

/// Encoded header size
pub const HEADER_SIZE: usize = 15;

/// Magic number shared by all store files ("SG")
pub const STORE_MAGIC: u16 = 0x5347;

/// Current on-disk format version
pub const FORMAT_VERSION: u8 = 1;

/// Current header layout version
pub const HEADER_VERSION: u8 = 1;

/// Marker value for a file last closed in a consistent state
pub const STATE_GOOD: u8 = 1;

const CHECKSUM_OFFSET: usize = 10;

/// Kind of store file, recorded as the header's file-type id
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Node records
    Node = 1,
    /// Node id reuse list (reserved)
    NodeId = 2,
    /// Relationship records
    Relationship = 3,
    /// Label records
    Label = 4,
    /// Property records
    Property = 5,
    /// Out-of-line string chunks
    String = 6,
    /// Out-of-line arrays (reserved)
    Array = 7,
    /// Property-name index
    Index = 8,
}

impl StoreKind {
    /// Every store file a collection owns, in creation order
    pub const ALL: [StoreKind; 8] = [
        StoreKind::Node,
        StoreKind::NodeId,
        StoreKind::Relationship,
        StoreKind::Label,
        StoreKind::Property,
        StoreKind::String,
        StoreKind::Array,
        StoreKind::Index,
    ];

    /// Fixed file name inside the collection directory
    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Node => "nodes.store",
            StoreKind::NodeId => "nodes.id",
            StoreKind::Relationship => "rels.store",
            StoreKind::Label => "labels.store",
            StoreKind::Property => "props.store",
            StoreKind::String => "props.strings",
            StoreKind::Array => "props.arrays",
            StoreKind::Index => "props.index",
        }
    }

    /// Record size used by this store's codec
    pub fn record_size(self) -> usize {
        use super::*;
        match self {
            StoreKind::Node => <NodeRecord as StoreRecord>::SIZE,
            StoreKind::NodeId => <NodeIdRecord as StoreRecord>::SIZE,
            StoreKind::Relationship => <RelationshipRecord as StoreRecord>::SIZE,
            StoreKind::Label => <LabelRecord as StoreRecord>::SIZE,
            StoreKind::Property => <PropertyRecord as StoreRecord>::SIZE,
            StoreKind::String => <StringRecord as StoreRecord>::SIZE,
            // Arrays share the string chunk layout once implemented.
            StoreKind::Array => <StringRecord as StoreRecord>::SIZE,
            StoreKind::Index => <PropertyKeyRecord as StoreRecord>::SIZE,
        }
    }

    /// Decode a file-type id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| *k as u8 == id)
    }
}

/// Store file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    /// On-disk format version
    pub format_version: u8,
    /// Store kind
    pub kind: StoreKind,
    /// Header layout version
    pub header_version: u8,
    /// Magic number
    pub magic: u16,
    /// Declared record size
    pub record_size: u8,
    /// Byte order of multi-byte fields in this file
    pub endian: Endian,
    /// Reserved parameters
    pub params: [u8; 2],
    /// Last transaction-log sequence number applied
    pub txn_sequence: u8,
    /// Last-known-good-state marker
    pub state: u8,
    /// Reserved tail
    pub reserved: [u8; 2],
}

impl StoreHeader {
    /// Fresh header for a store of `kind`
    pub fn new(kind: StoreKind, endian: Endian) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            kind,
            header_version: HEADER_VERSION,
            magic: STORE_MAGIC,
            record_size: kind.record_size() as u8,
            endian,
            params: [0; 2],
            txn_sequence: 0,
            state: STATE_GOOD,
            reserved: [0; 2],
        }
    }

    /// Encode, computing the checksum. Multi-byte fields use the header's own endianness.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.endian, HEADER_SIZE);
        w.put_u8(self.format_version);
        w.put_u8(self.kind as u8);
        w.put_u8(self.header_version);
        w.put_u16(self.magic);
        w.put_u8(self.record_size);
        w.put_u8(self.endian.flag());
        w.put_bytes(&self.params);
        w.put_u8(self.txn_sequence);
        w.put_u16(0);
        w.put_u8(self.state);
        w.put_bytes(&self.reserved);

        let mut bytes = w.into_inner();
        let checksum = checksum(&bytes);
        let encoded = match self.endian {
            Endian::Little => checksum.to_le_bytes(),
            Endian::Big => checksum.to_be_bytes(),
        };
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&encoded);
        bytes
    }

    /// Decode a header. The endianness flag is read first and governs the
    /// remaining multi-byte fields; the checksum must match.
    ///
    /// A wrong length is [`Error::MalformedRecord`]; every other failure is
    /// [`Error::IncompatibleStoreFormat`] with an empty path.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, Path::new(""))
    }

    fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(Error::malformed("store header", HEADER_SIZE, bytes.len()));
        }
        let endian = Endian::from_flag(bytes[6])
            .ok_or_else(|| Error::incompatible(path, format!("invalid endianness flag {}", bytes[6])))?;

        let mut r = ByteReader::new(bytes, endian);
        let format_version = r.u8();
        let kind_id = r.u8();
        let header_version = r.u8();
        let magic = r.u16();
        let record_size = r.u8();
        let _flag = r.u8();
        let params = r.array::<2>();
        let txn_sequence = r.u8();
        let stored_checksum = r.u16();
        let state = r.u8();
        let reserved = r.array::<2>();

        let kind = StoreKind::from_id(kind_id).ok_or_else(|| {
            Error::incompatible(path, format!("unknown store file type id {}", kind_id))
        })?;

        if checksum(bytes) != stored_checksum {
            return Err(Error::incompatible(
                path,
                format!("checksum mismatch (stored {:#06x})", stored_checksum),
            ));
        }

        Ok(Self {
            format_version,
            kind,
            header_version,
            magic,
            record_size,
            endian,
            params,
            txn_sequence,
            state,
            reserved,
        })
    }

    /// Decode and check the header against the store the caller expects
    pub fn read_checked(bytes: &[u8], expected: StoreKind, path: &Path) -> Result<Self> {
        let header = Self::decode(bytes, path)?;
        header.validate(expected, path)?;
        Ok(header)
    }

    /// Reject headers whose magic, kind, version or record size differ from expectations
    pub fn validate(&self, expected: StoreKind, path: &Path) -> Result<()> {
        if self.magic != STORE_MAGIC {
            return Err(Error::incompatible(
                path,
                format!("bad magic number {:#06x}", self.magic),
            ));
        }
        if self.kind != expected {
            return Err(Error::incompatible(
                path,
                format!("expected {:?} store, found {:?}", expected, self.kind),
            ));
        }
        if self.format_version > FORMAT_VERSION {
            return Err(Error::incompatible(
                path,
                format!("unsupported format version {}", self.format_version),
            ));
        }
        if self.record_size as usize != expected.record_size() {
            return Err(Error::incompatible(
                path,
                format!(
                    "declared record size {} does not match {}",
                    self.record_size,
                    expected.record_size()
                ),
            ));
        }
        Ok(())
    }
}

/// Low 16 bits of the CRC-32 of every header byte except the checksum field
fn checksum(header: &[u8]) -> u16 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[..CHECKSUM_OFFSET]);
    hasher.update(&header[CHECKSUM_OFFSET + 2..]);
    (hasher.finalize() & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_header_size() {
        for kind in StoreKind::ALL {
            let header = StoreHeader::new(kind, Endian::Little);
            assert_eq!(header.serialize().len(), HEADER_SIZE);
        }
    }

    #[test]
    fn test_header_round_trip_both_endians() {
        for endian in [Endian::Little, Endian::Big] {
            let mut header = StoreHeader::new(StoreKind::Property, endian);
            header.txn_sequence = 42;
            let decoded = StoreHeader::deserialize(&header.serialize()).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn test_magic_position_follows_endian() {
        let le = StoreHeader::new(StoreKind::Node, Endian::Little).serialize();
        let be = StoreHeader::new(StoreKind::Node, Endian::Big).serialize();
        assert_eq!(&le[3..5], &[0x47, 0x53]);
        assert_eq!(&be[3..5], &[0x53, 0x47]);
        assert_eq!(le[5], 13);
    }

    #[test]
    fn test_rejects_wrong_record_size() {
        let path = PathBuf::from("nodes.store");
        let mut header = StoreHeader::new(StoreKind::Node, Endian::Little);
        header.record_size = 12;
        let bytes = header.serialize();
        let err = StoreHeader::read_checked(&bytes, StoreKind::Node, &path).unwrap_err();
        assert!(matches!(err, Error::IncompatibleStoreFormat { .. }));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let path = PathBuf::from("labels.store");
        let mut header = StoreHeader::new(StoreKind::Label, Endian::Little);
        header.magic = 0xBEEF;
        let err = StoreHeader::read_checked(&header.serialize(), StoreKind::Label, &path)
            .unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_rejects_corrupted_checksum() {
        let path = PathBuf::from("rels.store");
        let mut bytes = StoreHeader::new(StoreKind::Relationship, Endian::Little).serialize();
        bytes[9] ^= 0x01;
        let err = StoreHeader::read_checked(&bytes, StoreKind::Relationship, &path).unwrap_err();
        assert!(matches!(err, Error::IncompatibleStoreFormat { .. }));
    }

    #[test]
    fn test_checksum_covers_the_other_thirteen_bytes() {
        for endian in [Endian::Little, Endian::Big] {
            for kind in StoreKind::ALL {
                let bytes = StoreHeader::new(kind, endian).serialize();
                let mut covered = bytes[..10].to_vec();
                covered.extend_from_slice(&bytes[12..]);
                let expected = (crc32fast::hash(&covered) & 0xFFFF) as u16;
                let stored = match endian {
                    Endian::Little => u16::from_le_bytes([bytes[10], bytes[11]]),
                    Endian::Big => u16::from_be_bytes([bytes[10], bytes[11]]),
                };
                assert_eq!(stored, expected, "{:?} {:?}", kind, endian);
            }
        }
    }

    #[test]
    fn test_deserialize_reports_format_errors() {
        let mut bad_flag = StoreHeader::new(StoreKind::Node, Endian::Little).serialize();
        bad_flag[6] = 7;
        let mut bad_kind = StoreHeader::new(StoreKind::Node, Endian::Little).serialize();
        bad_kind[1] = 0xEE;
        let mut bad_checksum = StoreHeader::new(StoreKind::Node, Endian::Little).serialize();
        bad_checksum[12] ^= 0x01;

        for bytes in [bad_flag, bad_kind, bad_checksum] {
            let err = StoreHeader::deserialize(&bytes).unwrap_err();
            assert!(matches!(err, Error::IncompatibleStoreFormat { .. }), "{}", err);
            assert!(err.is_record_format());
        }
    }

    #[test]
    fn test_rejects_short_header() {
        let err = StoreHeader::deserialize(&[0u8; 14]).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { expected: 15, actual: 14, .. }));
    }
}
