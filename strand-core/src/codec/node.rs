//! Node records (13 bytes) and node-id reuse records (5 bytes)

use super::{ByteReader, ByteWriter, RecordId, StoreRecord};
use crate::Result;

/// Physical anchor of a graph node
///
/// The node id is the record's ordinal position in `nodes.store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeRecord {
    /// Record slot is occupied
    pub in_use: bool,
    /// Label record holding this node's labels
    pub label_ptr: Option<RecordId>,
    /// Head of this node's relationship chain
    pub next_rel: Option<RecordId>,
    /// First property record
    pub next_prop: Option<RecordId>,
}

impl NodeRecord {
    /// In-use record pointing at its label and property records
    pub fn new(label_ptr: Option<RecordId>, next_prop: Option<RecordId>) -> Self {
        Self {
            in_use: true,
            label_ptr,
            next_rel: None,
            next_prop,
        }
    }
}

impl StoreRecord for NodeRecord {
    const SIZE: usize = 13;
    const KIND: &'static str = "node";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_ref(self.label_ptr);
        w.put_ref(self.next_rel);
        w.put_ref(self.next_prop);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            in_use: r.bool(),
            label_ptr: r.reference(),
            next_rel: r.reference(),
            next_prop: r.reference(),
        })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// Entry of the node-id store. Reserved for id reuse; records are only
/// ever appended today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdRecord {
    /// Entry is live
    pub in_use: bool,
    /// Freed node id
    pub node_id: RecordId,
}

impl StoreRecord for NodeIdRecord {
    const SIZE: usize = 5;
    const KIND: &'static str = "node id";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_u32(self.node_id);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            in_use: r.bool(),
            node_id: r.u32(),
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
    use crate::Error;

    #[test]
    fn test_node_record_layout() {
        let record = NodeRecord {
            in_use: true,
            label_ptr: Some(1),
            next_rel: None,
            next_prop: Some(0x0A0B_0C0D),
        };
        let bytes = record.serialize();
        assert_eq!(bytes.len(), NodeRecord::SIZE);
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..5], &[1, 0, 0, 0]);
        assert_eq!(&bytes[5..9], &[0xFF; 4]);
        assert_eq!(&bytes[9..13], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(NodeRecord::deserialize(&bytes).unwrap(), record);
    }

    #[test]
    fn test_node_record_big_endian() {
        let record = NodeRecord::new(Some(7), None);
        let bytes = record.serialize_with(Endian::Big);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 7]);
        assert_eq!(NodeRecord::deserialize_with(&bytes, Endian::Big).unwrap(), record);
    }

    #[test]
    fn test_node_record_rejects_wrong_length() {
        let err = NodeRecord::deserialize(&[0u8; 12]).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedRecord {
                expected: 13,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn test_node_id_record_round_trip() {
        let record = NodeIdRecord {
            in_use: true,
            node_id: 99,
        };
        let bytes = record.serialize();
        assert_eq!(bytes.len(), 5);
        assert_eq!(NodeIdRecord::deserialize(&bytes).unwrap(), record);
    }
}
