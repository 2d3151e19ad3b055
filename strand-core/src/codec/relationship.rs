//! Relationship records (33 bytes)

use super::{ByteReader, ByteWriter, RecordId, StoreRecord};
use crate::Result;

/// Physical relationship between two node records
///
/// Each endpoint anchors a doubly-linked chain of the relationships touching
/// it; `first_prev`/`first_next` link the chain of `first_node`,
/// `second_prev`/`second_next` the chain of `second_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelationshipRecord {
    /// Record slot is occupied
    pub in_use: bool,
    /// Start node id
    pub first_node: RecordId,
    /// End node id
    pub second_node: RecordId,
    /// Relationship type id (label record holding the type name)
    pub rel_type: RecordId,
    /// Previous relationship in the start node's chain
    pub first_prev: Option<RecordId>,
    /// Next relationship in the start node's chain
    pub first_next: Option<RecordId>,
    /// Previous relationship in the end node's chain
    pub second_prev: Option<RecordId>,
    /// Next relationship in the end node's chain
    pub second_next: Option<RecordId>,
    /// First property record
    pub next_prop: Option<RecordId>,
}

impl RelationshipRecord {
    /// Point whichever chain(s) `node` anchors at `prev`
    pub fn set_prev_for(&mut self, node: RecordId, prev: Option<RecordId>) {
        if self.first_node == node {
            self.first_prev = prev;
        }
        if self.second_node == node {
            self.second_prev = prev;
        }
    }

    /// Next relationship in `node`'s chain
    pub fn next_for(&self, node: RecordId) -> Option<RecordId> {
        if self.first_node == node {
            self.first_next
        } else if self.second_node == node {
            self.second_next
        } else {
            None
        }
    }
}

impl StoreRecord for RelationshipRecord {
    const SIZE: usize = 33;
    const KIND: &'static str = "relationship";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_u32(self.first_node);
        w.put_u32(self.second_node);
        w.put_u32(self.rel_type);
        w.put_ref(self.first_prev);
        w.put_ref(self.first_next);
        w.put_ref(self.second_prev);
        w.put_ref(self.second_next);
        w.put_ref(self.next_prop);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            in_use: r.bool(),
            first_node: r.u32(),
            second_node: r.u32(),
            rel_type: r.u32(),
            first_prev: r.reference(),
            first_next: r.reference(),
            second_prev: r.reference(),
            second_next: r.reference(),
            next_prop: r.reference(),
        })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}
