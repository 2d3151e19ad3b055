//! String chunk records (64 bytes) in the string sub-store
//!
//! Long strings span several chunks linked through `next`.

use super::{ByteReader, ByteWriter, RecordId, StoreRecord};
use crate::{Error, Result};

/// Data bytes per chunk
pub const STRING_CHUNK_SIZE: usize = 58;

/// One chunk of an out-of-line string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringRecord {
    /// Record slot is occupied
    pub in_use: bool,
    /// Following chunk
    pub next: Option<RecordId>,
    data: Vec<u8>,
}

impl StringRecord {
    /// In-use chunk holding `data`
    pub fn new(data: &[u8], next: Option<RecordId>) -> Result<Self> {
        if data.len() > STRING_CHUNK_SIZE {
            return Err(Error::too_large("string chunk", STRING_CHUNK_SIZE, data.len()));
        }
        Ok(Self {
            in_use: true,
            next,
            data: data.to_vec(),
        })
    }

    /// Chunk payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl StoreRecord for StringRecord {
    const SIZE: usize = 1 + 4 + 1 + STRING_CHUNK_SIZE;
    const KIND: &'static str = "string";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_ref(self.next);
        w.put_u8(self.data.len() as u8);
        w.put_padded(&self.data, STRING_CHUNK_SIZE);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let in_use = r.bool();
        let next = r.reference();
        let len = r.u8() as usize;
        if len > STRING_CHUNK_SIZE {
            return Err(Error::ValueOutOfRange(format!(
                "string chunk length {} exceeds {}",
                len, STRING_CHUNK_SIZE
            )));
        }
        let data = r.bytes(STRING_CHUNK_SIZE)[..len].to_vec();
        Ok(Self { in_use, next, data })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}
