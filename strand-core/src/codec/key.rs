//! Property-key records (32 bytes) in the index sub-store

use super::{ByteReader, ByteWriter, StoreRecord};
use crate::{Error, Result};

/// Longest property name, in bytes
pub const MAX_KEY_NAME_LEN: usize = 30;

/// A property name; its ordinal is the key id stored in property blocks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyKeyRecord {
    /// Record slot is occupied
    pub in_use: bool,
    name: String,
}

impl PropertyKeyRecord {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_KEY_NAME_LEN {
            return Err(Error::too_large("property name", MAX_KEY_NAME_LEN, name.len()));
        }
        Ok(Self {
            in_use: true,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl StoreRecord for PropertyKeyRecord {
    const SIZE: usize = 1 + 1 + MAX_KEY_NAME_LEN;
    const KIND: &'static str = "property key";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_u8(self.name.len() as u8);
        w.put_padded(self.name.as_bytes(), MAX_KEY_NAME_LEN);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let in_use = r.bool();
        let len = (r.u8() as usize).min(MAX_KEY_NAME_LEN);
        let name = String::from_utf8(r.bytes(MAX_KEY_NAME_LEN)[..len].to_vec())
            .map_err(|e| Error::ValueOutOfRange(format!("property name is not UTF-8: {}", e)))?;
        Ok(Self { in_use, name })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_record_round_trip() {
        let record = PropertyKeyRecord::new("reviewer_count").unwrap();
        let bytes = record.serialize();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[1], 14);
        assert_eq!(PropertyKeyRecord::deserialize(&bytes).unwrap(), record);
    }

    #[test]
    fn test_key_name_limits() {
        assert!(PropertyKeyRecord::new("").is_err());
        assert!(PropertyKeyRecord::new(&"k".repeat(31)).is_err());
        assert!(PropertyKeyRecord::new(&"k".repeat(30)).is_ok());
    }
}
