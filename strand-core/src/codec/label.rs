//! Label records (65 bytes): in-use flag, 4 reserved bytes, 60-byte payload
//!
//! The payload holds up to [`MAX_LABELS`] UTF-8 labels separated by NUL
//! bytes and zero-padded to the slot width.

use super::{ByteReader, ByteWriter, StoreRecord};
use crate::{Error, Result};

/// Width of the label payload slot
pub const LABEL_PAYLOAD_SIZE: usize = 60;

/// Maximum labels per node or relationship
pub const MAX_LABELS: usize = 3;

const SEPARATOR: u8 = 0;

/// Labels attached to a node or relationship, stored as one blob
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelRecord {
    /// Record slot is occupied
    pub in_use: bool,
    /// Reserved field
    pub reserved: u32,
    labels: Vec<String>,
}

impl LabelRecord {
    /// Build an in-use record, enforcing the label count and payload size
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.len() > MAX_LABELS {
            return Err(Error::too_large("label list", MAX_LABELS, labels.len()));
        }
        if let Some(bad) = labels
            .iter()
            .find(|l| l.is_empty() || l.as_bytes().contains(&SEPARATOR))
        {
            return Err(Error::ValueOutOfRange(format!(
                "label {:?} must be non-empty and contain no NUL bytes",
                bad
            )));
        }
        let size = Self::payload_len_of(&labels);
        if size > LABEL_PAYLOAD_SIZE {
            return Err(Error::too_large("label payload", LABEL_PAYLOAD_SIZE, size));
        }
        Ok(Self {
            in_use: true,
            reserved: 0,
            labels,
        })
    }

    /// Encoded payload length of `labels`, separators included
    pub fn payload_len_of(labels: &[String]) -> usize {
        let bytes: usize = labels.iter().map(String::len).sum();
        bytes + labels.len().saturating_sub(1)
    }

    /// Labels in insertion order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Consume the record, keeping the labels
    pub fn into_labels(self) -> Vec<String> {
        self.labels
    }
}

impl StoreRecord for LabelRecord {
    const SIZE: usize = 1 + 4 + LABEL_PAYLOAD_SIZE;
    const KIND: &'static str = "label";

    fn encode(&self, w: &mut ByteWriter) {
        w.put_bool(self.in_use);
        w.put_u32(self.reserved);
        let payload = self.labels.join("\0");
        w.put_padded(payload.as_bytes(), LABEL_PAYLOAD_SIZE);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let in_use = r.bool();
        let reserved = r.u32();
        let payload = r.bytes(LABEL_PAYLOAD_SIZE);
        let end = payload
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |last| last + 1);

        let labels = payload[..end]
            .split(|b| *b == SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(|part| {
                String::from_utf8(part.to_vec())
                    .map_err(|e| Error::ValueOutOfRange(format!("label is not UTF-8: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            in_use,
            reserved,
            labels,
        })
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_label_record_round_trip() {
        let record = LabelRecord::new(labels(&["Person", "Engineer", "Reviewer"])).unwrap();
        let bytes = record.serialize();
        assert_eq!(bytes.len(), 65);
        assert_eq!(&bytes[5..11], b"Person");
        assert_eq!(bytes[11], 0);
        assert_eq!(LabelRecord::deserialize(&bytes).unwrap(), record);
    }

    #[test]
    fn test_empty_label_record() {
        let record = LabelRecord::new(Vec::new()).unwrap();
        let decoded = LabelRecord::deserialize(&record.serialize()).unwrap();
        assert!(decoded.labels().is_empty());
        assert!(decoded.in_use);
    }

    #[test]
    fn test_payload_exactly_at_limit() {
        // 29 + 1 separator + 30 = 60
        let record = LabelRecord::new(vec!["a".repeat(29), "b".repeat(30)]).unwrap();
        let decoded = LabelRecord::deserialize(&record.serialize()).unwrap();
        assert_eq!(decoded.labels()[1].len(), 30);
    }

    #[test]
    fn test_payload_too_large() {
        let err = LabelRecord::new(vec!["x".repeat(30), "y".repeat(30)]).unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadTooLarge {
                limit: 60,
                actual: 61,
                ..
            }
        ));
    }

    #[test]
    fn test_too_many_labels() {
        let err = LabelRecord::new(labels(&["A", "B", "C", "D"])).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 3, .. }));
    }

    #[test]
    fn test_rejects_empty_label() {
        assert!(LabelRecord::new(labels(&["A", ""])).is_err());
    }
}
