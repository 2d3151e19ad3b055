//! Record store layer - one set of append-only store files per collection
//!
//! A [`RecordStore`] owns the store files inside a collection directory and
//! knows how records of different kinds reference each other:
//!
//! - nodes point at a label record and the head of a property chain
//! - property records hold four blocks and chain through 2-byte pointers
//! - string values live out of line in chained 64-byte chunks
//! - block key ids are ordinals in the property-key index
//!
//! Every method that appends or patches records must be called with the
//! collection's write lock held; ids are derived from file lengths.

mod file;

pub use file::{RecordFile, create_store_file};

use crate::codec::{
    BLOCKS_PER_RECORD, Endian, LabelRecord, MAX_KEY_ID, NULL_SHORT_REF, NodeIdRecord, NodeRecord,
    PropertyBlock, PropertyKeyRecord, PropertyRecord, PropertyType, RecordId, RelationshipRecord,
    STRING_CHUNK_SIZE, StoreKind, StoreRecord, StringRecord,
};
use crate::graph::{Property, PropertyValue};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Distinct property keys a collection can name (4-bit key ids)
pub const MAX_PROPERTY_KEYS: usize = MAX_KEY_ID as usize + 1;

/// Store files of one collection
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    sync: bool,
}

/// A property list checked against the key index and store limits
///
/// Produced by [`RecordStore::plan_properties`] without touching the disk
/// beyond reads; [`RecordStore::write_properties`] performs the writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPlan {
    new_keys: Vec<String>,
    entries: Vec<(u8, PropertyValue)>,
}

impl PropertyPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys that will be added to the index
    pub fn new_keys(&self) -> &[String] {
        &self.new_keys
    }

    /// Property records the chain will occupy
    pub fn record_count(&self) -> usize {
        self.entries.len().div_ceil(BLOCKS_PER_RECORD)
    }
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>, sync: bool) -> Self {
        Self {
            dir: dir.into(),
            sync,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one store file
    pub fn path_of(&self, kind: StoreKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Create every store file of a new collection concurrently
    ///
    /// Stops at the first failure; files already created are left for the
    /// caller to remove with the directory.
    pub async fn create_files(dir: &Path, endian: Endian) -> Result<()> {
        let creations = StoreKind::ALL
            .into_iter()
            .map(|kind| {
                let path = dir.join(kind.file_name());
                async move { create_store_file(&path, kind, endian).await }
            })
            .collect::<Vec<_>>();
        futures::future::try_join_all(creations).await?;
        Ok(())
    }

    async fn open<R: StoreRecord>(&self, kind: StoreKind) -> Result<RecordFile<R>> {
        RecordFile::open(&self.path_of(kind), kind, self.sync).await
    }

    pub async fn nodes(&self) -> Result<RecordFile<NodeRecord>> {
        self.open(StoreKind::Node).await
    }

    pub async fn node_ids(&self) -> Result<RecordFile<NodeIdRecord>> {
        self.open(StoreKind::NodeId).await
    }

    pub async fn relationships(&self) -> Result<RecordFile<RelationshipRecord>> {
        self.open(StoreKind::Relationship).await
    }

    pub async fn labels(&self) -> Result<RecordFile<LabelRecord>> {
        self.open(StoreKind::Label).await
    }

    pub async fn properties(&self) -> Result<RecordFile<PropertyRecord>> {
        self.open(StoreKind::Property).await
    }

    pub async fn strings(&self) -> Result<RecordFile<StringRecord>> {
        self.open(StoreKind::String).await
    }

    pub async fn keys(&self) -> Result<RecordFile<PropertyKeyRecord>> {
        self.open(StoreKind::Index).await
    }

    /// Check the header and body length of every store file
    pub async fn verify(&self) -> Result<()> {
        self.nodes().await?;
        self.node_ids().await?;
        self.relationships().await?;
        self.labels().await?;
        self.properties().await?;
        self.strings().await?;
        self.open::<StringRecord>(StoreKind::Array).await?;
        self.keys().await?;
        Ok(())
    }

    /// Append a label record holding `labels`
    pub async fn create_label_record(&self, labels: Vec<String>) -> Result<RecordId> {
        let record = LabelRecord::new(labels)?;
        self.labels().await?.append(&record).await
    }

    /// Append one property record holding at most four blocks
    pub async fn create_property_record(&self, blocks: &[PropertyBlock]) -> Result<RecordId> {
        let record = PropertyRecord::new(blocks)?;
        self.properties().await?.append(&record).await
    }

    /// Append a node record and register its id
    pub async fn create_node_record(
        &self,
        label_ptr: Option<RecordId>,
        prop_ptr: Option<RecordId>,
    ) -> Result<RecordId> {
        let id = self
            .nodes()
            .await?
            .append(&NodeRecord::new(label_ptr, prop_ptr))
            .await?;
        self.node_ids()
            .await?
            .append(&NodeIdRecord {
                in_use: true,
                node_id: id,
            })
            .await?;
        Ok(id)
    }

    /// Append a relationship record as given
    pub async fn create_relationship_record(&self, record: &RelationshipRecord) -> Result<RecordId> {
        self.relationships().await?.append(record).await
    }

    /// Property names in key-id order
    pub async fn key_names(&self) -> Result<Vec<String>> {
        Ok(self
            .keys()
            .await?
            .read_all()
            .await?
            .into_iter()
            .map(|k| k.name().to_string())
            .collect())
    }

    /// Resolve key ids and check every limit a property chain is subject to
    pub async fn plan_properties(&self, properties: &[Property]) -> Result<PropertyPlan> {
        let known = self.key_names().await?;
        let mut new_keys: Vec<String> = Vec::new();
        let mut entries = Vec::with_capacity(properties.len());

        for (i, prop) in properties.iter().enumerate() {
            if properties[..i].iter().any(|p| p.key == prop.key) {
                return Err(Error::ValueOutOfRange(format!(
                    "property '{}' is given more than once",
                    prop.key
                )));
            }
            let key = match known.iter().position(|k| *k == prop.key) {
                Some(pos) => pos,
                None => {
                    PropertyKeyRecord::new(&prop.key)?;
                    new_keys.push(prop.key.clone());
                    known.len() + new_keys.len() - 1
                }
            };
            if key >= MAX_PROPERTY_KEYS {
                return Err(Error::too_large(
                    "property key index",
                    MAX_PROPERTY_KEYS,
                    known.len() + new_keys.len(),
                ));
            }
            if let PropertyValue::Int(v) = prop.value {
                PropertyBlock::int(key as u8, v)?;
            }
            entries.push((key as u8, prop.value.clone()));
        }

        let plan = PropertyPlan { new_keys, entries };
        if plan.record_count() > 1 {
            let first = self.properties().await?.len().await? as usize;
            let last = first + plan.record_count() - 1;
            if last >= NULL_SHORT_REF as usize {
                return Err(Error::too_large(
                    "chained property record id",
                    NULL_SHORT_REF as usize - 1,
                    last,
                ));
            }
        }
        Ok(plan)
    }

    /// Write a planned property chain: keys, strings, then property records
    ///
    /// Returns the head record id, or `None` for an empty plan.
    pub async fn write_properties(&self, plan: &PropertyPlan) -> Result<Option<RecordId>> {
        if plan.is_empty() {
            return Ok(None);
        }

        if !plan.new_keys.is_empty() {
            let records = plan
                .new_keys
                .iter()
                .map(|k| PropertyKeyRecord::new(k))
                .collect::<Result<Vec<_>>>()?;
            self.keys().await?.append_all(&records).await?;
        }

        let mut blocks = Vec::with_capacity(plan.entries.len());
        for (key, value) in &plan.entries {
            let block = match value {
                PropertyValue::Bool(b) => PropertyBlock::bool(*key, *b)?,
                PropertyValue::Int(i) => PropertyBlock::int(*key, *i)?,
                PropertyValue::String(s) => PropertyBlock::string_ref(*key, self.write_string(s).await?)?,
            };
            blocks.push(block);
        }

        let file = self.properties().await?;
        let first = file.len().await?;
        let count = blocks.len().div_ceil(BLOCKS_PER_RECORD) as u32;
        let short = |id: u32| -> Result<u16> {
            u16::try_from(id)
                .ok()
                .filter(|v| *v != NULL_SHORT_REF)
                .ok_or_else(|| {
                    Error::too_large(
                        "chained property record id",
                        NULL_SHORT_REF as usize - 1,
                        id as usize,
                    )
                })
        };

        let mut records = Vec::with_capacity(count as usize);
        for (i, chunk) in blocks.chunks(BLOCKS_PER_RECORD).enumerate() {
            let i = i as u32;
            let mut record = PropertyRecord::new(chunk)?;
            if i + 1 < count {
                record.next = Some(short(first + i + 1)?);
            }
            if i > 0 {
                record.prev = Some(short(first + i - 1)?);
            }
            records.push(record);
        }

        let head = file.append_all(&records).await?;
        if head != first {
            return Err(Error::internal(format!(
                "property store grew during append: expected id {}, got {}",
                first, head
            )));
        }
        Ok(Some(head))
    }

    /// Write `text` as a chain of string chunks and return the head id
    pub async fn write_string(&self, text: &str) -> Result<RecordId> {
        let file = self.strings().await?;
        let first = file.len().await?;
        let bytes = text.as_bytes();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(STRING_CHUNK_SIZE).collect()
        };

        let count = chunks.len() as u32;
        let records = chunks
            .iter()
            .enumerate()
            .map(|(i, data)| {
                let next = (i as u32 + 1 < count).then(|| first + i as u32 + 1);
                StringRecord::new(data, next)
            })
            .collect::<Result<Vec<_>>>()?;

        let head = file.append_all(&records).await?;
        if head != first {
            return Err(Error::internal(format!(
                "string store grew during append: expected id {}, got {}",
                first, head
            )));
        }
        Ok(head)
    }

    /// Reassemble a string chain
    pub async fn read_string(&self, head: RecordId) -> Result<String> {
        let file = self.strings().await?;
        let limit = file.len().await?;
        let mut bytes = Vec::new();
        let mut next = Some(head);
        let mut hops = 0u32;

        while let Some(id) = next {
            if hops >= limit {
                return Err(Error::InvalidReference(format!(
                    "string chain from {} does not terminate",
                    head
                )));
            }
            let chunk = file.read_in_use(id).await?;
            bytes.extend_from_slice(chunk.data());
            next = chunk.next;
            hops += 1;
        }

        String::from_utf8(bytes)
            .map_err(|e| Error::ValueOutOfRange(format!("string {} is not UTF-8: {}", head, e)))
    }

    /// Labels held by a label record
    pub async fn read_labels(&self, id: RecordId) -> Result<Vec<String>> {
        Ok(self.labels().await?.read_in_use(id).await?.into_labels())
    }

    /// Properties of a chain, in insertion order
    pub async fn read_properties(&self, head: Option<RecordId>) -> Result<Vec<Property>> {
        let Some(head) = head else {
            return Ok(Vec::new());
        };

        let file = self.properties().await?;
        let limit = file.len().await?;
        let keys = self.key_names().await?;
        let mut out = Vec::new();
        let mut next = Some(head);
        let mut hops = 0u32;

        while let Some(id) = next {
            if hops >= limit {
                return Err(Error::InvalidReference(format!(
                    "property chain from {} does not terminate",
                    head
                )));
            }
            let record = file.read_in_use(id).await?;
            for block in record.used_blocks() {
                let key = keys.get(block.key() as usize).ok_or_else(|| {
                    Error::InvalidReference(format!(
                        "property record {} uses unknown key id {}",
                        id,
                        block.key()
                    ))
                })?;
                let value = match block.property_type() {
                    PropertyType::Bool => PropertyValue::Bool(block.value() != 0),
                    PropertyType::Int => PropertyValue::Int(block.as_int()),
                    PropertyType::String => {
                        PropertyValue::String(self.read_string(block.value() as RecordId).await?)
                    }
                    other => {
                        return Err(Error::ValueOutOfRange(format!(
                            "property record {} holds unsupported type {:?}",
                            id, other
                        )));
                    }
                };
                out.push(Property {
                    key: key.clone(),
                    value,
                });
            }
            next = record.next.map(u32::from);
            hops += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        RecordStore::create_files(dir.path(), Endian::Little)
            .await
            .unwrap();
        let store = RecordStore::new(dir.path(), false);
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_files_writes_every_header() {
        let (dir, _store) = store().await;
        for kind in StoreKind::ALL {
            let bytes = std::fs::read(dir.path().join(kind.file_name())).unwrap();
            assert_eq!(bytes.len(), crate::codec::HEADER_SIZE);
            assert_eq!(bytes[1], kind as u8);
        }
    }

    #[tokio::test]
    async fn test_create_files_refuses_existing() {
        let (dir, _store) = store().await;
        assert!(
            RecordStore::create_files(dir.path(), Endian::Little)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_verify_detects_foreign_file() {
        let (dir, store) = store().await;
        store.verify().await.unwrap();

        let labels = std::fs::read(dir.path().join("labels.store")).unwrap();
        std::fs::write(dir.path().join("props.arrays"), labels).unwrap();
        assert!(matches!(
            store.verify().await,
            Err(Error::IncompatibleStoreFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_ids_are_ordinals() {
        let (_dir, store) = store().await;
        let a = store.create_label_record(vec!["Person".into()]).await.unwrap();
        let b = store.create_label_record(vec!["Place".into()]).await.unwrap();
        assert_eq!((a, b), (0, 1));

        let n = store.create_node_record(Some(b), None).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.nodes().await.unwrap().read(0).await.unwrap().label_ptr, Some(1));
        assert_eq!(store.node_ids().await.unwrap().read(0).await.unwrap().node_id, 0);
    }

    #[tokio::test]
    async fn test_oversized_label_writes_nothing() {
        let (_dir, store) = store().await;
        let err = store
            .create_label_record(vec!["x".repeat(61)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
        assert_eq!(store.labels().await.unwrap().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inline_property_record_limit() {
        let (_dir, store) = store().await;
        let blocks = vec![PropertyBlock::int(0, 1).unwrap(); 5];
        assert!(matches!(
            store.create_property_record(&blocks).await,
            Err(Error::PayloadTooLarge { .. })
        ));
        assert_eq!(store.create_property_record(&blocks[..4]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_long_string_spans_chunks() {
        let (_dir, store) = store().await;
        let text = "ab".repeat(70);
        let head = store.write_string(&text).await.unwrap();
        assert_eq!(store.strings().await.unwrap().len().await.unwrap(), 3);
        assert_eq!(store.read_string(head).await.unwrap(), text);

        let empty = store.write_string("").await.unwrap();
        assert_eq!(store.read_string(empty).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_property_chain_preserves_order() {
        let (_dir, store) = store().await;
        let props: Vec<Property> = (0..6)
            .map(|i| Property::new(format!("k{}", i), i as i64 - 3))
            .chain([Property::new("title", "Design"), Property::new("draft", true)])
            .collect();

        let plan = store.plan_properties(&props).await.unwrap();
        assert_eq!(plan.record_count(), 2);
        let head = store.write_properties(&plan).await.unwrap();
        assert_eq!(head, Some(0));

        let file = store.properties().await.unwrap();
        let first = file.read(0).await.unwrap();
        let second = file.read(1).await.unwrap();
        assert_eq!((first.next, first.prev), (Some(1), None));
        assert_eq!((second.next, second.prev), (None, Some(0)));

        assert_eq!(store.read_properties(head).await.unwrap(), props);
    }

    #[tokio::test]
    async fn test_keys_are_shared_across_lists() {
        let (_dir, store) = store().await;
        let plan = store
            .plan_properties(&[Property::new("name", "a")])
            .await
            .unwrap();
        store.write_properties(&plan).await.unwrap();

        let again = store
            .plan_properties(&[Property::new("age", 3), Property::new("name", "b")])
            .await
            .unwrap();
        assert_eq!(again.new_keys(), ["age".to_string()]);
        store.write_properties(&again).await.unwrap();
        assert_eq!(store.key_names().await.unwrap(), vec!["name", "age"]);
    }

    #[tokio::test]
    async fn test_seventeenth_key_rejected() {
        let (_dir, store) = store().await;
        let props: Vec<Property> = (0..17).map(|i| Property::new(format!("k{}", i), 1)).collect();
        assert!(matches!(
            store.plan_properties(&props).await,
            Err(Error::PayloadTooLarge { limit: 16, .. })
        ));
        assert!(store.plan_properties(&props[..16]).await.is_ok());
    }

    #[tokio::test]
    async fn test_plan_rejects_bad_values() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.plan_properties(&[Property::new("big", 1i64 << 40)]).await,
            Err(Error::ValueOutOfRange(_))
        ));
        assert!(matches!(
            store
                .plan_properties(&[Property::new("a", 1), Property::new("a", 2)])
                .await,
            Err(Error::ValueOutOfRange(_))
        ));
        assert!(
            store
                .plan_properties(&[Property::new("k".repeat(31), 1)])
                .await
                .is_err()
        );
        assert_eq!(store.keys().await.unwrap().len().await.unwrap(), 0);
    }
}
