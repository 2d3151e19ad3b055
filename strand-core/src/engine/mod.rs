//! Storage engine - collection lifecycle and graph object persistence
//!
//! The engine is rooted at one database directory:
//!
//! ```text
//! <root>/strand.catalog
//! <root>/<collection>/nodes.store
//! <root>/<collection>/labels.store
//! ...
//! ```
//!
//! It turns logical [`Node`]s and [`Relationship`]s into records, writing
//! dependent records (labels, keys, strings, properties) before the record
//! that points at them.

mod locks;

pub use locks::CollectionLocks;

use crate::catalog::{Catalog, validate_collection_name};
use crate::codec::{Endian, LabelRecord, NodeRecord, RecordId, RelationshipRecord, StoreKind};
use crate::graph::{Node, NodeId, Property, PropertyValue, Relationship, RelationshipId};
use crate::storage::RecordStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Property key under which a node's name is persisted
///
/// Query-language names start with a letter, so this key cannot be produced
/// by a statement.
pub const NAME_PROPERTY: &str = "@name";

/// Options for an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Byte order of store files created by this engine
    pub endian: Endian,
    /// `sync_data` after every append
    pub sync_writes: bool,
}

impl EngineOptions {
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

/// Storage engine over one database directory
#[derive(Debug)]
pub struct StorageEngine {
    root: PathBuf,
    options: EngineOptions,
    catalog: Mutex<Catalog>,
    locks: CollectionLocks,
}

impl StorageEngine {
    /// Open the database at `root`, creating the directory and an empty
    /// catalog on first run
    ///
    /// Fails with [`Error::EngineInitialization`] when the catalog cannot be
    /// loaded or created.
    pub async fn open(root: impl AsRef<Path>, options: EngineOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::EngineInitialization(format!("cannot create {}: {}", root.display(), e))
        })?;

        let catalog = Catalog::load_or_create(&root).await?;
        for name in catalog.collections() {
            if !root.join(name).is_dir() {
                warn!(collection = %name, "Catalog lists a collection with no directory");
            }
        }

        info!(
            root = %root.display(),
            collections = catalog.collections().len(),
            endian = ?options.endian,
            "Storage engine opened"
        );

        Ok(Self {
            root,
            options,
            catalog: Mutex::new(catalog),
            locks: CollectionLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Collection names in creation order
    pub async fn collections(&self) -> Vec<String> {
        self.catalog.lock().await.collections().to_vec()
    }

    pub async fn collection_exists(&self, name: &str) -> bool {
        self.catalog.lock().await.contains(name)
    }

    /// Create a collection and all of its store files
    ///
    /// Either every store file exists and the catalog on disk lists the
    /// collection, or neither happens.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        let _guard = self.locks.lock(name).await;
        let mut catalog = self.catalog.lock().await;

        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(Error::DatabaseMissing(self.root.clone()));
        }
        if catalog.contains(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }

        let dir = self.root.join(name);
        self.clear_leftover(name, &dir).await?;
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| Error::store_io(&dir, e))?;

        if let Err(e) = RecordStore::create_files(&dir, self.options.endian).await {
            self.remove_dir_quietly(&dir).await;
            return Err(e);
        }

        catalog.add(name)?;
        if let Err(e) = catalog.flush().await {
            let _ = catalog.remove(name);
            self.remove_dir_quietly(&dir).await;
            return Err(e);
        }

        info!(collection = %name, "Created collection");
        Ok(())
    }

    /// Delete a collection: unlist it, then remove its directory
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let _guard = self.locks.lock(name).await;
        let mut catalog = self.catalog.lock().await;

        catalog.remove(name)?;
        if let Err(e) = catalog.flush().await {
            catalog.add(name)?;
            return Err(e);
        }

        let dir = self.root.join(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(collection = %name, "Collection directory was already gone");
            }
            Err(e) => {
                warn!(
                    collection = %name,
                    dir = %dir.display(),
                    error = %e,
                    "Collection unlisted but its directory remains; it is cleared on re-create"
                );
                return Err(Error::store_io(&dir, e));
            }
        }

        info!(collection = %name, "Deleted collection");
        Ok(())
    }

    /// Remove an unlisted directory left behind by a failed delete
    ///
    /// Only directories holding nothing but store files are removed; anything
    /// else is left for `create_dir` to report.
    async fn clear_leftover(&self, name: &str, dir: &Path) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::store_io(dir, e))?
        {
            let file_name = entry.file_name();
            if !StoreKind::ALL
                .iter()
                .any(|kind| file_name.to_str() == Some(kind.file_name()))
            {
                return Ok(());
            }
        }

        warn!(
            collection = %name,
            dir = %dir.display(),
            "Clearing leftover collection directory"
        );
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| Error::store_io(dir, e))
    }

    async fn remove_dir_quietly(&self, dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Rollback could not remove directory");
        }
    }

    /// Take the collection's write lock and check it still exists
    async fn locked_store(&self, collection: &str) -> Result<(OwnedMutexGuard<()>, RecordStore)> {
        if !self.collection_exists(collection).await {
            return Err(Error::CollectionNotFound(collection.to_string()));
        }
        let guard = self.locks.lock(collection).await;
        if !self.collection_exists(collection).await {
            return Err(Error::CollectionNotFound(collection.to_string()));
        }
        let store = RecordStore::new(self.root.join(collection), self.options.sync_writes);
        Ok((guard, store))
    }

    /// Persist a new node
    ///
    /// Everything is validated before the first write. Label, key, string and
    /// property records are appended before the node record referencing them.
    /// Returns the stored node with its id, and the node record.
    pub async fn create_node(&self, collection: &str, node: &Node) -> Result<(Node, NodeRecord)> {
        let (_guard, store) = self.locked_store(collection).await?;

        check_user_keys(&node.properties)?;
        let label_record = if node.labels.is_empty() {
            None
        } else {
            Some(LabelRecord::new(node.labels.clone())?)
        };
        let mut properties = Vec::with_capacity(node.properties.len() + 1);
        if let Some(name) = &node.name {
            properties.push(Property::new(NAME_PROPERTY, name.as_str()));
        }
        properties.extend(node.properties.iter().cloned());
        let plan = store.plan_properties(&properties).await?;
        store.verify().await?;

        let label_ptr = match &label_record {
            Some(record) => Some(store.labels().await?.append(record).await?),
            None => None,
        };
        let prop_ptr = store.write_properties(&plan).await?;
        let id = store.create_node_record(label_ptr, prop_ptr).await?;

        debug!(collection = %collection, id, ?label_ptr, ?prop_ptr, "Created node");

        let stored = Node {
            id: Some(NodeId(id)),
            name: node.name.clone(),
            labels: node.labels.clone(),
            properties: node.properties.clone(),
            relationships: Vec::new(),
        };
        Ok((stored, NodeRecord::new(label_ptr, prop_ptr)))
    }

    /// Read a node back from its records
    pub async fn get_node(&self, collection: &str, id: NodeId) -> Result<Node> {
        let (_guard, store) = self.locked_store(collection).await?;
        let record = store.nodes().await?.read_in_use(id.value()).await?;

        let labels = match record.label_ptr {
            Some(ptr) => store.read_labels(ptr).await?,
            None => Vec::new(),
        };
        let (name, properties) = split_name(store.read_properties(record.next_prop).await?);

        let rels = store.relationships().await?;
        let limit = rels.len().await?;
        let mut relationships = Vec::new();
        let mut next = record.next_rel;
        while let Some(rel_id) = next {
            if relationships.len() as u32 >= limit {
                return Err(Error::InvalidReference(format!(
                    "relationship chain of node {} does not terminate",
                    id
                )));
            }
            let rel = rels.read_in_use(rel_id).await?;
            relationships.push(RelationshipId(rel_id));
            next = rel.next_for(id.value());
        }

        Ok(Node {
            id: Some(id),
            name,
            labels,
            properties,
            relationships,
        })
    }

    /// Persist a relationship between two existing nodes
    ///
    /// The new record becomes the head of both endpoints' relationship
    /// chains; the previous heads and the endpoint node records are patched
    /// in place.
    pub async fn create_relationship(
        &self,
        collection: &str,
        rel: &Relationship,
    ) -> Result<Relationship> {
        let (_guard, store) = self.locked_store(collection).await?;
        let nodes = store.nodes().await?;

        let start = rel.start.value();
        let end = rel.end.value();
        let mut start_record = read_endpoint(&nodes, start).await?;
        let mut end_record = read_endpoint(&nodes, end).await?;

        check_user_keys(&rel.properties)?;
        if rel.rel_type.is_empty() {
            return Err(Error::ValueOutOfRange(
                "relationship type must not be empty".to_string(),
            ));
        }
        let mut type_labels = vec![rel.rel_type.clone()];
        type_labels.extend(rel.label.clone());
        let type_record = LabelRecord::new(type_labels)?;
        let plan = store.plan_properties(&rel.properties).await?;
        store.verify().await?;

        let rel_type = store.labels().await?.append(&type_record).await?;
        let next_prop = store.write_properties(&plan).await?;

        let record = RelationshipRecord {
            in_use: true,
            first_node: start,
            second_node: end,
            rel_type,
            first_prev: None,
            first_next: start_record.next_rel,
            second_prev: None,
            second_next: end_record.next_rel,
            next_prop,
        };
        let rels = store.relationships().await?;
        let id = rels.append(&record).await?;

        for (node, old_head) in [(start, start_record.next_rel), (end, end_record.next_rel)] {
            if let Some(head) = old_head {
                let mut prev_head = rels.read(head).await?;
                prev_head.set_prev_for(node, Some(id));
                rels.write_at(head, &prev_head).await?;
            }
            if start == end {
                break;
            }
        }

        start_record.next_rel = Some(id);
        nodes.write_at(start, &start_record).await?;
        if end != start {
            end_record.next_rel = Some(id);
            nodes.write_at(end, &end_record).await?;
        }

        debug!(collection = %collection, id, start, end, rel_type, "Created relationship");
        Ok(rel.with_id(RelationshipId(id)))
    }

    /// Read a relationship back from its records
    pub async fn get_relationship(&self, collection: &str, id: RelationshipId) -> Result<Relationship> {
        let (_guard, store) = self.locked_store(collection).await?;
        let record = store.relationships().await?.read_in_use(id.value()).await?;

        let mut type_labels = store.read_labels(record.rel_type).await?.into_iter();
        let rel_type = type_labels.next().ok_or_else(|| {
            Error::InvalidReference(format!(
                "relationship {} points at an empty type record {}",
                id, record.rel_type
            ))
        })?;

        Ok(Relationship {
            id: Some(id),
            start: NodeId(record.first_node),
            end: NodeId(record.second_node),
            rel_type,
            label: type_labels.next(),
            properties: store.read_properties(record.next_prop).await?,
        })
    }
}

async fn read_endpoint(
    nodes: &crate::storage::RecordFile<NodeRecord>,
    id: RecordId,
) -> Result<NodeRecord> {
    match nodes.read_in_use(id).await {
        Ok(record) => Ok(record),
        Err(Error::NotFound(_)) => Err(Error::InvalidReference(format!(
            "node {} does not exist",
            id
        ))),
        Err(e) => Err(e),
    }
}

fn check_user_keys(properties: &[Property]) -> Result<()> {
    match properties.iter().find(|p| p.key.starts_with('@')) {
        Some(p) => Err(Error::ValueOutOfRange(format!(
            "property name '{}' is reserved",
            p.key
        ))),
        None => Ok(()),
    }
}

fn split_name(properties: Vec<Property>) -> (Option<String>, Vec<Property>) {
    let mut name = None;
    let mut rest = Vec::with_capacity(properties.len());
    for prop in properties {
        match prop.value {
            PropertyValue::String(s) if prop.key == NAME_PROPERTY => name = Some(s),
            value => rest.push(Property {
                key: prop.key,
                value,
            }),
        }
    }
    (name, rest)
}
