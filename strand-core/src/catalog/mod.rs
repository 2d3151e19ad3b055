//! Master catalog - the list of collections in a database directory
//!
//! File layout:
//!
//! ```text
//! 0..4    magic "SGCT"
//! 4..6    format version (u16 LE)
//! 6..10   collection count (u32 LE)
//! 10..18  created at, Unix seconds (i64 LE)
//! 18..26  updated at, Unix seconds (i64 LE)
//! 26..92  reserved, zero
//! 92..    collection names, each terminated by '\n'
//! ```

use crate::error::IoResultExt;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the catalog inside the database directory
pub const CATALOG_FILE: &str = "strand.catalog";

/// Size of the fixed metadata block
pub const METADATA_SIZE: usize = 92;

/// Longest collection name
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

const CATALOG_MAGIC: [u8; 4] = *b"SGCT";
const CATALOG_VERSION: u16 = 1;
const NAME_DELIMITER: u8 = b'\n';

/// Check a collection name: 1-64 ASCII letters, digits, '_' or '-'
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCollectionName(name.to_string()))
    }
}

/// Fixed-size catalog header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogMetadata {
    pub version: u16,
    pub collection_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CatalogMetadata {
    fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            version: CATALOG_VERSION,
            collection_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> [u8; METADATA_SIZE] {
        let mut block = [0u8; METADATA_SIZE];
        block[0..4].copy_from_slice(&CATALOG_MAGIC);
        block[4..6].copy_from_slice(&self.version.to_le_bytes());
        block[6..10].copy_from_slice(&self.collection_count.to_le_bytes());
        block[10..18].copy_from_slice(&self.created_at.to_le_bytes());
        block[18..26].copy_from_slice(&self.updated_at.to_le_bytes());
        block
    }

    fn decode(block: &[u8]) -> std::result::Result<Self, String> {
        if block.len() < METADATA_SIZE {
            return Err(format!(
                "metadata block is {} bytes, expected {}",
                block.len(),
                METADATA_SIZE
            ));
        }
        if block[0..4] != CATALOG_MAGIC {
            return Err(format!("bad magic {:02x?}", &block[0..4]));
        }
        let mut u16_bytes = [0u8; 2];
        let mut u32_bytes = [0u8; 4];
        let mut i64_bytes = [0u8; 8];

        u16_bytes.copy_from_slice(&block[4..6]);
        let version = u16::from_le_bytes(u16_bytes);
        if version != CATALOG_VERSION {
            return Err(format!("unsupported catalog version {}", version));
        }
        u32_bytes.copy_from_slice(&block[6..10]);
        let collection_count = u32::from_le_bytes(u32_bytes);
        i64_bytes.copy_from_slice(&block[10..18]);
        let created_at = i64::from_le_bytes(i64_bytes);
        i64_bytes.copy_from_slice(&block[18..26]);
        let updated_at = i64::from_le_bytes(i64_bytes);

        Ok(Self {
            version,
            collection_count,
            created_at,
            updated_at,
        })
    }
}

/// In-memory catalog, flushed to disk after every change
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    metadata: CatalogMetadata,
    collections: Vec<String>,
}

impl Catalog {
    /// Load the catalog in `dir`, creating an empty one if it does not exist
    ///
    /// Any failure is an [`Error::EngineInitialization`].
    pub async fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(CATALOG_FILE);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Self::load(&path).await,
            Ok(false) => {
                let catalog = Self {
                    path,
                    metadata: CatalogMetadata::new(),
                    collections: Vec::new(),
                };
                catalog.flush().await.map_err(|e| {
                    Error::EngineInitialization(format!("cannot create catalog: {}", e))
                })?;
                info!(path = %catalog.path.display(), "Created empty catalog");
                Ok(catalog)
            }
            Err(e) => Err(Error::EngineInitialization(format!(
                "cannot access {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load an existing catalog file
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::EngineInitialization(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::decode(path, &bytes).map_err(|reason| {
            Error::EngineInitialization(format!("corrupt catalog {}: {}", path.display(), reason))
        })?;
        info!(
            path = %path.display(),
            collections = catalog.collections.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    fn decode(path: &Path, bytes: &[u8]) -> std::result::Result<Self, String> {
        let metadata = CatalogMetadata::decode(bytes)?;
        let names = &bytes[METADATA_SIZE..];
        if !names.is_empty() && names.last() != Some(&NAME_DELIMITER) {
            return Err("name list is not terminated".to_string());
        }

        let mut collections = Vec::new();
        for raw in names.split(|b| *b == NAME_DELIMITER).filter(|n| !n.is_empty()) {
            let name = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
            validate_collection_name(name).map_err(|e| e.to_string())?;
            if collections.iter().any(|c| c == name) {
                return Err(format!("collection '{}' listed twice", name));
            }
            collections.push(name.to_string());
        }

        if metadata.collection_count as usize != collections.len() {
            warn!(
                recorded = metadata.collection_count,
                listed = collections.len(),
                "Catalog count disagrees with name list, using the list"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            collections,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut metadata = self.metadata;
        metadata.collection_count = self.collections.len() as u32;

        let mut bytes = metadata.encode().to_vec();
        for name in &self.collections {
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(NAME_DELIMITER);
        }
        bytes
    }

    /// Write the catalog through a temporary file and rename it into place
    pub async fn flush(&self) -> Result<()> {
        let tmp = self.path.with_extension("catalog.tmp");
        tokio::fs::write(&tmp, self.encode()).await.at(&tmp)?;
        tokio::fs::rename(&tmp, &self.path).await.at(&self.path)?;
        debug!(
            path = %self.path.display(),
            collections = self.collections.len(),
            "Flushed catalog"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> CatalogMetadata {
        CatalogMetadata {
            collection_count: self.collections.len() as u32,
            ..self.metadata
        }
    }

    /// Collection names in creation order
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c == name)
    }

    /// Add a collection in memory
    pub fn add(&mut self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        if self.contains(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }
        self.collections.push(name.to_string());
        self.touch();
        Ok(())
    }

    /// Remove a collection in memory
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let pos = self
            .collections
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        self.collections.remove(pos);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.metadata.updated_at = chrono::Utc::now().timestamp();
    }
}
