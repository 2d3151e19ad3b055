//! Typed access to one store file
//!
//! A store file is a [`StoreHeader`] followed by fixed-size records. Record
//! `id` lives at byte offset `HEADER_SIZE + id * R::SIZE`.

use crate::codec::{Endian, HEADER_SIZE, RecordId, StoreHeader, StoreKind, StoreRecord};
use crate::error::IoResultExt;
use crate::{Error, Result};
use std::io::SeekFrom;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Handle to an opened, header-checked store file
#[derive(Debug)]
pub struct RecordFile<R> {
    path: PathBuf,
    header: StoreHeader,
    sync: bool,
    _record: PhantomData<R>,
}

/// Create a new store file holding only its header. Fails if the file exists.
pub async fn create_store_file(path: &Path, kind: StoreKind, endian: Endian) -> Result<()> {
    let header = StoreHeader::new(kind, endian);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .at(path)?;
    file.write_all(&header.serialize()).await.at(path)?;
    file.sync_all().await.at(path)?;
    Ok(())
}

impl<R: StoreRecord> RecordFile<R> {
    /// Open a store file, rejecting it unless its header matches `kind` and `R::SIZE`
    pub async fn open(path: &Path, kind: StoreKind, sync: bool) -> Result<Self> {
        if kind.record_size() != R::SIZE {
            return Err(Error::internal(format!(
                "{} codec is {} bytes but {:?} store declares {}",
                R::KIND,
                R::SIZE,
                kind,
                kind.record_size()
            )));
        }

        let mut file = File::open(path).await.at(path)?;
        let mut bytes = [0u8; HEADER_SIZE];
        file.read_exact(&mut bytes).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::incompatible(path, "file shorter than store header")
            } else {
                Error::store_io(path, e)
            }
        })?;
        let header = StoreHeader::read_checked(&bytes, kind, path)?;

        let handle = Self {
            path: path.to_path_buf(),
            header,
            sync,
            _record: PhantomData,
        };
        handle.len().await?;
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Byte order recorded in the header
    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Number of records in the file (in use or not)
    pub async fn len(&self) -> Result<u32> {
        let size = tokio::fs::metadata(&self.path).await.at(&self.path)?.len();
        self.count_for(size)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    fn count_for(&self, file_size: u64) -> Result<u32> {
        let body = file_size.saturating_sub(HEADER_SIZE as u64);
        let record = R::SIZE as u64;
        let torn = body % record;
        if torn != 0 {
            tracing::warn!(
                path = %self.path.display(),
                body,
                "Store body is not a whole number of records"
            );
            return Err(Error::malformed(R::KIND, R::SIZE, torn as usize));
        }
        u32::try_from(body / record)
            .map_err(|_| Error::incompatible(&self.path, "record count exceeds id space"))
    }

    fn offset_of(id: RecordId) -> u64 {
        HEADER_SIZE as u64 + id as u64 * R::SIZE as u64
    }

    /// Append one record at the end of the file and return its id
    pub async fn append(&self, record: &R) -> Result<RecordId> {
        self.append_all(std::slice::from_ref(record)).await
    }

    /// Append records contiguously with a single write; returns the id of the first
    ///
    /// Ids are derived from the file length, so callers must hold the
    /// collection's write lock.
    pub async fn append_all(&self, records: &[R]) -> Result<RecordId> {
        let first = self.len().await?;
        let last = first as u64 + records.len() as u64;
        if last >= crate::codec::NULL_REF as u64 {
            return Err(Error::too_large(
                "record id",
                crate::codec::NULL_REF as usize - 1,
                last as usize,
            ));
        }

        let mut bytes = Vec::with_capacity(records.len() * R::SIZE);
        for record in records {
            bytes.extend_from_slice(&record.serialize_with(self.endian()));
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .at(&self.path)?;
        file.write_all(&bytes).await.at(&self.path)?;
        file.flush().await.at(&self.path)?;
        if self.sync {
            file.sync_data().await.at(&self.path)?;
        }

        tracing::debug!(
            path = %self.path.display(),
            kind = R::KIND,
            first,
            count = records.len(),
            "appended records"
        );
        Ok(first)
    }

    /// Read the record at `id`, whether in use or not
    pub async fn read(&self, id: RecordId) -> Result<R> {
        let len = self.len().await?;
        if id >= len {
            return Err(Error::NotFound(format!(
                "{} record {} (store holds {})",
                R::KIND,
                id,
                len
            )));
        }

        let mut file = File::open(&self.path).await.at(&self.path)?;
        file.seek(SeekFrom::Start(Self::offset_of(id)))
            .await
            .at(&self.path)?;
        let mut bytes = vec![0u8; R::SIZE];
        file.read_exact(&mut bytes).await.at(&self.path)?;
        R::deserialize_with(&bytes, self.endian())
    }

    /// Read the record at `id`, failing with `NotFound` if its slot is free
    pub async fn read_in_use(&self, id: RecordId) -> Result<R> {
        let record = self.read(id).await?;
        if !record.in_use() {
            return Err(Error::NotFound(format!("{} record {} is not in use", R::KIND, id)));
        }
        Ok(record)
    }

    /// Read every record in id order
    pub async fn read_all(&self) -> Result<Vec<R>> {
        let bytes = tokio::fs::read(&self.path).await.at(&self.path)?;
        self.count_for(bytes.len() as u64)?;
        bytes[HEADER_SIZE..]
            .chunks_exact(R::SIZE)
            .map(|chunk| R::deserialize_with(chunk, self.endian()))
            .collect()
    }

    /// Overwrite an existing record in place
    pub async fn write_at(&self, id: RecordId, record: &R) -> Result<()> {
        let len = self.len().await?;
        if id >= len {
            return Err(Error::NotFound(format!(
                "{} record {} (store holds {})",
                R::KIND,
                id,
                len
            )));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .at(&self.path)?;
        file.seek(SeekFrom::Start(Self::offset_of(id)))
            .await
            .at(&self.path)?;
        file.write_all(&record.serialize_with(self.endian()))
            .await
            .at(&self.path)?;
        file.flush().await.at(&self.path)?;
        if self.sync {
            file.sync_data().await.at(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NodeRecord;
    use tempfile::TempDir;

    async fn node_file(dir: &TempDir, endian: Endian) -> RecordFile<NodeRecord> {
        let path = dir.path().join("nodes.store");
        create_store_file(&path, StoreKind::Node, endian)
            .await
            .unwrap();
        RecordFile::open(&path, StoreKind::Node, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_ordinal_ids() {
        let dir = TempDir::new().unwrap();
        let file = node_file(&dir, Endian::Little).await;
        assert!(file.is_empty().await.unwrap());

        let a = file.append(&NodeRecord::new(None, None)).await.unwrap();
        let b = file.append(&NodeRecord::new(Some(1), Some(2))).await.unwrap();
        assert_eq!((a, b), (0, 1));

        let size = std::fs::metadata(file.path()).unwrap().len();
        assert_eq!(size, (HEADER_SIZE + 2 * 13) as u64);
        assert_eq!(file.read(1).await.unwrap().label_ptr, Some(1));
    }

    #[tokio::test]
    async fn test_write_at_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let file = node_file(&dir, Endian::Big).await;
        file.append(&NodeRecord::new(None, None)).await.unwrap();

        let mut record = file.read(0).await.unwrap();
        record.next_rel = Some(5);
        file.write_at(0, &record).await.unwrap();

        assert_eq!(file.read(0).await.unwrap().next_rel, Some(5));
        assert_eq!(file.len().await.unwrap(), 1);
        assert!(file.write_at(1, &record).await.is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_other_store_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.store");
        create_store_file(&path, StoreKind::Label, Endian::Little)
            .await
            .unwrap();
        let err = RecordFile::<NodeRecord>::open(&path, StoreKind::Node, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleStoreFormat { .. }));
    }

    #[tokio::test]
    async fn test_open_rejects_torn_body() {
        let dir = TempDir::new().unwrap();
        let file = node_file(&dir, Endian::Little).await;
        let path = file.path().to_path_buf();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();

        let err = RecordFile::<NodeRecord>::open(&path, StoreKind::Node, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedRecord {
                expected: 13,
                actual: 3,
                ..
            }
        ));
        assert!(err.is_record_format());
    }

    #[tokio::test]
    async fn test_missing_file_is_store_io() {
        let dir = TempDir::new().unwrap();
        let err = RecordFile::<NodeRecord>::open(&dir.path().join("nope"), StoreKind::Node, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_IO_ERROR");
        assert_eq!(err.os_error(), Some(2));
    }

    #[tokio::test]
    async fn test_read_in_use_rejects_free_slot() {
        let dir = TempDir::new().unwrap();
        let file = node_file(&dir, Endian::Little).await;
        file.append(&NodeRecord::default()).await.unwrap();
        assert!(matches!(
            file.read_in_use(0).await,
            Err(Error::NotFound(_))
        ));
    }
}
