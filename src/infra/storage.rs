//! Durable slot storage for client state.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

use crate::application::error::StorageError;
use crate::application::ports::SlotStore;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "infra::storage";

type Slots = BTreeMap<String, String>;

/// Slots kept as one JSON object in a file. Writes replace the file
/// atomically, so a crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct FileSlotStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSlotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Slots, StorageError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Slots::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Slots::new());
        }
        serde_json::from_str(&raw)
            .map_err(|err| StorageError::serialize(self.path.display().to_string(), err))
    }

    async fn write_all(&self, slots: &Slots) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(slots)
            .map_err(|err| StorageError::serialize(self.path.display().to_string(), err))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&path, &encoded))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut file = NamedTempFile::new_in(&parent)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[async_trait]
impl SlotStore for FileSlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all().await?.remove(slot))
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut slots = self.read_all().await?;
        slots.insert(slot.to_string(), value.to_string());
        self.write_all(&slots).await?;
        debug!(slot, path = %self.path.display(), "Slot persisted");
        Ok(())
    }
}

/// Process-local slots, lost on exit.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(mutex_lock(&self.slots, SOURCE, "read").get(slot).cloned())
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        mutex_lock(&self.slots, SOURCE, "write").insert(slot.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSlotStore::new(dir.path().join("state.json"));

        assert_eq!(store.read("likedDesigns").await.expect("read"), None);
    }

    #[tokio::test]
    async fn slots_survive_reopen_and_stay_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/state.json");

        let store = FileSlotStore::new(&path);
        store.write("likedDesigns", r#"["1"]"#).await.expect("write");
        store.write("other", "x").await.expect("write");
        store.write("likedDesigns", r#"["1","2"]"#).await.expect("write");
        drop(store);

        let reopened = FileSlotStore::new(&path);
        assert_eq!(
            reopened.read("likedDesigns").await.expect("read").as_deref(),
            Some(r#"["1","2"]"#)
        );
        assert_eq!(reopened.read("other").await.expect("read").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{oops").expect("seed");

        let store = FileSlotStore::new(&path);
        assert!(matches!(
            store.read("likedDesigns").await,
            Err(StorageError::Serialize { .. })
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySlotStore::default();
        store.write("a", "1").await.expect("write");
        assert_eq!(store.read("a").await.expect("read").as_deref(), Some("1"));
        assert_eq!(store.read("b").await.expect("read"), None);
    }
}
