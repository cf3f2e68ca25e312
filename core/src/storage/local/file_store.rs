use async_trait::async_trait;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::storage::error::StorageError;
use crate::storage::traits::LocalStore;

/// Key-value store keeping one JSON file per key under a base directory
#[derive(Clone)]
pub struct FileStore {
    base_directory: PathBuf,
}

impl FileStore {
    /// Create a new file store, creating the base directory if needed
    pub fn new<P: AsRef<Path>>(base_directory: P) -> Result<Self, StorageError> {
        let base_path = base_directory.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
            info!("Created local data directory: {}", base_path.display());
        }

        Ok(Self {
            base_directory: base_path,
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Map a key to a file name that is safe on every platform
    fn file_path(&self, key: &str) -> PathBuf {
        let safe_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.base_directory.join(format!("{}.json", safe_name))
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.file_path(key);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let file_path = self.file_path(key);

        // Write to a temporary file first, then rename over the target
        let temp_path = file_path.with_extension("tmp");
        fs::write(&temp_path, value.as_bytes()).await?;
        if let Err(e) = fs::rename(&temp_path, &file_path).await {
            warn!("Failed to move {} into place: {}", temp_path.display(), e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();

        store.set_item("wealth_tracker_assets", "[]").await.unwrap();
        assert_eq!(
            store.get_item("wealth_tracker_assets").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        assert!(store.get_item("nothing_here").await.unwrap().is_none());
        store.remove_item("nothing_here").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_with_separators_stay_inside_base_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();

        store.set_item("wealth_tracker_assets:pending", "{}").await.unwrap();
        store.set_item("../escape", "x").await.unwrap();

        let path = store.file_path("../escape");
        assert_eq!(path.parent().unwrap(), temp_dir.path());
        assert!(store.get_item("wealth_tracker_assets:pending").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();

        store.set_item("k", "1").await.unwrap();
        store.set_item("k", "2").await.unwrap();

        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("2"));
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_base_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("Wealth Tracker").join("data");
        let store = FileStore::new(&nested).unwrap();
        assert!(nested.exists());
        store.set_item("k", "v").await.unwrap();
    }
}
