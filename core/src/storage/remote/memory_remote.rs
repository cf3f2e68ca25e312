use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::error::{RemoteError, StorageError};
use crate::storage::table::Table;
use crate::storage::traits::RemoteStore;

type TableRows = BTreeMap<String, Value>;
type Partitions = HashMap<(Table, String), TableRows>;

/// On-disk form of the store: table name, then user id, then rows by id
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    store_id: String,
    #[serde(default)]
    tables: BTreeMap<String, BTreeMap<String, TableRows>>,
}

/// In-process implementation of the hosted table backend
///
/// Rows are partitioned by `(table, user_id)`. A store created with
/// [`MemoryRemoteStore::open`] writes every change to a JSON snapshot and
/// keeps its identity across restarts. The store can be switched offline or
/// told to fail upcoming calls, which is how the reconciliation paths are
/// exercised without a network.
pub struct MemoryRemoteStore {
    store_id: String,
    rows: RwLock<Partitions>,
    snapshot_path: Option<PathBuf>,
    offline: AtomicBool,
    injected_failures: Mutex<VecDeque<RemoteError>>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::with_rows(Uuid::new_v4().to_string(), Partitions::new(), None)
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rows(store_id: String, rows: Partitions, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            store_id,
            rows: RwLock::new(rows),
            snapshot_path,
            offline: AtomicBool::new(false),
            injected_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Open the store persisted at `path`, creating an empty one if the file is missing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Snapshot>(&contents).map_err(|e| StorageError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let snapshot = Snapshot {
                    store_id: Uuid::new_v4().to_string(),
                    tables: BTreeMap::new(),
                };
                std::fs::write(&path, serde_json::to_string(&snapshot)?)?;
                info!("Created remote table snapshot {}", path.display());
                snapshot
            }
            Err(e) => return Err(e.into()),
        };

        let mut rows = Partitions::new();
        for (table_name, users) in snapshot.tables {
            let table = table_name.parse::<Table>().map_err(|reason| StorageError::Corrupt {
                key: path.display().to_string(),
                reason,
            })?;
            for (user_id, table_rows) in users {
                rows.insert((table, user_id), table_rows);
            }
        }
        Ok(Self::with_rows(snapshot.store_id, rows, Some(path)))
    }

    /// Identity of this store; a store recreated from nothing gets a new one
    pub fn id(&self) -> &str {
        &self.store_id
    }

    /// Write all rows to the snapshot file; the caller holds the write lock
    async fn persist(&self, rows: &Partitions) -> Result<(), RemoteError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut tables: BTreeMap<String, BTreeMap<String, TableRows>> = BTreeMap::new();
        for ((table, user_id), table_rows) in rows {
            tables
                .entry(table.name().to_string())
                .or_default()
                .insert(user_id.clone(), table_rows.clone());
        }
        let snapshot = Snapshot {
            store_id: self.store_id.clone(),
            tables,
        };
        let failed = |message: String| RemoteError::Server { status: 500, message };
        let contents = serde_json::to_string(&snapshot).map_err(|e| failed(e.to_string()))?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, contents.as_bytes())
            .await
            .map_err(|e| failed(e.to_string()))?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            warn!("Failed to move {} into place: {}", temp_path.display(), e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(failed(e.to_string()));
        }
        Ok(())
    }

    /// While offline every call fails with a network error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next call fail with `error`; queued failures are consumed in order
    pub fn fail_next(&self, error: RemoteError) {
        if let Ok(mut queue) = self.injected_failures.lock() {
            queue.push_back(error);
        }
    }

    pub async fn row_count(&self, table: Table, user_id: &str) -> usize {
        self.rows
            .read()
            .await
            .get(&(table, user_id.to_string()))
            .map_or(0, |rows| rows.len())
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote backend unreachable".to_string()));
        }
        let injected = self
            .injected_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Validate a row and stamp it with its owner
    fn prepare_row(user_id: &str, mut row: Value) -> Result<(String, Value), RemoteError> {
        let object = row
            .as_object_mut()
            .ok_or_else(|| RemoteError::Validation("row must be a JSON object".to_string()))?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Validation("row is missing an id".to_string()))?;

        if let Some(owner) = object.get("user_id").and_then(Value::as_str) {
            if owner != user_id {
                return Err(RemoteError::Auth(format!("row {} belongs to another user", id)));
            }
        }
        object.insert("user_id".to_string(), Value::String(user_id.to_string()));

        Ok((id, row))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn store_id(&self) -> Result<String, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote backend unreachable".to_string()));
        }
        Ok(self.store_id.clone())
    }

    async fn select(&self, table: Table, user_id: &str) -> Result<Vec<Value>, RemoteError> {
        self.check_available()?;
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(table, user_id.to_string()))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn select_one(&self, table: Table, user_id: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        self.check_available()?;
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(table, user_id.to_string()))
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError> {
        self.check_available()?;
        let (id, row) = Self::prepare_row(user_id, row)?;
        let mut rows = self.rows.write().await;
        let table_rows = rows.entry((table, user_id.to_string())).or_default();
        if table_rows.contains_key(&id) {
            return Err(RemoteError::Conflict(format!("{} row {} already exists", table, id)));
        }
        debug!("remote insert {}/{}", table, id);
        table_rows.insert(id, row.clone());
        self.persist(&rows).await?;
        Ok(row)
    }

    async fn update(&self, table: Table, user_id: &str, id: &str, row: Value) -> Result<Value, RemoteError> {
        self.check_available()?;
        let (row_id, row) = Self::prepare_row(user_id, row)?;
        if row_id != id {
            return Err(RemoteError::Validation(format!("row id {} does not match {}", row_id, id)));
        }
        let mut rows = self.rows.write().await;
        let existing = rows
            .get_mut(&(table, user_id.to_string()))
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound(format!("{} row {}", table, id)))?;
        debug!("remote update {}/{}", table, id);
        *existing = row.clone();
        self.persist(&rows).await?;
        Ok(row)
    }

    async fn upsert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError> {
        self.check_available()?;
        let (id, row) = Self::prepare_row(user_id, row)?;
        let mut rows = self.rows.write().await;
        debug!("remote upsert {}/{}", table, id);
        rows.entry((table, user_id.to_string()))
            .or_default()
            .insert(id, row.clone());
        self.persist(&rows).await?;
        Ok(row)
    }

    async fn delete(&self, table: Table, user_id: &str, id: &str) -> Result<bool, RemoteError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let removed = rows
            .get_mut(&(table, user_id.to_string()))
            .map_or(false, |rows| rows.remove(id).is_some());
        debug!("remote delete {}/{} (existed: {})", table, id, removed);
        if removed {
            self.persist(&rows).await?;
        }
        Ok(removed)
    }
}
