//! Generic repository mirroring one collection between the local store and
//! its remote table.
//!
//! Every write goes to the local cache first and then to the remote with
//! retry. A remote write that still fails is remembered in the pending ledger
//! so that [`RecordRepository::push`] can deliver it later; [`RecordRepository::pull`]
//! folds remote changes back in with last-write-wins on `updated_at`.
//!
//! Each table also keeps the ids the current remote store has confirmed.
//! Only a confirmed row that disappears remotely counts as a remote delete;
//! a row the store never held is queued for upload again.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use super::pending::{ConfirmedIds, PendingChanges};
use crate::storage::connection::DataConnection;
use crate::storage::error::{RemoteError, StorageError};
use crate::storage::events::ChangeKind;
use crate::storage::record::{coerce_uuid, Record};

/// Result of delivering pending local changes to the remote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub pushed: usize,
    pub remote_deleted: usize,
    pub pending: usize,
}

/// Result of merging remote rows into the local cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutcome {
    pub pulled: usize,
    pub removed_locally: usize,
    /// Local records the remote never held, now queued as pending upserts
    pub requeued: usize,
}

/// Merged collection produced by [`reconcile`]
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    pub records: Vec<T>,
    pub pulled: usize,
    pub removed_locally: usize,
    /// Local-only records kept because `store_id` never confirmed them
    pub requeued: Vec<String>,
}

/// Merge a local and a remote copy of a collection
///
/// - a record with a pending local upsert keeps its local version
/// - otherwise the copy with the newer `updated_at` wins
/// - remote-only records are added unless a local delete is pending
/// - local-only records that `store_id` had confirmed were deleted remotely and are dropped
/// - any other local-only record is kept and reported in `requeued`
pub fn reconcile<T: Record>(
    local: Vec<T>,
    remote: Vec<T>,
    pending: &PendingChanges,
    confirmed: &ConfirmedIds,
    store_id: &str,
) -> Reconciled<T> {
    let mut remote_by_id: HashMap<String, T> = HashMap::new();
    let mut remote_order = Vec::with_capacity(remote.len());
    for record in remote {
        remote_order.push(record.id().to_string());
        remote_by_id.insert(record.id().to_string(), record);
    }

    let mut records = Vec::with_capacity(local.len().max(remote_by_id.len()));
    let mut seen = HashSet::new();
    let mut pulled = 0;
    let mut removed_locally = 0;
    let mut requeued = Vec::new();

    for local_record in local {
        let id = local_record.id().to_string();
        let remote_record = remote_by_id.remove(&id);

        if pending.is_upsert_pending(&id) {
            records.push(local_record);
        } else if let Some(remote_record) = remote_record {
            if remote_record.updated_at() > local_record.updated_at() {
                pulled += 1;
                records.push(remote_record);
            } else {
                records.push(local_record);
            }
        } else if confirmed.contains(store_id, &id) {
            debug!("{} {} no longer exists remotely; dropping local copy", T::TABLE, id);
            removed_locally += 1;
            continue;
        } else {
            debug!("{} {} was never stored remotely; queueing it for upload", T::TABLE, id);
            requeued.push(id.clone());
            records.push(local_record);
        }
        seen.insert(id);
    }

    for id in remote_order {
        if seen.contains(&id) || pending.is_delete_pending(&id) {
            continue;
        }
        if let Some(remote_record) = remote_by_id.remove(&id) {
            pulled += 1;
            records.push(remote_record);
            seen.insert(id);
        }
    }

    Reconciled {
        records,
        pulled,
        removed_locally,
        requeued,
    }
}

pub struct RecordRepository<T: Record> {
    connection: DataConnection,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for RecordRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.connection.clone())
    }
}

impl<T: Record> RecordRepository<T> {
    pub fn new(connection: DataConnection) -> Self {
        Self {
            connection,
            _record: PhantomData,
        }
    }

    /// Read the local collection; elements that no longer parse are skipped
    async fn read_local(&self) -> Result<Vec<T>> {
        let key = T::TABLE.local_key();
        let raw = match self.connection.local().get_item(&key).await? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Vec::new()),
        };

        let values: Vec<Value> = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<T>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable {} record in local storage: {}", T::TABLE, e),
            }
        }
        Ok(records)
    }

    async fn write_local(&self, records: &[T]) -> Result<()> {
        let raw = serde_json::to_string(records).map_err(StorageError::from)?;
        self.connection
            .local()
            .set_item(&T::TABLE.local_key(), &raw)
            .await?;
        Ok(())
    }

    async fn read_pending(&self) -> Result<PendingChanges> {
        match self.connection.local().get_item(&T::TABLE.pending_key()).await? {
            Some(raw) if !raw.trim().is_empty() => match serde_json::from_str(&raw) {
                Ok(pending) => Ok(pending),
                Err(e) => {
                    warn!("Pending change ledger for {} is unreadable, starting empty: {}", T::TABLE, e);
                    Ok(PendingChanges::default())
                }
            },
            _ => Ok(PendingChanges::default()),
        }
    }

    async fn write_pending(&self, pending: &PendingChanges) -> Result<()> {
        let key = T::TABLE.pending_key();
        if pending.is_empty() {
            self.connection.local().remove_item(&key).await?;
        } else {
            let raw = serde_json::to_string(pending).map_err(StorageError::from)?;
            self.connection.local().set_item(&key, &raw).await?;
        }
        Ok(())
    }

    /// Apply `update` to the pending ledger under the table lock
    async fn update_pending<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut PendingChanges),
    {
        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        let mut pending = self.read_pending().await?;
        let before = pending.clone();
        update(&mut pending);
        if pending != before {
            self.write_pending(&pending).await?;
        }
        Ok(())
    }

    async fn read_confirmed(&self) -> Result<ConfirmedIds> {
        match self.connection.local().get_item(&T::TABLE.confirmed_key()).await? {
            Some(raw) if !raw.trim().is_empty() => match serde_json::from_str(&raw) {
                Ok(confirmed) => Ok(confirmed),
                Err(e) => {
                    warn!("Confirmed ids for {} are unreadable, starting empty: {}", T::TABLE, e);
                    Ok(ConfirmedIds::default())
                }
            },
            _ => Ok(ConfirmedIds::default()),
        }
    }

    async fn write_confirmed(&self, confirmed: &ConfirmedIds) -> Result<()> {
        let raw = serde_json::to_string(confirmed).map_err(StorageError::from)?;
        self.connection
            .local()
            .set_item(&T::TABLE.confirmed_key(), &raw)
            .await?;
        Ok(())
    }

    /// Record ids the remote now holds and ids it no longer holds
    ///
    /// Without a store identity nothing is confirmed, which only means a
    /// later pull re-uploads those rows instead of dropping them.
    async fn record_confirmed(&self, stored: &[String], removed: &[String]) -> Result<()> {
        if stored.is_empty() && removed.is_empty() {
            return Ok(());
        }
        let store_id = match self.connection.remote_store_id().await {
            Ok(store_id) => store_id,
            Err(e) => {
                debug!("Not confirming {} rows, remote identity unavailable: {}", T::TABLE, e);
                return Ok(());
            }
        };

        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        let mut confirmed = self.read_confirmed().await?;
        let before = confirmed.clone();
        for id in stored {
            confirmed.confirm(&store_id, id);
        }
        for id in removed {
            confirmed.forget(id);
        }
        if confirmed != before {
            self.write_confirmed(&confirmed).await?;
        }
        Ok(())
    }

    fn to_row(record: &T) -> Result<Value> {
        Ok(serde_json::to_value(record).map_err(StorageError::from)?)
    }

    fn parse_rows(rows: Vec<Value>) -> Vec<T> {
        rows.into_iter()
            .filter_map(|row| match serde_json::from_value::<T>(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Ignoring malformed remote {} row: {}", T::TABLE, e);
                    None
                }
            })
            .collect()
    }

    async fn remote_upsert(&self, row: Value) -> Result<Value, RemoteError> {
        let remote = self.connection.remote().clone();
        let user_id = self.connection.user_id().to_string();
        let operation = format!("upsert {}", T::TABLE);
        self.connection
            .retry_policy()
            .run(&operation, || {
                let remote = remote.clone();
                let user_id = user_id.clone();
                let row = row.clone();
                async move { remote.upsert(T::TABLE, &user_id, row).await }
            })
            .await
    }

    async fn remote_delete(&self, id: &str) -> Result<bool, RemoteError> {
        let remote = self.connection.remote().clone();
        let user_id = self.connection.user_id().to_string();
        let operation = format!("delete {}", T::TABLE);
        self.connection
            .retry_policy()
            .run(&operation, || {
                let remote = remote.clone();
                let user_id = user_id.clone();
                let id = id.to_string();
                async move { remote.delete(T::TABLE, &user_id, &id).await }
            })
            .await
    }

    async fn remote_select(&self) -> Result<Vec<Value>, RemoteError> {
        let remote = self.connection.remote().clone();
        let user_id = self.connection.user_id().to_string();
        let operation = format!("select {}", T::TABLE);
        self.connection
            .retry_policy()
            .run(&operation, || {
                let remote = remote.clone();
                let user_id = user_id.clone();
                async move { remote.select(T::TABLE, &user_id).await }
            })
            .await
    }

    /// Upsert then read back, so a silently dropped write is not reported as delivered
    async fn remote_upsert_verified(&self, row: Value, id: &str) -> Result<(), RemoteError> {
        self.remote_upsert(row).await?;
        let remote = self.connection.remote().clone();
        let user_id = self.connection.user_id().to_string();
        let stored = self
            .connection
            .retry_policy()
            .run("verify upsert", || {
                let remote = remote.clone();
                let user_id = user_id.clone();
                let id = id.to_string();
                async move { remote.select_one(T::TABLE, &user_id, &id).await }
            })
            .await?;
        match stored {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("{} {} missing after upsert", T::TABLE, id))),
        }
    }

    /// All records in the local cache
    pub async fn list(&self) -> Result<Vec<T>> {
        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        self.read_local().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        let canonical = coerce_uuid(id);
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|record| record.id() == id || record.id() == canonical))
    }

    /// Write a record locally and remotely
    ///
    /// The id is coerced to UUID form and `updated_at` is stamped. A remote
    /// failure does not fail the call; the record is queued as a pending upsert.
    pub async fn save(&self, mut record: T) -> Result<T> {
        let now = Utc::now();
        record.set_id(coerce_uuid(record.id()));
        if record.created_at() == DateTime::<Utc>::default() {
            record.set_created_at(now);
        }
        record.set_updated_at(now);

        {
            let lock = self.connection.table_lock(T::TABLE);
            let _guard = lock.lock().await;
            let mut records = self.read_local().await?;
            match records.iter_mut().find(|existing| existing.id() == record.id()) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            self.write_local(&records).await?;
        }
        self.connection
            .events()
            .publish(T::TABLE, ChangeKind::Saved, Some(record.id()));

        let id = record.id().to_string();
        match self.remote_upsert(Self::to_row(&record)?).await {
            Ok(_) => {
                self.update_pending(|pending| {
                    pending.clear(&id);
                })
                .await?;
                self.record_confirmed(&[id], &[]).await?;
            }
            Err(e) => {
                warn!("{} {} saved locally but not remotely: {}", T::TABLE, id, e);
                self.update_pending(|pending| pending.mark_upsert(&id)).await?;
            }
        }

        Ok(record)
    }

    /// Remove a record locally and remotely; returns whether it existed locally
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let canonical = coerce_uuid(id);
        let removed_id = {
            let lock = self.connection.table_lock(T::TABLE);
            let _guard = lock.lock().await;
            let mut records = self.read_local().await?;
            let position = records
                .iter()
                .position(|record| record.id() == id || record.id() == canonical);
            match position {
                Some(index) => {
                    let removed = records.remove(index);
                    self.write_local(&records).await?;
                    removed.id().to_string()
                }
                None => return Ok(false),
            }
        };
        self.connection
            .events()
            .publish(T::TABLE, ChangeKind::Deleted, Some(&removed_id));

        match self.remote_delete(&removed_id).await {
            Ok(_) => {
                self.update_pending(|pending| {
                    pending.clear(&removed_id);
                })
                .await?;
                self.record_confirmed(&[], &[removed_id]).await?;
            }
            Err(e) => {
                warn!("{} {} deleted locally but not remotely: {}", T::TABLE, removed_id, e);
                self.update_pending(|pending| pending.mark_delete(&removed_id)).await?;
            }
        }

        Ok(true)
    }

    pub async fn pending_changes(&self) -> Result<PendingChanges> {
        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        self.read_pending().await
    }

    /// Deliver pending upserts (verified) and pending deletes
    pub async fn push(&self) -> Result<PushOutcome> {
        let pending = self.pending_changes().await?;
        if pending.is_empty() {
            return Ok(PushOutcome::default());
        }

        let records = self.list().await?;
        let mut delivered = Vec::new();
        let mut stored = Vec::new();
        let mut removed = Vec::new();
        let mut outcome = PushOutcome::default();

        for id in &pending.upserts {
            let Some(record) = records.iter().find(|record| record.id() == id) else {
                // Deleted locally since; nothing left to send
                delivered.push(id.clone());
                continue;
            };
            match self.remote_upsert_verified(Self::to_row(record)?, id).await {
                Ok(()) => {
                    outcome.pushed += 1;
                    delivered.push(id.clone());
                    stored.push(id.clone());
                }
                Err(e) => warn!("Pending {} upsert {} still failing: {}", T::TABLE, id, e),
            }
        }

        for id in &pending.deletes {
            match self.remote_delete(id).await {
                Ok(_) => {
                    outcome.remote_deleted += 1;
                    delivered.push(id.clone());
                    removed.push(id.clone());
                }
                Err(e) => warn!("Pending {} delete {} still failing: {}", T::TABLE, id, e),
            }
        }
        self.record_confirmed(&stored, &removed).await?;

        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        let mut current = self.read_pending().await?;
        for id in &delivered {
            // Only clear what this push delivered; newer marks stay queued
            if pending.is_upsert_pending(id) && current.is_upsert_pending(id) {
                current.upserts.remove(id);
            }
            if pending.is_delete_pending(id) && current.is_delete_pending(id) {
                current.deletes.remove(id);
            }
        }
        self.write_pending(&current).await?;
        outcome.pending = current.len();

        info!(
            "Pushed {}: {} upserted, {} deleted, {} still pending",
            T::TABLE,
            outcome.pushed,
            outcome.remote_deleted,
            outcome.pending
        );
        Ok(outcome)
    }

    /// Merge remote rows into the local cache
    ///
    /// Local records the current remote store never held are kept and
    /// queued as pending upserts, so a recreated or empty remote is refilled
    /// by the next push rather than emptying the local cache.
    pub async fn pull(&self) -> Result<PullOutcome> {
        let store_id = self.connection.identify_remote().await?;
        let remote_records = Self::parse_rows(self.remote_select().await?);
        let remote_ids: Vec<String> = remote_records.iter().map(|record| record.id().to_string()).collect();

        let outcome = {
            let lock = self.connection.table_lock(T::TABLE);
            let _guard = lock.lock().await;
            let local_records = self.read_local().await?;
            let mut pending = self.read_pending().await?;
            let confirmed = self.read_confirmed().await?;
            let merged = reconcile(local_records, remote_records, &pending, &confirmed, &store_id);
            self.write_local(&merged.records).await?;
            if !merged.requeued.is_empty() {
                for id in &merged.requeued {
                    pending.mark_upsert(id);
                }
                self.write_pending(&pending).await?;
            }
            self.write_confirmed(&ConfirmedIds::for_store(&store_id, remote_ids))
                .await?;
            PullOutcome {
                pulled: merged.pulled,
                removed_locally: merged.removed_locally,
                requeued: merged.requeued.len(),
            }
        };
        self.connection
            .events()
            .publish(T::TABLE, ChangeKind::Reloaded, None);

        info!(
            "Pulled {}: {} updated from remote, {} removed locally, {} queued for upload",
            T::TABLE,
            outcome.pulled,
            outcome.removed_locally,
            outcome.requeued
        );
        Ok(outcome)
    }

    /// Replace the local cache with the remote rows, discarding pending changes
    pub async fn force_reload(&self) -> Result<usize> {
        let store_id = self.connection.identify_remote().await?;
        let remote_records = Self::parse_rows(self.remote_select().await?);
        let count = remote_records.len();
        let remote_ids = remote_records.iter().map(|record| record.id().to_string());
        let confirmed = ConfirmedIds::for_store(&store_id, remote_ids);
        {
            let lock = self.connection.table_lock(T::TABLE);
            let _guard = lock.lock().await;
            self.write_local(&remote_records).await?;
            self.write_pending(&PendingChanges::default()).await?;
            self.write_confirmed(&confirmed).await?;
        }
        self.connection
            .events()
            .publish(T::TABLE, ChangeKind::Reloaded, None);
        info!("Reloaded {} {} records from remote", count, T::TABLE);
        Ok(count)
    }

    /// Upsert every local record, queueing failures as pending
    pub async fn upload_all(&self) -> Result<PushOutcome> {
        let records = self.list().await?;
        let mut outcome = PushOutcome::default();
        let mut failed = Vec::new();
        let mut delivered = Vec::new();

        for record in &records {
            let id = record.id().to_string();
            match self.remote_upsert_verified(Self::to_row(record)?, &id).await {
                Ok(()) => {
                    outcome.pushed += 1;
                    delivered.push(id);
                }
                Err(e) => {
                    warn!("Uploading {} {} failed: {}", T::TABLE, id, e);
                    failed.push(id);
                }
            }
        }
        self.record_confirmed(&delivered, &[]).await?;

        let lock = self.connection.table_lock(T::TABLE);
        let _guard = lock.lock().await;
        let mut pending = self.read_pending().await?;
        for id in &delivered {
            pending.upserts.remove(id);
        }
        for id in &failed {
            pending.mark_upsert(id);
        }
        self.write_pending(&pending).await?;
        outcome.pending = pending.len();
        Ok(outcome)
    }
}
