//! Reconciliation of every collection with the remote backend.

use anyhow::Result;
use log::{error, info};
use shared::SyncReport;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::AlreadyRunning;
use crate::storage::{
    AssetRepository, CategoryRepository, DataConnection, LiabilityRepository, PullOutcome, PushOutcome, Record,
    RecordRepository, TransactionRepository,
};

#[derive(Clone)]
pub struct SyncService {
    transactions: TransactionRepository,
    assets: AssetRepository,
    liabilities: LiabilityRepository,
    categories: CategoryRepository,
    run_guard: Arc<Mutex<()>>,
}

fn report<T: Record>(push: PushOutcome, pull: PullOutcome) -> SyncReport {
    SyncReport {
        table: T::TABLE.name().to_string(),
        pushed: push.pushed,
        remote_deleted: push.remote_deleted,
        pulled: pull.pulled,
        removed_locally: pull.removed_locally,
        requeued: pull.requeued,
        pending: push.pending,
    }
}

async fn sync_table<T: Record>(repository: &RecordRepository<T>) -> Result<SyncReport> {
    let mut push = repository.push().await?;
    let pull = repository.pull().await?;
    if pull.requeued > 0 {
        let again = repository.push().await?;
        push.pushed += again.pushed;
        push.remote_deleted += again.remote_deleted;
    }
    let pending = repository.pending_changes().await?.len();
    Ok(SyncReport {
        pending,
        ..report::<T>(push, pull)
    })
}

async fn reload_table<T: Record>(repository: &RecordRepository<T>) -> Result<SyncReport> {
    let pulled = repository.force_reload().await?;
    Ok(report::<T>(
        PushOutcome::default(),
        PullOutcome {
            pulled,
            ..PullOutcome::default()
        },
    ))
}

async fn upload_table<T: Record>(repository: &RecordRepository<T>) -> Result<SyncReport> {
    let push = repository.upload_all().await?;
    Ok(report::<T>(push, PullOutcome::default()))
}

impl SyncService {
    pub fn new(connection: &DataConnection) -> Self {
        Self {
            transactions: connection.create_transaction_repository(),
            assets: connection.create_asset_repository(),
            liabilities: connection.create_liability_repository(),
            categories: connection.create_category_repository(),
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Push pending local changes, then merge remote changes, for every collection
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        let _running = self.run_guard.try_lock().map_err(|_| AlreadyRunning("sync"))?;
        info!("Starting sync of all collections");

        let reports = vec![
            sync_table(&self.categories).await?,
            sync_table(&self.assets).await?,
            sync_table(&self.liabilities).await?,
            sync_table(&self.transactions).await?,
        ];

        let pending: usize = reports.iter().map(|r| r.pending).sum();
        if pending > 0 {
            error!("Sync finished with {} change(s) still pending", pending);
        } else {
            info!("Sync finished; local and remote are in step");
        }
        Ok(reports)
    }

    /// Replace every local collection with the remote copy, dropping pending changes
    pub async fn force_reload(&self) -> Result<Vec<SyncReport>> {
        let _running = self.run_guard.try_lock().map_err(|_| AlreadyRunning("sync"))?;
        info!("Reloading all collections from remote");
        Ok(vec![
            reload_table(&self.categories).await?,
            reload_table(&self.assets).await?,
            reload_table(&self.liabilities).await?,
            reload_table(&self.transactions).await?,
        ])
    }

    /// Upload every local record of every collection
    pub async fn manual_upload(&self) -> Result<Vec<SyncReport>> {
        let _running = self.run_guard.try_lock().map_err(|_| AlreadyRunning("sync"))?;
        info!("Uploading all local collections");
        Ok(vec![
            upload_table(&self.categories).await?,
            upload_table(&self.assets).await?,
            upload_table(&self.liabilities).await?,
            upload_table(&self.transactions).await?,
        ])
    }
}
