use shared::{Asset, Category, Liability, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::error::RemoteError;
use super::events::EventBus;
use super::repositories::RecordRepository;
use super::retry::RetryPolicy;
use super::table::Table;
use super::traits::{LocalStore, RemoteStore};

/// Shared handle to the local and remote stores of one signed-in user
///
/// Cloning is cheap; all clones share the same stores, table locks and
/// event bus, so repositories created from any clone stay coordinated.
#[derive(Clone)]
pub struct DataConnection {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    user_id: String,
    retry_policy: RetryPolicy,
    events: EventBus,
    table_locks: Arc<HashMap<Table, Arc<Mutex<()>>>>,
    update_locks: Arc<HashMap<Table, Arc<Mutex<()>>>>,
    remote_store_id: Arc<RwLock<Option<String>>>,
}

fn locks_per_table() -> HashMap<Table, Arc<Mutex<()>>> {
    Table::ALL
        .iter()
        .map(|table| (*table, Arc::new(Mutex::new(()))))
        .collect()
}

impl DataConnection {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>, user_id: impl Into<String>) -> Self {
        Self {
            local,
            remote,
            user_id: user_id.into(),
            retry_policy: RetryPolicy::default(),
            events: EventBus::default(),
            table_locks: Arc::new(locks_per_table()),
            update_locks: Arc::new(locks_per_table()),
            remote_store_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Lock guarding read-modify-write of one local collection
    pub fn table_lock(&self, table: Table) -> Arc<Mutex<()>> {
        self.table_locks
            .get(&table)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }

    /// Lock held by services across a read-then-write spanning several
    /// repository calls; never taken by the repositories themselves
    pub fn update_lock(&self, table: Table) -> Arc<Mutex<()>> {
        self.update_locks
            .get(&table)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())))
    }

    /// Identity of the remote store as last seen by this connection
    pub async fn remote_store_id(&self) -> Result<String, RemoteError> {
        if let Some(store_id) = self.remote_store_id.read().await.clone() {
            return Ok(store_id);
        }
        self.identify_remote().await
    }

    /// Ask the remote for its identity and remember the answer
    pub async fn identify_remote(&self) -> Result<String, RemoteError> {
        let remote = self.remote.clone();
        let store_id = self
            .retry_policy
            .run("identify remote store", || {
                let remote = remote.clone();
                async move { remote.store_id().await }
            })
            .await?;
        *self.remote_store_id.write().await = Some(store_id.clone());
        Ok(store_id)
    }

    pub fn create_transaction_repository(&self) -> RecordRepository<Transaction> {
        RecordRepository::new(self.clone())
    }

    pub fn create_asset_repository(&self) -> RecordRepository<Asset> {
        RecordRepository::new(self.clone())
    }

    pub fn create_liability_repository(&self) -> RecordRepository<Liability> {
        RecordRepository::new(self.clone())
    }

    pub fn create_category_repository(&self) -> RecordRepository<Category> {
        RecordRepository::new(self.clone())
    }
}
