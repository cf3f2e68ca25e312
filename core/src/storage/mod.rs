//! # Storage Module
//!
//! Persistence for the wealth tracker: an on-device key-value cache mirrored
//! to a per-user remote table backend.
//!
//! ## Key Responsibilities
//!
//! - **Local cache**: every collection lives as a JSON array under a fixed key
//!   of a [`LocalStore`], so the app works offline
//! - **Remote tables**: rows are written through a [`RemoteStore`] scoped to
//!   the signed-in user
//! - **Reconciliation**: failed remote writes are queued in a pending ledger
//!   and delivered by `push`; `pull` merges remote changes back with
//!   last-write-wins on `updated_at`
//! - **Change notification**: writes are published on an [`EventBus`]
//!
//! ## Layout
//!
//! - `local`: file-backed and in-memory key-value stores
//! - `remote`: the HTTP table client and an in-memory backend
//! - `repositories`: the generic [`RecordRepository`] shared by every collection
//! - `connection`: [`DataConnection`], the factory repositories are created from

pub mod connection;
pub mod error;
pub mod events;
pub mod local;
pub mod record;
pub mod remote;
pub mod repositories;
pub mod retry;
pub mod table;
pub mod traits;

#[cfg(test)]
pub mod test_utils;

pub use connection::DataConnection;
pub use error::{RemoteError, StorageError};
pub use events::{ChangeKind, DataEvent, EventBus};
pub use record::{coerce_uuid, Record};
pub use repositories::{
    AssetRepository, CategoryRepository, LiabilityRepository, PendingChanges, PullOutcome, PushOutcome,
    RecordRepository, TransactionRepository,
};
pub use retry::RetryPolicy;
pub use table::Table;
pub use traits::{LocalStore, RemoteStore};
