//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! local and remote backends to be used interchangeably in the domain layer.

use async_trait::async_trait;
use serde_json::Value;

use super::error::{RemoteError, StorageError};
use super::table::Table;

/// Trait defining the on-device key-value store
///
/// Values are opaque strings; collections are stored as JSON arrays under
/// fixed keys (see [`Table::local_key`]).
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value stored under `key`; removing a missing key is not an error
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Trait defining the hosted table backend
///
/// Every operation is scoped by `user_id` so that one user can never read or
/// write another user's rows. Rows are JSON objects keyed by their `id` field.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Identity of the backing store; it changes only when the store is recreated empty
    async fn store_id(&self) -> Result<String, RemoteError>;

    /// List all rows of `table` owned by `user_id`
    async fn select(&self, table: Table, user_id: &str) -> Result<Vec<Value>, RemoteError>;

    /// Fetch one row by id
    async fn select_one(&self, table: Table, user_id: &str, id: &str) -> Result<Option<Value>, RemoteError>;

    /// Insert a new row; fails with [`RemoteError::Conflict`] if the id exists
    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError>;

    /// Replace an existing row; fails with [`RemoteError::NotFound`] if absent
    async fn update(&self, table: Table, user_id: &str, id: &str, row: Value) -> Result<Value, RemoteError>;

    /// Insert or replace a row keyed by its id
    async fn upsert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError>;

    /// Delete a row; returns whether it existed
    async fn delete(&self, table: Table, user_id: &str, id: &str) -> Result<bool, RemoteError>;
}
