use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ids whose remote write has not succeeded yet
///
/// An id is never in both sets: a later delete supersedes a pending upsert
/// and a later save supersedes a pending delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChanges {
    #[serde(default)]
    pub upserts: BTreeSet<String>,
    #[serde(default)]
    pub deletes: BTreeSet<String>,
}

impl PendingChanges {
    pub fn mark_upsert(&mut self, id: &str) {
        self.deletes.remove(id);
        self.upserts.insert(id.to_string());
    }

    pub fn mark_delete(&mut self, id: &str) {
        self.upserts.remove(id);
        self.deletes.insert(id.to_string());
    }

    /// Forget any pending change for `id`; returns whether one existed
    pub fn clear(&mut self, id: &str) -> bool {
        let had_upsert = self.upserts.remove(id);
        let had_delete = self.deletes.remove(id);
        had_upsert || had_delete
    }

    pub fn is_upsert_pending(&self, id: &str) -> bool {
        self.upserts.contains(id)
    }

    pub fn is_delete_pending(&self, id: &str) -> bool {
        self.deletes.contains(id)
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Ids known to exist on one particular remote store
///
/// A local row missing from the remote may only be treated as deleted there
/// if that same store had confirmed it. Confirmations from any other store
/// say nothing about the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedIds {
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub ids: BTreeSet<String>,
}

impl ConfirmedIds {
    pub fn for_store(store_id: &str, ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            store_id: Some(store_id.to_string()),
            ids: ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, store_id: &str, id: &str) -> bool {
        self.store_id.as_deref() == Some(store_id) && self.ids.contains(id)
    }

    /// Record that `store_id` holds `id`; confirmations from another store are dropped
    pub fn confirm(&mut self, store_id: &str, id: &str) {
        if self.store_id.as_deref() != Some(store_id) {
            *self = Self::for_store(store_id, []);
        }
        self.ids.insert(id.to_string());
    }

    pub fn forget(&mut self, id: &str) {
        self.ids.remove(id);
    }
}
