//! Records stored in both the local cache and a remote table.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Asset, Category, Liability, Transaction};
use uuid::Uuid;

use super::table::Table;

/// An entity with a UUID primary key and write timestamps
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn created_at(&self) -> DateTime<Utc>;
    fn set_created_at(&mut self, at: DateTime<Utc>);
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

macro_rules! impl_record {
    ($ty:ty, $table:expr) => {
        impl Record for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn set_created_at(&mut self, at: DateTime<Utc>) {
                self.created_at = at;
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }

            fn set_updated_at(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

impl_record!(Transaction, Table::Transactions);
impl_record!(Asset, Table::Assets);
impl_record!(Liability, Table::Liabilities);
impl_record!(Category, Table::Categories);

/// Coerce an id into canonical UUID form
///
/// Valid UUIDs are normalised to lowercase hyphenated form, empty ids get a
/// fresh v4, and legacy ids map to a v5 derived from their text so the same
/// legacy id always yields the same UUID.
pub fn coerce_uuid(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Uuid::new_v4().to_string();
    }
    match Uuid::parse_str(trimmed) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, trimmed.as_bytes()).to_string(),
    }
}
