use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote tables, each mirrored locally under a fixed key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Transactions,
    Assets,
    Liabilities,
    Categories,
    Profiles,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Transactions,
        Table::Assets,
        Table::Liabilities,
        Table::Categories,
        Table::Profiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Transactions => "transactions",
            Table::Assets => "assets",
            Table::Liabilities => "liabilities",
            Table::Categories => "categories",
            Table::Profiles => "profiles",
        }
    }

    /// Key of the JSON array holding this collection in the local store
    pub fn local_key(&self) -> String {
        format!("wealth_tracker_{}", self.name())
    }

    /// Key of the pending-change ledger for this collection
    pub fn pending_key(&self) -> String {
        format!("{}:pending", self.local_key())
    }

    /// Key of the ids the current remote store is known to hold
    pub fn confirmed_key(&self) -> String {
        format!("{}:confirmed", self.local_key())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|table| table.name() == s)
            .ok_or_else(|| format!("Unknown table '{}'", s))
    }
}
