//! # REST API Interface Layer
//!
//! - `ledger_apis`: handlers over [`crate::AppState`] mounted under `/api`
//! - `table_apis`: the remote table router mounted under `/rest/v1`

pub mod ledger_apis;
pub mod table_apis;

pub use ledger_apis::*;
