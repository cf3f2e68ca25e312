//! # Domain Module
//!
//! Business rules of the wealth tracker, independent of how data is stored
//! or presented.
//!
//! ## Module Organization
//!
//! - **calendar**: month arithmetic with month-end clamping
//! - **ledger**: how transactions move asset balances, and how to undo it
//! - **transaction_service**: transaction CRUD and the posting lock
//! - **asset_service**, **liability_service**, **category_service**: entity CRUD
//!   and the value rules each entity keeps
//! - **recurring_payment_service**: liability schedules projected into repayments
//! - **recurring_transaction_service**: recurring templates materialized into transactions
//! - **summary_service**: net worth and monthly totals
//! - **export_service**: CSV export
//! - **sync_service**: reconciliation of every collection with the remote
//!
//! ## Business Rules
//!
//! - Amounts are positive; the transaction type gives the direction
//! - Asset values and liability balances never go below zero
//! - Cash and bank assets carry their current value as cost basis
//! - Every balance change is recorded on the transaction that caused it so
//!   it can be undone exactly

use thiserror::Error;

pub mod asset_service;
pub mod calendar;
pub mod category_service;
pub mod export_service;
pub mod ledger;
pub mod liability_service;
pub mod recurring_payment_service;
pub mod recurring_transaction_service;
pub mod summary_service;
pub mod sync_service;
pub mod transaction_service;

pub use asset_service::AssetService;
pub use category_service::CategoryService;
pub use export_service::ExportService;
pub use liability_service::LiabilityService;
pub use recurring_payment_service::RecurringPaymentService;
pub use recurring_transaction_service::RecurringTransactionService;
pub use summary_service::SummaryService;
pub use sync_service::SyncService;
pub use transaction_service::TransactionService;

/// A guarded job was started while another run of it was still in progress
#[derive(Debug, Error)]
#[error("{0} is already running")]
pub struct AlreadyRunning(pub &'static str);
