//! # Wealth Tracker Core
//!
//! The data layer of the wealth tracker: transactions, assets, liabilities,
//! categories and recurring payments, cached locally and mirrored to a
//! per-user remote table backend.
//!
//! ## Architecture
//!
//! ```text
//! IO Layer (REST API: /api domain routes, /rest/v1 table API)
//!     ↓
//! Domain Layer (services, ledger posting, payment schedules)
//!     ↓
//! Storage Layer (local key-value cache, remote tables, reconciliation)
//! ```

pub mod config;
pub mod domain;
pub mod io;
pub mod storage;

use anyhow::Result;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use log::info;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::domain::{
    AssetService, CategoryService, ExportService, LiabilityService, RecurringPaymentService,
    RecurringTransactionService, SummaryService, SyncService, TransactionService,
};
use crate::storage::local::FileStore;
use crate::storage::remote::{HttpRemoteStore, MemoryRemoteStore};
use crate::storage::{DataConnection, RemoteStore};

/// Base path of the table API, shared by the server routes and the client
pub const TABLE_API_BASE: &str = "/rest/v1";

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub connection: DataConnection,
    pub transaction_service: TransactionService,
    pub asset_service: AssetService,
    pub liability_service: LiabilityService,
    pub category_service: CategoryService,
    pub recurring_payment_service: RecurringPaymentService,
    pub recurring_transaction_service: RecurringTransactionService,
    pub summary_service: SummaryService,
    pub export_service: ExportService,
    pub sync_service: SyncService,
    /// Backend served by the table API
    pub table_backend: Arc<dyn RemoteStore>,
    pub api_key: Option<String>,
}

impl AppState {
    /// Wire every service onto one connection
    pub fn new(connection: DataConnection, table_backend: Arc<dyn RemoteStore>, api_key: Option<String>) -> Self {
        let category_service = CategoryService::new(&connection);
        let transaction_service = TransactionService::new(&connection, category_service.clone());
        let recurring_payment_service =
            RecurringPaymentService::new(&connection, transaction_service.clone(), category_service.clone());
        let recurring_transaction_service = RecurringTransactionService::new(transaction_service.clone());
        let summary_service = SummaryService::new(&connection, transaction_service.clone());
        let export_service = ExportService::new(transaction_service.clone());

        Self {
            asset_service: AssetService::new(&connection),
            liability_service: LiabilityService::new(&connection),
            sync_service: SyncService::new(&connection),
            category_service,
            transaction_service,
            recurring_payment_service,
            recurring_transaction_service,
            summary_service,
            export_service,
            connection,
            table_backend,
            api_key,
        }
    }
}

/// Initialize the backend with all required services
///
/// The remote tables are served in-process by the table API and persisted
/// under the data directory; the data layer reaches them through
/// [`HttpRemoteStore`] exactly as it would a hosted backend.
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    info!("Setting up local store in {}", config.local_store_directory().display());
    let local = Arc::new(FileStore::new(config.local_store_directory())?);

    info!("Setting up remote tables in {}", config.remote_snapshot_path().display());
    let table_backend: Arc<dyn RemoteStore> = Arc::new(MemoryRemoteStore::open(config.remote_snapshot_path())?);
    let table_api = io::rest::table_apis::router(table_backend.clone(), config.remote.api_key.clone());
    let mut remote = HttpRemoteStore::new(table_api, TABLE_API_BASE);
    if let Some(api_key) = &config.remote.api_key {
        remote = remote.with_api_key(api_key.clone());
    }

    let connection = DataConnection::new(local, Arc::new(remote), config.user_id.clone())
        .with_retry_policy(config.retry.policy());

    info!("Setting up domain services for user {}", config.user_id);
    let state = AppState::new(connection, table_backend, config.remote.api_key.clone());
    state.category_service.ensure_defaults().await?;
    Ok(state)
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:8080"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/transactions",
            get(io::list_transactions)
                .post(io::create_transaction)
                .delete(io::delete_transactions),
        )
        .route(
            "/transactions/:id",
            get(io::get_transaction)
                .put(io::update_transaction)
                .delete(io::delete_transaction),
        )
        .route("/assets", get(io::list_assets))
        .route("/liabilities", get(io::list_liabilities))
        .route("/categories", get(io::list_categories))
        .route("/payments/process", post(io::process_payments))
        .route("/recurring/materialize", post(io::materialize_recurring))
        .route("/summary", get(io::get_summary))
        .route("/export", get(io::export_transactions))
        .route("/sync", post(io::sync_all))
        .route("/sync/reload", post(io::force_reload))
        .route("/sync/upload", post(io::manual_upload));

    let table_api = io::rest::table_apis::router(app_state.table_backend.clone(), app_state.api_key.clone());

    Router::new()
        .nest("/api", api_routes.with_state(app_state))
        .merge(table_api)
        .layer(cors)
}
