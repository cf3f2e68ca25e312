//! # REST API for the Wealth Tracker Domain
//!
//! Endpoints for transactions, the entity lists, payment processing,
//! recurring templates, summaries, export and sync.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{Datelike, Local, NaiveDate};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::AlreadyRunning;
use crate::AppState;
use shared::{
    CreateTransactionRequest, DeleteTransactionsRequest, MonthlySummary, NetWorthSummary, TransactionListRequest,
    TransactionType, UpdateTransactionRequest,
};

/// Query parameters for transaction listing API
#[derive(Debug, Default, Deserialize)]
pub struct TransactionListQuery {
    pub after: Option<String>,
    pub limit: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// Optional run date for the scheduled jobs; defaults to today
#[derive(Debug, Default, Deserialize)]
pub struct RunDateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub net_worth: NetWorthSummary,
    pub monthly: MonthlySummary,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Map a domain error to a response; concurrent job runs become 409
fn failure(context: &str, status: StatusCode, e: anyhow::Error) -> Response {
    error!("{}: {}", context, e);
    let status = if e.downcast_ref::<AlreadyRunning>().is_some() {
        StatusCode::CONFLICT
    } else {
        status
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// List transactions with optional filtering and pagination
pub async fn list_transactions(State(state): State<AppState>, Query(query): Query<TransactionListQuery>) -> Response {
    info!("GET /api/transactions - query: {:?}", query);

    let request = TransactionListRequest {
        after: query.after,
        limit: query.limit,
        start_date: query.start_date,
        end_date: query.end_date,
        category: query.category,
        transaction_type: query.transaction_type,
    };

    match state.transaction_service.list_transactions(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => failure("Failed to list transactions", StatusCode::BAD_REQUEST, e),
    }
}

/// Create a new transaction
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Response {
    info!("POST /api/transactions - request: {:?}", request);

    match state.transaction_service.create_transaction(request).await {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(e) => failure("Failed to create transaction", StatusCode::BAD_REQUEST, e),
    }
}

/// Delete multiple transactions
pub async fn delete_transactions(
    State(state): State<AppState>,
    Json(request): Json<DeleteTransactionsRequest>,
) -> Response {
    info!("DELETE /api/transactions - request: {:?}", request);

    match state.transaction_service.delete_transactions(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => failure("Failed to delete transactions", StatusCode::BAD_REQUEST, e),
    }
}

pub async fn get_transaction(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.transaction_service.get_transaction(&id).await {
        Ok(Some(transaction)) => (StatusCode::OK, Json(transaction)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("Transaction {} not found", id) }))).into_response(),
        Err(e) => failure("Failed to load transaction", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Response {
    info!("PUT /api/transactions/{} - request: {:?}", id, request);

    match state.transaction_service.update_transaction(&id, request).await {
        Ok(transaction) => (StatusCode::OK, Json(transaction)).into_response(),
        Err(e) => failure("Failed to update transaction", StatusCode::BAD_REQUEST, e),
    }
}

pub async fn delete_transaction(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    info!("DELETE /api/transactions/{}", id);

    match state.transaction_service.delete_transaction(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("Transaction {} not found", id) }))).into_response(),
        Err(e) => failure("Failed to delete transaction", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_assets(State(state): State<AppState>) -> Response {
    match state.asset_service.list_assets().await {
        Ok(assets) => (StatusCode::OK, Json(assets)).into_response(),
        Err(e) => failure("Failed to list assets", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_liabilities(State(state): State<AppState>) -> Response {
    match state.liability_service.list_liabilities().await {
        Ok(liabilities) => (StatusCode::OK, Json(liabilities)).into_response(),
        Err(e) => failure("Failed to list liabilities", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_categories(State(state): State<AppState>) -> Response {
    match state.category_service.list_categories().await {
        Ok(categories) => (StatusCode::OK, Json(categories)).into_response(),
        Err(e) => failure("Failed to list categories", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Run the liability payment schedule
pub async fn process_payments(State(state): State<AppState>, Query(query): Query<RunDateQuery>) -> Response {
    let date = query.date.unwrap_or_else(today);
    info!("POST /api/payments/process - date: {}", date);

    match state.recurring_payment_service.process_due_payments(date).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => failure("Failed to process payments", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Materialize recurring transaction templates
pub async fn materialize_recurring(State(state): State<AppState>, Query(query): Query<RunDateQuery>) -> Response {
    let date = query.date.unwrap_or_else(today);
    info!("POST /api/recurring/materialize - date: {}", date);

    match state.recurring_transaction_service.materialize_due(date).await {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(e) => failure("Failed to materialize recurring transactions", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Net worth plus the totals of one month (the current one by default)
pub async fn get_summary(State(state): State<AppState>, Query(query): Query<SummaryQuery>) -> Response {
    let now = today();
    let year = query.year.unwrap_or_else(|| now.year());
    let month = query.month.unwrap_or_else(|| now.month());

    let result = async {
        let net_worth = state.summary_service.net_worth().await?;
        let monthly = state.summary_service.monthly_summary(year, month).await?;
        Ok::<_, anyhow::Error>(SummaryResponse { net_worth, monthly })
    }
    .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => failure("Failed to build summary", StatusCode::BAD_REQUEST, e),
    }
}

pub async fn export_transactions(State(state): State<AppState>) -> Response {
    info!("GET /api/export");
    match state.export_service.export_transactions_csv().await {
        Ok(export) => (StatusCode::OK, Json(export)).into_response(),
        Err(e) => failure("Failed to export transactions", StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn sync_all(State(state): State<AppState>) -> Response {
    info!("POST /api/sync");
    match state.sync_service.sync_all().await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(e) => failure("Sync failed", StatusCode::BAD_GATEWAY, e),
    }
}

pub async fn force_reload(State(state): State<AppState>) -> Response {
    info!("POST /api/sync/reload");
    match state.sync_service.force_reload().await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(e) => failure("Reload failed", StatusCode::BAD_GATEWAY, e),
    }
}

pub async fn manual_upload(State(state): State<AppState>) -> Response {
    info!("POST /api/sync/upload");
    match state.sync_service.manual_upload().await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(e) => failure("Upload failed", StatusCode::BAD_GATEWAY, e),
    }
}
