//! # REST API for Remote Tables
//!
//! A PostgREST-style table API over any [`RemoteStore`]. Every request is
//! scoped by the `user_id` query parameter, and a bearer token is required
//! when an API key is configured.
//!
//! - `GET /rest/v1` answers `{"store_id": ...}`, the backend's identity
//! - `GET /rest/v1/:table?user_id=` lists rows
//! - `POST /rest/v1/:table?user_id=` inserts a row (409 if it exists)
//! - `GET /rest/v1/:table/:id?user_id=` fetches one row
//! - `PUT /rest/v1/:table/:id?user_id=` upserts
//! - `PATCH /rest/v1/:table/:id?user_id=` updates (404 if missing)
//! - `DELETE /rest/v1/:table/:id?user_id=` deletes, answering `{"deleted": bool}`

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::storage::{RemoteError, RemoteStore, Table};

#[derive(Clone)]
pub struct TableApiState {
    backend: Arc<dyn RemoteStore>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

pub fn router(backend: Arc<dyn RemoteStore>, api_key: Option<String>) -> Router {
    Router::new()
        .route("/rest/v1", get(store_info))
        .route("/rest/v1/:table", get(select_rows).post(insert_row))
        .route(
            "/rest/v1/:table/:id",
            get(select_row).put(upsert_row).patch(update_row).delete(delete_row),
        )
        .with_state(TableApiState { backend, api_key })
}

fn error_response(error: RemoteError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Table API error: {}", error);
    }
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

fn authorize(state: &TableApiState, headers: &HeaderMap) -> Result<(), RemoteError> {
    let Some(api_key) = &state.api_key else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if presented == Some(api_key.as_str()) {
        Ok(())
    } else {
        Err(RemoteError::Auth("missing or invalid API key".to_string()))
    }
}

fn parse_table(name: &str) -> Result<Table, RemoteError> {
    name.parse::<Table>().map_err(RemoteError::NotFound)
}

/// Run a table operation after authorization and table lookup
async fn respond<F, Fut>(state: &TableApiState, headers: &HeaderMap, table: &str, success: StatusCode, call: F) -> Response
where
    F: FnOnce(Arc<dyn RemoteStore>, Table) -> Fut,
    Fut: std::future::Future<Output = Result<Value, RemoteError>>,
{
    let result = async {
        authorize(state, headers)?;
        let table = parse_table(table)?;
        call(state.backend.clone(), table).await
    }
    .await;

    match result {
        Ok(value) => (success, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn store_info(State(state): State<TableApiState>, headers: HeaderMap) -> Response {
    let result = async {
        authorize(&state, &headers)?;
        state.backend.store_id().await
    }
    .await;

    match result {
        Ok(store_id) => (StatusCode::OK, Json(json!({ "store_id": store_id }))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn select_rows(
    State(state): State<TableApiState>,
    Path(table): Path<String>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
) -> Response {
    respond(&state, &headers, &table, StatusCode::OK, |backend, table| async move {
        backend.select(table, &query.user_id).await.map(Value::Array)
    })
    .await
}

pub async fn insert_row(
    State(state): State<TableApiState>,
    Path(table): Path<String>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> Response {
    info!("POST /rest/v1/{} for {}", table, query.user_id);
    respond(&state, &headers, &table, StatusCode::CREATED, |backend, table| async move {
        backend.insert(table, &query.user_id, row).await
    })
    .await
}

pub async fn select_row(
    State(state): State<TableApiState>,
    Path((table, id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
) -> Response {
    respond(&state, &headers, &table, StatusCode::OK, |backend, table| async move {
        backend
            .select_one(table, &query.user_id, &id)
            .await?
            .ok_or_else(|| RemoteError::NotFound(format!("{} row {}", table, id)))
    })
    .await
}

/// Put the path id into the row, rejecting a body that names a different id
fn row_with_id(mut row: Value, id: &str) -> Result<Value, RemoteError> {
    let object = row
        .as_object_mut()
        .ok_or_else(|| RemoteError::Validation("row must be a JSON object".to_string()))?;
    match object.get("id").and_then(Value::as_str) {
        Some(body_id) if body_id != id => {
            return Err(RemoteError::Validation(format!("row id {} does not match {}", body_id, id)));
        }
        Some(_) => {}
        None => {
            object.insert("id".to_string(), Value::String(id.to_string()));
        }
    }
    Ok(row)
}

pub async fn upsert_row(
    State(state): State<TableApiState>,
    Path((table, id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> Response {
    info!("PUT /rest/v1/{}/{} for {}", table, id, query.user_id);
    respond(&state, &headers, &table, StatusCode::OK, |backend, table| async move {
        backend.upsert(table, &query.user_id, row_with_id(row, &id)?).await
    })
    .await
}

pub async fn update_row(
    State(state): State<TableApiState>,
    Path((table, id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> Response {
    info!("PATCH /rest/v1/{}/{} for {}", table, id, query.user_id);
    respond(&state, &headers, &table, StatusCode::OK, |backend, table| async move {
        backend.update(table, &query.user_id, &id, row_with_id(row, &id)?).await
    })
    .await
}

pub async fn delete_row(
    State(state): State<TableApiState>,
    Path((table, id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
) -> Response {
    info!("DELETE /rest/v1/{}/{} for {}", table, id, query.user_id);
    respond(&state, &headers, &table, StatusCode::OK, |backend, table| async move {
        let deleted = backend.delete(table, &query.user_id, &id).await?;
        Ok(json!({ "deleted": deleted }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::remote::{HttpRemoteStore, MemoryRemoteStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn backend() -> Arc<MemoryRemoteStore> {
        Arc::new(MemoryRemoteStore::new())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_list() {
        let app = router(backend(), None);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rest/v1/assets?user_id=alice")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"a1","name":"Wallet"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["user_id"], "alice");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rest/v1/assets?user_id=alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_and_row_are_not_found() {
        let app = router(backend(), None);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/rest/v1/ledger?user_id=alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/rest/v1/assets/nope?user_id=alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_api_key_is_enforced() {
        let app = router(backend(), Some("secret".to_string()));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/rest/v1/assets?user_id=alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rest/v1/assets?user_id=alice")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_http_client_round_trip() {
        let store = backend();
        let client = HttpRemoteStore::new(router(store.clone(), Some("secret".to_string())), "/rest/v1/")
            .with_api_key("secret");

        client
            .insert(Table::Categories, "bob", json!({ "id": "c1", "name": "Food" }))
            .await
            .unwrap();
        let conflict = client
            .insert(Table::Categories, "bob", json!({ "id": "c1", "name": "Food" }))
            .await;
        assert!(matches!(conflict, Err(RemoteError::Conflict(_))));

        client
            .upsert(Table::Categories, "bob", json!({ "id": "c2", "name": "Travel" }))
            .await
            .unwrap();
        let updated = client
            .update(Table::Categories, "bob", "c2", json!({ "id": "c2", "name": "Trips" }))
            .await
            .unwrap();
        assert_eq!(updated["name"], "Trips");
        let missing = client
            .update(Table::Categories, "bob", "c9", json!({ "id": "c9", "name": "Nope" }))
            .await;
        assert!(matches!(missing, Err(RemoteError::NotFound(_))));

        assert_eq!(client.select(Table::Categories, "bob").await.unwrap().len(), 2);
        assert!(client.select(Table::Categories, "eve").await.unwrap().is_empty());
        assert!(client.select_one(Table::Categories, "bob", "c9").await.unwrap().is_none());

        assert!(client.delete(Table::Categories, "bob", "c1").await.unwrap());
        assert!(!client.delete(Table::Categories, "bob", "c1").await.unwrap());
        assert_eq!(store.row_count(Table::Categories, "bob").await, 1);

        assert_eq!(client.store_id().await.unwrap(), store.id());
    }

    #[tokio::test]
    async fn test_store_identity_requires_api_key() {
        let app = router(backend(), Some("secret".to_string()));
        let response = app
            .oneshot(Request::builder().uri("/rest/v1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_http_client_maps_auth_errors() {
        let client = HttpRemoteStore::new(router(backend(), Some("secret".to_string())), "/rest/v1")
            .with_api_key("wrong");

        let result = client.select(Table::Assets, "bob").await;
        assert!(matches!(result, Err(RemoteError::Auth(_))));
        assert!(!result.unwrap_err().is_transient());
    }
}
