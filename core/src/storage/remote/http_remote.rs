use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, Response, StatusCode};
use log::{debug, warn};
use serde_json::Value;
use tower::{BoxError, Service, ServiceExt};

use crate::storage::error::RemoteError;
use crate::storage::table::Table;
use crate::storage::traits::RemoteStore;

const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Client for the `/rest/v1` table API
///
/// The transport is any `tower::Service` that turns HTTP requests into HTTP
/// responses, so the same client talks to a remote deployment through an
/// HTTP connector or to an in-process [`axum::Router`].
#[derive(Clone)]
pub struct HttpRemoteStore<S> {
    service: S,
    base_path: String,
    api_key: Option<String>,
}

impl<S> HttpRemoteStore<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
{
    pub fn new(service: S, base_path: impl Into<String>) -> Self {
        Self {
            service,
            base_path: base_path.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn table_uri(&self, table: Table, user_id: &str) -> String {
        format!(
            "{}/{}?user_id={}",
            self.base_path,
            table.name(),
            urlencoding::encode(user_id)
        )
    }

    fn row_uri(&self, table: Table, user_id: &str, id: &str) -> String {
        format!(
            "{}/{}/{}?user_id={}",
            self.base_path,
            table.name(),
            urlencoding::encode(id),
            urlencoding::encode(user_id)
        )
    }

    async fn send(&self, method: Method, uri: String, body: Option<&Value>) -> Result<(StatusCode, Bytes), RemoteError> {
        debug!("{} {}", method, uri);

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ACCEPT, "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key));
        }

        let request = match body {
            Some(value) => {
                let payload = serde_json::to_vec(value).map_err(|e| RemoteError::Validation(e.to_string()))?;
                builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload))
            }
            None => builder.body(Body::empty()),
        }
        .map_err(|e| RemoteError::Validation(e.to_string()))?;

        let response = self.service.clone().oneshot(request).await.map_err(|e| {
            let error: BoxError = e.into();
            RemoteError::Network(error.to_string())
        })?;

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok((status, bytes))
    }

    /// Turn a non-success response into the matching error kind
    fn error_from(status: StatusCode, body: &Bytes) -> RemoteError {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        warn!("Remote request failed with {}: {}", status, message);
        RemoteError::from_status(status.as_u16(), message)
    }

    fn decode<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, RemoteError> {
        serde_json::from_slice(body).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl<S> RemoteStore for HttpRemoteStore<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
{
    async fn store_id(&self) -> Result<String, RemoteError> {
        let (status, body) = self.send(Method::GET, self.base_path.clone(), None).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        let value: Value = Self::decode(&body)?;
        value
            .get("store_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Decode("response has no store_id".to_string()))
    }

    async fn select(&self, table: Table, user_id: &str) -> Result<Vec<Value>, RemoteError> {
        let (status, body) = self.send(Method::GET, self.table_uri(table, user_id), None).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Self::decode(&body)
    }

    async fn select_one(&self, table: Table, user_id: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        let (status, body) = self.send(Method::GET, self.row_uri(table, user_id, id), None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Self::decode(&body).map(Some)
    }

    async fn insert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError> {
        let (status, body) = self.send(Method::POST, self.table_uri(table, user_id), Some(&row)).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Self::decode(&body)
    }

    async fn update(&self, table: Table, user_id: &str, id: &str, row: Value) -> Result<Value, RemoteError> {
        let (status, body) = self.send(Method::PATCH, self.row_uri(table, user_id, id), Some(&row)).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Self::decode(&body)
    }

    async fn upsert(&self, table: Table, user_id: &str, row: Value) -> Result<Value, RemoteError> {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Validation("row is missing an id".to_string()))?;
        let (status, body) = self.send(Method::PUT, self.row_uri(table, user_id, &id), Some(&row)).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Self::decode(&body)
    }

    async fn delete(&self, table: Table, user_id: &str, id: &str) -> Result<bool, RemoteError> {
        let (status, body) = self.send(Method::DELETE, self.row_uri(table, user_id, id), None).await?;
        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        let value: Value = Self::decode(&body)?;
        Ok(value.get("deleted").and_then(Value::as_bool).unwrap_or(false))
    }
}
