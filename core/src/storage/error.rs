//! Error types for the storage seams.

use thiserror::Error;

/// Failures of the local key-value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize or parse stored data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored value under key '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failures reported by the remote table backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authorized: {0}")]
    Auth(String),

    #[error("rejected by remote: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("remote server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Errors worth retrying: the same request may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server { .. })
    }

    /// Map an HTTP status code and body to an error kind
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::Auth(message),
            404 => RemoteError::NotFound(message),
            409 => RemoteError::Conflict(message),
            400 | 422 => RemoteError::Validation(message),
            _ => RemoteError::Server { status, message },
        }
    }

    /// HTTP status code this error is reported with by the table API
    pub fn status_code(&self) -> u16 {
        match self {
            RemoteError::Network(_) => 503,
            RemoteError::Auth(_) => 401,
            RemoteError::Validation(_) => 400,
            RemoteError::NotFound(_) => 404,
            RemoteError::Conflict(_) => 409,
            RemoteError::Server { status, .. } => *status,
            RemoteError::Decode(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_and_server_errors_are_transient() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::from_status(503, "unavailable").is_transient());
        assert!(!RemoteError::from_status(401, "expired token").is_transient());
        assert!(!RemoteError::from_status(400, "bad row").is_transient());
        assert!(!RemoteError::from_status(409, "duplicate").is_transient());
        assert!(!RemoteError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_status_round_trip_for_client_errors() {
        for status in [401, 404, 409, 400] {
            assert_eq!(RemoteError::from_status(status, "x").status_code(), status);
        }
    }
}
