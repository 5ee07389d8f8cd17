//! Durable-store error type. Wraps `rusqlite::Error` in a `thiserror` enum
//! callers can match on alongside `fleet_core::FleetError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for fleet_core::FleetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => fleet_core::FleetError::Conflict(reason),
            other => fleet_core::FleetError::Transient(other.to_string()),
        }
    }
}
