//! Error types for reactive stores.

use crate::types::StoreId;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Invalid patch argument: {0}")]
    InvalidPatchArgument(String),

    #[error("Invalid state for store {store_id}: expected an object, got {found}")]
    InvalidState { store_id: StoreId, found: String },

    #[error("Subscriber callback failed on store {store_id}: {message}")]
    SubscriberCallback { store_id: StoreId, message: String },

    #[error("Flush limit of {limit} jobs exceeded; remaining jobs stay queued")]
    FlushLimitExceeded { limit: usize },

    #[error("Registry has been disposed")]
    RegistryDisposed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Short name for a JSON value kind, used in error messages.
pub(crate) fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
