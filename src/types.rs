//! Core types shared across the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The state tree of a store: field name to JSON value.
pub type State = serde_json::Map<String, Value>;

/// Unique identifier for a store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub String);

impl StoreId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StoreId {
    fn from(s: &str) -> Self {
        StoreId(s.to_string())
    }
}

impl From<String> for StoreId {
    fn from(s: String) -> Self {
        StoreId(s)
    }
}

impl PartialEq<&str> for StoreId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// When a subscriber (or watcher) is notified relative to the mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Notify before the mutating call returns.
    Sync,
    /// Notify when the runtime's post-flush queue is drained.
    #[default]
    Post,
}

/// Kind of a single leaf change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Set,
    Delete,
}

/// One leaf-level difference between two versions of a state tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    /// Keys from the root to the changed value.
    pub path: Vec<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl StateChange {
    pub fn kind(&self) -> ChangeKind {
        match (&self.old_value, &self.new_value) {
            (None, _) => ChangeKind::Add,
            (Some(_), None) => ChangeKind::Delete,
            (Some(_), Some(_)) => ChangeKind::Set,
        }
    }

    /// Dotted form of the path, for logs.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}
