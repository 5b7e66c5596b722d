//! Document storage layer for the UniConnect synchronization services.
//!
//! This module models the remote document database the app talks to:
//! - Loosely typed documents (JSON field maps) grouped in named collections
//!   and subcollections
//! - Point reads, create-or-replace, store-assigned ids, merge updates, deletes
//! - Filtered/ordered/limited queries
//! - All-or-nothing write batches
//! - Live queries that re-emit the full result set after every change
//!
//! Services only see the [`DocumentStore`] trait; [`SledStore`] is the embedded
//! backend used by the binary and the tests.

mod listener;
mod query;
mod sled_store;

pub use listener::{ChangeEvent, ChangeFeed, ListenerGuard, ListenerRegistry, LiveQuery};
pub use query::{compare_values, Direction, Filter, OrderBy, Query};
pub use sled_store::SledStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Field map of a single document
pub type Fields = serde_json::Map<String, Value>;

/// Store handle shared between services
pub type SharedStore = Arc<dyn DocumentStore>;

/// Top-level collection names
pub mod collections {
    pub const USERS: &str = "users";
    pub const CHATS: &str = "individual_chats";
    pub const MESSAGES: &str = "messages";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const ACTIVITIES: &str = "activities";
    pub const PARTICIPANTS: &str = "participants";
    pub const QUESTIONS: &str = "questions";
    pub const RESPONSES: &str = "responses";

    /// Path of a subcollection nested under `parent/{id}`
    pub fn subcollection(parent: &str, id: &str, child: &str) -> String {
        format!("{}/{}/{}", parent, id, child)
    }
}

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Corruption detected in document: {0}")]
    Corruption(String),

    #[error("Storage initialization failed: {0}")]
    InitFailed(String),

    #[error("Listener closed: {0}")]
    ListenerClosed(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A document that could not be turned into a typed record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("document {doc} is missing field '{field}'")]
    MissingField { doc: String, field: &'static str },

    #[error("document {doc} has invalid field '{field}': {reason}")]
    InvalidField {
        doc: String,
        field: &'static str,
        reason: String,
    },
}

/// A stored document: its id within the collection plus its fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.fields.get(field).and_then(timestamp_from_value)
    }

    /// String list field; `None` when absent or not an array. Non-string
    /// entries are dropped.
    pub fn get_str_list(&self, field: &str) -> Option<Vec<String>> {
        self.fields.get(field).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    pub fn require_str(&self, field: &'static str) -> Result<&str, DecodeError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(self.invalid(field, format!("expected string, got {}", other))),
        }
    }

    pub fn require_timestamp(&self, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(value) => timestamp_from_value(value)
                .ok_or_else(|| self.invalid(field, format!("not a timestamp: {}", value))),
        }
    }

    pub fn missing(&self, field: &'static str) -> DecodeError {
        DecodeError::MissingField {
            doc: self.id.clone(),
            field,
        }
    }

    pub fn invalid(&self, field: &'static str, reason: impl Into<String>) -> DecodeError {
        DecodeError::InvalidField {
            doc: self.id.clone(),
            field,
            reason: reason.into(),
        }
    }
}

/// Timestamps are stored as integer microseconds since the Unix epoch so that
/// ordering queries compare them exactly.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::from(ts.timestamp_micros())
}

pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    value.as_i64().and_then(DateTime::<Utc>::from_timestamp_micros)
}

/// A single operation inside a [`WriteBatch`]
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

/// Group of writes committed all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn update(&mut self, collection: impl Into<String>, id: impl Into<String>, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct collections touched by this batch, in first-seen order
    pub fn collections(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for op in &self.ops {
            if !seen.iter().any(|c| c == op.collection()) {
                seen.push(op.collection().to_string());
            }
        }
        seen
    }
}

/// Client interface of the document database.
///
/// Every read and write is a suspension point. Live queries push snapshots on
/// the store's own schedule; see [`LiveQuery`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Create or replace a document under a caller-chosen id
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()>;

    /// Create a document under a store-assigned id
    async fn add(&self, collection: &str, fields: Fields) -> StorageResult<String>;

    /// Merge fields into an existing document. Fails with
    /// [`StorageError::NotFound`] when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()>;

    /// Run a one-shot query
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>>;

    /// Apply every operation of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Subscribe to a query's live result set
    fn listen(&self, query: Query) -> LiveQuery;
}

/// Configuration for the storage layer
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the Sled database directory
    pub path: String,
    /// Use a throwaway database that is removed on drop
    pub temporary: bool,
    /// Cache size in bytes (default: 64MB)
    pub cache_size: u64,
    /// Flush interval in milliseconds (0 = only on explicit flush)
    pub flush_interval_ms: u64,
    /// Snapshots buffered per live query before the listener waits on its consumer
    pub listener_buffer: usize,
    /// Capacity of the change feed shared by all listeners
    pub change_feed_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/uniconnect.sled".to_string(),
            temporary: false,
            cache_size: 64 * 1024 * 1024, // 64MB
            flush_interval_ms: 500,
            listener_buffer: 64,
            change_feed_capacity: 1024,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn temporary() -> Self {
        Self {
            temporary: true,
            flush_interval_ms: 0,
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_listener_buffer(mut self, buffer: usize) -> Self {
        self.listener_buffer = buffer.max(1);
        self
    }

    pub fn with_change_feed_capacity(mut self, capacity: usize) -> Self {
        self.change_feed_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new("doc-1", fields),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_typed_accessors() {
        let now = Utc::now();
        let d = doc(json!({
            "text": "hola",
            "isRead": false,
            "count": 3,
            "participants": ["a", 7, "b"],
            "timestamp": now.timestamp_micros(),
        }));

        assert_eq!(d.get_str("text"), Some("hola"));
        assert_eq!(d.get_bool("isRead"), Some(false));
        assert_eq!(d.get_i64("count"), Some(3));
        assert_eq!(d.get_str_list("participants"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(d.get_timestamp("timestamp").map(|t| t.timestamp_micros()), Some(now.timestamp_micros()));
        assert!(d.get_str_list("text").is_none());
    }

    #[test]
    fn test_require_reports_field() {
        let d = doc(json!({ "type": 5 }));

        assert_eq!(
            d.require_str("userId"),
            Err(DecodeError::MissingField { doc: "doc-1".into(), field: "userId" })
        );
        assert!(matches!(d.require_str("type"), Err(DecodeError::InvalidField { field: "type", .. })));
        assert!(d.require_timestamp("timestamp").is_err());
    }

    #[test]
    fn test_batch_collections_dedup() {
        let mut batch = WriteBatch::new();
        batch
            .update("notifications", "n1", Fields::new())
            .update("notifications", "n2", Fields::new())
            .delete("users", "u1");

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.collections(), vec!["notifications".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_subcollection_path() {
        assert_eq!(
            collections::subcollection(collections::CHATS, "a_b", collections::MESSAGES),
            "individual_chats/a_b/messages"
        );
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert!(!config.temporary);
        assert_eq!(config.listener_buffer, 64);
        assert!(StorageConfig::temporary().temporary);
    }
}
