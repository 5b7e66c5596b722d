//! Sled-based implementation of the document store.
//!
//! All documents live in one tree, keyed `collection \x1f id`, with the field
//! map stored as JSON. Because collection paths never contain the separator, a
//! prefix scan over `collection \x1f` yields exactly the direct documents of
//! that collection and none of its subcollections. It supports:
//! - Create-or-replace, store-assigned ids, merge updates and deletes
//! - Transactional write batches
//! - Live queries driven by a change feed

use async_trait::async_trait;
use sled::transaction::{abort, ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ChangeFeed, Document, DocumentStore, Fields, ListenerRegistry, LiveQuery, Query, StorageConfig,
    StorageError, StorageResult, WriteBatch, WriteOp,
};

/// Tree holding every document
const TREE_DOCUMENTS: &str = "documents";

/// Separator between collection path and document id in keys
const KEY_SEPARATOR: char = '\u{1f}';

/// Sled-backed document store
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    documents: Tree,
    feed: ChangeFeed,
    listeners: Arc<ListenerRegistry>,
    config: StorageConfig,
}

impl SledStore {
    /// Open or create a store at the configured path
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let mut sled_config = sled::Config::new()
            .cache_capacity(config.cache_size)
            .flush_every_ms(if config.flush_interval_ms > 0 {
                Some(config.flush_interval_ms)
            } else {
                None
            });

        if config.temporary {
            sled_config = sled_config.temporary(true);
        } else {
            let path = Path::new(&config.path);

            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::InitFailed(format!("Failed to create directory: {}", e))
                })?;
            }
            sled_config = sled_config.path(&config.path);
        }

        let db = sled_config.open()?;
        let documents = db.open_tree(TREE_DOCUMENTS)?;

        if config.temporary {
            debug!("Opened temporary document store");
        } else {
            info!("Document store opened at {}", config.path);
        }

        Ok(Self {
            db: Arc::new(db),
            documents,
            feed: ChangeFeed::new(config.change_feed_capacity),
            listeners: Arc::new(ListenerRegistry::new()),
            config,
        })
    }

    /// Open a throwaway in-memory store
    pub fn open_temporary() -> StorageResult<Self> {
        Self::open(StorageConfig::temporary())
    }

    /// Number of live queries currently attached
    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }

    /// Total number of stored documents, across all collections
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Force flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn put(&self, collection: &str, id: &str, fields: &Fields) -> StorageResult<()> {
        let bytes = serde_json::to_vec(fields)?;
        self.documents.insert(document_key(collection, id), bytes)?;
        Ok(())
    }
}

fn document_key(collection: &str, id: &str) -> Vec<u8> {
    format!("{}{}{}", collection, KEY_SEPARATOR, id).into_bytes()
}

fn collection_prefix(collection: &str) -> Vec<u8> {
    format!("{}{}", collection, KEY_SEPARATOR).into_bytes()
}

fn decode_document(key: &[u8], value: &[u8]) -> StorageResult<Document> {
    let key = std::str::from_utf8(key)
        .map_err(|e| StorageError::Corruption(format!("Invalid key encoding: {}", e)))?;
    let (_, id) = key
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| StorageError::Corruption(format!("Key without separator: {}", key)))?;
    let fields: Fields = serde_json::from_slice(value)?;
    Ok(Document::new(id, fields))
}

/// Read every direct document of the query's collection and apply it
fn run_query(tree: &Tree, query: &Query) -> StorageResult<Vec<Document>> {
    let mut docs = Vec::new();
    for item in tree.scan_prefix(collection_prefix(query.collection_path())) {
        let (key, value) = item?;
        docs.push(decode_document(&key, &value)?);
    }
    Ok(query.apply(docs))
}

fn merge_into(existing: &[u8], patch: &Fields) -> Result<Vec<u8>, serde_json::Error> {
    let mut fields: Fields = serde_json::from_slice(existing)?;
    for (key, value) in patch {
        fields.insert(key.clone(), value.clone());
    }
    serde_json::to_vec(&fields)
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        match self.documents.get(document_key(collection, id))? {
            Some(bytes) => {
                let fields: Fields = serde_json::from_slice(&bytes)?;
                Ok(Some(Document::new(id, fields)))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()> {
        self.put(collection, id, &fields)?;
        self.feed.publish(collection);
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> StorageResult<String> {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, &fields)?;
        self.feed.publish(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        if self.documents.remove(document_key(collection, id))?.is_some() {
            self.feed.publish(collection);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        run_query(&self.documents, query)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.ops();
        let result = self.documents.transaction(|tx| {
            for op in ops {
                match op {
                    WriteOp::Set { collection, id, fields } => {
                        let bytes = serde_json::to_vec(fields)
                            .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                        tx.insert(document_key(collection, id), bytes)?;
                    }
                    WriteOp::Update { collection, id, fields } => {
                        let key = document_key(collection, id);
                        let existing = match tx.get(&key)? {
                            Some(existing) => existing,
                            None => {
                                return abort(StorageError::NotFound(format!("{}/{}", collection, id)))
                            }
                        };
                        let merged = merge_into(&existing, fields)
                            .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                        tx.insert(key, merged)?;
                    }
                    WriteOp::Delete { collection, id } => {
                        tx.remove(document_key(collection, id))?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StorageError::Sled(e)),
        }

        for collection in batch.collections() {
            self.feed.publish(collection);
        }
        Ok(())
    }

    fn listen(&self, query: Query) -> LiveQuery {
        let tree = self.documents.clone();
        self.listeners.spawn(
            &self.feed,
            query,
            self.config.listener_buffer,
            move |q: &Query| run_query(&tree, q),
        )
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        // Attempt to flush on drop, but don't panic
        if !self.config.temporary {
            let _ = self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Direction;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio_stream::StreamExt;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn test_store() -> SledStore {
        SledStore::open_temporary().unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = test_store();
        store
            .set("users", "u1", fields(json!({ "displayName": "Ana" })))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.id, "u1");
        assert_eq!(doc.get_str("displayName"), Some("Ana"));
        assert!(store.get("users", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_whole_document() {
        let store = test_store();
        store.set("c", "1", fields(json!({ "a": 1, "b": 2 }))).await.unwrap();
        store.set("c", "1", fields(json!({ "a": 3 }))).await.unwrap();

        let doc = store.get("c", "1").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("a"), Some(3));
        assert!(doc.get("b").is_none());
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = test_store();
        store.set("c", "1", fields(json!({ "a": 1, "b": 2 }))).await.unwrap();
        store.update("c", "1", fields(json!({ "b": 5 }))).await.unwrap();

        let doc = store.get("c", "1").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("a"), Some(1));
        assert_eq!(doc.get_i64("b"), Some(5));

        let missing = store.update("c", "2", fields(json!({ "b": 5 }))).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subcollections_are_separate() {
        let store = test_store();
        store.set("individual_chats", "a_b", fields(json!({}))).await.unwrap();
        store
            .add("individual_chats/a_b/messages", fields(json!({ "text": "hi" })))
            .await
            .unwrap();

        let chats = store.query(&Query::collection("individual_chats")).await.unwrap();
        assert_eq!(chats.len(), 1);
        let messages = store
            .query(&Query::collection("individual_chats/a_b/messages"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = test_store();
        store.set("n", "1", fields(json!({ "isRead": false }))).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .update("n", "1", fields(json!({ "isRead": true })))
            .update("n", "ghost", fields(json!({ "isRead": true })));
        assert!(store.commit(batch).await.is_err());

        let doc = store.get("n", "1").await.unwrap().unwrap();
        assert_eq!(doc.get_bool("isRead"), Some(false));
    }

    #[tokio::test]
    async fn test_listen_emits_on_change_and_releases() {
        let store = test_store();
        let query = Query::collection("notes").order_by("n", Direction::Ascending);
        let mut live = store.listen(query);

        assert!(live.next().await.unwrap().unwrap().is_empty());
        assert_eq!(store.active_listeners(), 1);

        store.add("notes", fields(json!({ "n": 2 }))).await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), live.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);

        live.cancel();
        assert_eq!(store.active_listeners(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = test_store();
        store.delete("notes", "nope").await.unwrap();
        store.set("notes", "x", fields(json!({}))).await.unwrap();
        store.delete("notes", "x").await.unwrap();
        assert!(store.get("notes", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sled").to_string_lossy().to_string();

        {
            let store = SledStore::open(StorageConfig::new(&path)).unwrap();
            store.set("users", "u1", fields(json!({ "email": "a@b.co" }))).await.unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(StorageConfig::new(&path)).unwrap();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("email"), Some("a@b.co"));
        assert_eq!(store.document_count(), 1);
    }
}
