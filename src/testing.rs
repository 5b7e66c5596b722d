//! Shared fixtures for unit tests: temporary stores, signed-in sessions and a
//! store wrapper that fails selected operations on demand.

use async_trait::async_trait;
use futures_util::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

use crate::identity::{CurrentUser, SessionIdentity};
use crate::storage::{
    DocumentStore, Document, Fields, LiveQuery, Query, SledStore, StorageError, StorageResult, WriteBatch,
};

pub fn temp_store() -> Arc<SledStore> {
    Arc::new(SledStore::open_temporary().expect("temporary sled store"))
}

pub fn session(user: CurrentUser) -> Arc<SessionIdentity> {
    Arc::new(SessionIdentity::signed_in(user))
}

/// Wait for the first stream item satisfying `pred`, failing the test after 2s
pub async fn next_matching<S, T, F>(stream: &mut S, mut pred: F) -> T
where
    S: Stream<Item = T> + Unpin,
    T: std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    let wait = async {
        while let Some(item) = stream.next().await {
            if pred(&item) {
                return item;
            }
        }
        panic!("stream ended before a matching item");
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("timed out waiting for stream item")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Set,
    Add,
    Update,
    Delete,
    Query,
    Commit,
    Listen,
}

/// Delegates to a real store, except for the (operation, collection) pairs
/// registered with [`FlakyStore::fail_on`].
///
/// A rule's collection matches exactly, by trailing segment
/// (`"messages"` matches `individual_chats/a_b/messages`) or with `"*"`.
pub struct FlakyStore {
    inner: Arc<SledStore>,
    rules: Mutex<Vec<(Op, String)>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<SledStore>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, op: Op, collection: &str) {
        self.rules.lock().push((op, collection.to_string()));
    }

    pub fn heal(&self) {
        self.rules.lock().clear();
    }

    pub fn inner(&self) -> &Arc<SledStore> {
        &self.inner
    }

    fn check(&self, op: Op, collection: &str) -> StorageResult<()> {
        let failing = self.rules.lock().iter().any(|(rule_op, entry)| {
            *rule_op == op
                && (entry == "*" || entry == collection || collection.ends_with(&format!("/{}", entry)))
        });
        if failing {
            Err(StorageError::Unavailable(format!("{:?} on {}", op, collection)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.check(Op::Get, collection)?;
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()> {
        self.check(Op::Set, collection)?;
        self.inner.set(collection, id, fields).await
    }

    async fn add(&self, collection: &str, fields: Fields) -> StorageResult<String> {
        self.check(Op::Add, collection)?;
        self.inner.add(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StorageResult<()> {
        self.check(Op::Update, collection)?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        self.check(Op::Delete, collection)?;
        self.inner.delete(collection, id).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        self.check(Op::Query, query.collection_path())?;
        self.inner.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        for collection in batch.collections() {
            self.check(Op::Commit, &collection)?;
        }
        self.inner.commit(batch).await
    }

    fn listen(&self, query: Query) -> LiveQuery {
        match self.check(Op::Listen, query.collection_path()) {
            Ok(()) => self.inner.listen(query),
            Err(e) => LiveQuery::failed(e),
        }
    }
}
