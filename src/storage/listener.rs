//! Live query plumbing: change feed, listener registry and the stream handed
//! to subscribers.
//!
//! Every write publishes a [`ChangeEvent`] naming the collection it touched.
//! Each live query runs as its own task that re-evaluates the query whenever
//! its collection changes and pushes the full result set to the subscriber.
//! The task is tracked in a [`ListenerRegistry`] and is released exactly once,
//! either by [`LiveQuery::cancel`] or when the stream is dropped.

use dashmap::DashMap;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::{Document, Query, StorageError, StorageResult};

/// A write touched this collection path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
}

/// Broadcast feed of collection changes shared by all listeners of a store
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Announce a change. Nobody listening is not an error.
    pub fn publish(&self, collection: impl Into<String>) {
        let _ = self.tx.send(ChangeEvent {
            collection: collection.into(),
        });
    }
}

struct ListenerEntry {
    collection: String,
    task: AbortHandle,
}

/// Tracks the running listener tasks of a store
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<u64, ListenerEntry>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, collection: &str, task: AbortHandle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(
            id,
            ListenerEntry {
                collection: collection.to_string(),
                task,
            },
        );
        debug!("Listener {} attached to {}", id, collection);
        id
    }

    /// Detach a listener. Returns false if it was already released.
    pub fn release(&self, id: u64) -> bool {
        match self.listeners.remove(&id) {
            Some((_, entry)) => {
                entry.task.abort();
                debug!("Listener {} detached from {}", id, entry.collection);
                true
            }
            None => false,
        }
    }

    /// Number of listeners currently attached
    pub fn active(&self) -> usize {
        self.listeners.len()
    }

    /// Attach a listener task for `query`.
    ///
    /// The change feed is subscribed before the first evaluation, so no write
    /// that lands after this call returns can be missed. A failed evaluation is
    /// delivered once and ends the listener.
    pub fn spawn<F>(
        self: &Arc<Self>,
        feed: &ChangeFeed,
        query: Query,
        buffer: usize,
        evaluate: F,
    ) -> LiveQuery
    where
        F: Fn(&Query) -> StorageResult<Vec<Document>> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut changes = feed.subscribe();
        let collection = query.collection_path().to_string();

        let watched = collection.clone();
        let task = tokio::spawn(async move {
            if !emit(&tx, evaluate(&query)).await {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(event) if event.collection != watched => continue,
                    Ok(_) => {}
                    // Missed events only mean we re-read sooner
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Listener on {} lagged by {} events", watched, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(Err(StorageError::ListenerClosed(watched.clone()))).await;
                        return;
                    }
                }
                if !emit(&tx, evaluate(&query)).await {
                    return;
                }
            }
        });

        let id = self.register(&collection, task.abort_handle());
        LiveQuery::new(
            rx,
            Some(ListenerGuard {
                id,
                registry: Arc::clone(self),
                released: false,
            }),
        )
    }
}

/// Push one snapshot; false when the listener should stop
async fn emit(
    tx: &mpsc::Sender<StorageResult<Vec<Document>>>,
    snapshot: StorageResult<Vec<Document>>,
) -> bool {
    let failed = snapshot.is_err();
    if tx.send(snapshot).await.is_err() {
        return false;
    }
    !failed
}

/// Owns one registry entry and releases it exactly once
pub struct ListenerGuard {
    id: u64,
    registry: Arc<ListenerRegistry>,
    released: bool,
}

impl ListenerGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(self.id);
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Live result set of a query.
///
/// Yields the full snapshot on subscription and after every change. After an
/// error item the stream ends.
pub struct LiveQuery {
    rx: mpsc::Receiver<StorageResult<Vec<Document>>>,
    guard: Option<ListenerGuard>,
}

impl LiveQuery {
    pub fn new(rx: mpsc::Receiver<StorageResult<Vec<Document>>>, guard: Option<ListenerGuard>) -> Self {
        Self { rx, guard }
    }

    /// A live query that fails immediately without ever attaching a listener
    pub fn failed(error: StorageError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(Err(error));
        Self { rx, guard: None }
    }

    /// Registry id of the underlying listener, if one is attached
    pub fn listener_id(&self) -> Option<u64> {
        self.guard.as_ref().map(ListenerGuard::id)
    }

    /// Detach the underlying listener now
    pub fn cancel(mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
    }
}

impl Stream for LiveQuery {
    type Item = StorageResult<Vec<Document>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
