//! Notification feed of a user: the live recent window, the live unread
//! count and the read/delete mutations.

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::model::Notification;
use super::SyncConfig;
use crate::storage::{collections, Direction, Document, Fields, Query, SharedStore, WriteBatch};

fn read_flag() -> Fields {
    let mut fields = Fields::new();
    fields.insert("isRead".to_string(), json!(true));
    fields
}

#[derive(Clone)]
pub struct NotificationFeed {
    store: SharedStore,
    window: usize,
}

impl NotificationFeed {
    pub fn new(store: SharedStore, config: &SyncConfig) -> Self {
        Self {
            store,
            window: config.notification_window.max(1),
        }
    }

    fn unread_of(user_id: &str) -> Query {
        Query::collection(collections::NOTIFICATIONS)
            .where_eq("userId", user_id)
            .where_eq("isRead", false)
    }

    /// Live list of the most recent notifications of `user_id`, newest first.
    ///
    /// Records with an unknown `type` are left out. A listener failure yields
    /// an empty list.
    pub fn stream_notifications(&self, user_id: &str) -> impl Stream<Item = Vec<Notification>> + Send + 'static {
        let query = Query::collection(collections::NOTIFICATIONS)
            .where_eq("userId", user_id)
            .order_by("timestamp", Direction::Descending)
            .limit(self.window);
        let user_id = user_id.to_string();

        self.store.listen(query).map(move |snapshot| match snapshot {
            Ok(docs) => {
                let notifications = decode_notifications(&docs);
                debug!("{} notifications for {}", notifications.len(), user_id);
                notifications
            }
            Err(e) => {
                warn!("Notification feed for {} unavailable: {}", user_id, e);
                Vec::new()
            }
        })
    }

    /// Live number of unread notifications of `user_id`. A listener failure
    /// yields 0.
    pub fn stream_unread_count(&self, user_id: &str) -> impl Stream<Item = usize> + Send + 'static {
        let user_id = user_id.to_string();

        self.store
            .listen(Self::unread_of(&user_id))
            .map(move |snapshot| match snapshot {
                Ok(docs) => docs.len(),
                Err(e) => {
                    warn!("Unread count for {} unavailable: {}", user_id, e);
                    0
                }
            })
    }

    pub async fn mark_as_read(&self, notification_id: &str) -> bool {
        match self
            .store
            .update(collections::NOTIFICATIONS, notification_id, read_flag())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to mark notification {} as read: {}", notification_id, e);
                false
            }
        }
    }

    /// Mark every currently unread notification of `user_id` as read in one
    /// batch. Nothing to mark counts as success.
    pub async fn mark_all_as_read(&self, user_id: &str) -> bool {
        let unread = match self.store.query(&Self::unread_of(user_id)).await {
            Ok(docs) => docs,
            Err(e) => {
                error!("Failed to load unread notifications of {}: {}", user_id, e);
                return false;
            }
        };

        if unread.is_empty() {
            return true;
        }

        let mut batch = WriteBatch::new();
        for doc in &unread {
            batch.update(collections::NOTIFICATIONS, doc.id.as_str(), read_flag());
        }

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Marked {} notifications of {} as read", unread.len(), user_id);
                true
            }
            Err(e) => {
                error!("Failed to mark notifications of {} as read: {}", user_id, e);
                false
            }
        }
    }

    pub async fn delete(&self, notification_id: &str) -> bool {
        match self.store.delete(collections::NOTIFICATIONS, notification_id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete notification {}: {}", notification_id, e);
                false
            }
        }
    }
}

fn decode_notifications(docs: &[Document]) -> Vec<Notification> {
    docs.iter()
        .filter_map(|doc| match Notification::from_document(doc) {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!("Skipping notification: {}", e);
                None
            }
        })
        .collect()
}
