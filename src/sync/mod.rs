//! Chat and notification synchronization layer.
//!
//! This module implements the real-time side of the app on top of the
//! document store:
//! - Canonical two-party chat keys and the chat directory
//! - Message channel with live, timestamp-ordered message streams
//! - Per-user chat list projection
//! - Best-effort notification fan-out and the live notification feed

pub mod channel;
pub mod chat_key;
pub mod directory;
pub mod emitter;
pub mod feed;
pub mod model;
pub mod projector;

pub use channel::MessageChannel;
pub use chat_key::chat_key;
pub use directory::ChatDirectory;
pub use emitter::{Actor, Delivery, NotificationEmitter};
pub use feed::NotificationFeed;
pub use model::{Chat, ChatPreview, Message, Notification, NotificationType};
pub use projector::{sort_by_recency, ChatListProjector};

use thiserror::Error;

use crate::storage::{DecodeError, StorageError};

/// Errors surfaced by the synchronization services
#[derive(Error, Debug)]
pub enum SyncError {
    /// An operation that needs a signed-in user ran without one
    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed record: {0}")]
    Malformed(#[from] DecodeError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Tunables of the synchronization services
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Most recent notifications kept in the live feed
    pub notification_window: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            notification_window: 50,
        }
    }
}

impl SyncConfig {
    pub fn with_notification_window(mut self, window: usize) -> Self {
        self.notification_window = window.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        assert_eq!(SyncError::Unauthenticated.to_string(), "No authenticated user");

        let err: SyncError = StorageError::NotFound("individual_chats/a_b".into()).into();
        assert_eq!(err.to_string(), "Storage error: Document not found: individual_chats/a_b");
    }

    #[test]
    fn test_sync_config_default() {
        assert_eq!(SyncConfig::default().notification_window, 50);
        assert_eq!(SyncConfig::default().with_notification_window(0).notification_window, 1);
    }
}
