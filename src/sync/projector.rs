//! Per-user chat list.
//!
//! Projects every chat a user takes part in into a [`ChatPreview`]. The list
//! favors availability: listener failures surface as an empty list and
//! malformed chats are dropped one by one.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use super::model::{Chat, ChatPreview};
use crate::identity::IdentityProvider;
use crate::storage::{collections, Document, Query, SharedStore};

#[derive(Clone)]
pub struct ChatListProjector {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
}

impl ChatListProjector {
    pub fn new(store: SharedStore, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    fn chats_of(user_id: &str) -> Query {
        Query::collection(collections::CHATS).where_array_contains("participants", user_id)
    }

    /// Live chat list of `user_id`, in no particular order.
    ///
    /// Use [`sort_by_recency`] for display order.
    pub fn stream_chats_for_user(&self, user_id: &str) -> impl Stream<Item = Vec<ChatPreview>> + Send + 'static {
        let user_id = user_id.to_string();

        self.store
            .listen(Self::chats_of(&user_id))
            .map(move |snapshot| match snapshot {
                Ok(docs) => {
                    let previews = project_all(&docs, &user_id);
                    debug!("{} chats for {}", previews.len(), user_id);
                    previews
                }
                Err(e) => {
                    warn!("Chat list for {} unavailable: {}", user_id, e);
                    Vec::new()
                }
            })
    }

    /// One-shot chat list of the current user, most recent first.
    /// Empty when nobody is signed in or the read fails.
    pub async fn my_chats(&self) -> Vec<ChatPreview> {
        let Some(user) = self.identity.current_user() else {
            return Vec::new();
        };

        match self.store.query(&Self::chats_of(&user.uid)).await {
            Ok(docs) => sort_by_recency(project_all(&docs, &user.uid)),
            Err(e) => {
                warn!("Failed to load chats of {}: {}", user.uid, e);
                Vec::new()
            }
        }
    }
}

fn project_all(docs: &[Document], user_id: &str) -> Vec<ChatPreview> {
    docs.iter()
        .filter_map(|doc| match Chat::from_document(doc) {
            Ok(chat) => ChatPreview::project(&chat, user_id),
            Err(e) => {
                warn!("Skipping chat: {}", e);
                None
            }
        })
        .collect()
}

/// Order previews by last message time, newest first
pub fn sort_by_recency(mut previews: Vec<ChatPreview>) -> Vec<ChatPreview> {
    previews.sort_by(|a, b| {
        b.last_message_time
            .cmp(&a.last_message_time)
            .then_with(|| a.chat_id.cmp(&b.chat_id))
    });
    previews
}
