//! Chat directory: creates and looks up the chat record of a user pair.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::chat_key::chat_key;
use super::model::Chat;
use super::{SyncError, SyncResult};
use crate::identity::IdentityProvider;
use crate::storage::{collections, SharedStore};

#[derive(Clone)]
pub struct ChatDirectory {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
}

impl ChatDirectory {
    pub fn new(store: SharedStore, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Create or replace the chat between the current user and `other_user_id`
    /// and return its id.
    ///
    /// The record is upserted: for an existing chat this resets `lastMessage`
    /// to empty and `lastMessageTime` to now.
    pub async fn start_chat(&self, other_user_id: &str, other_user_name: &str) -> SyncResult<String> {
        let user = self.identity.current_user().ok_or(SyncError::Unauthenticated)?;
        let chat_id = chat_key(&user.uid, other_user_id);
        let now = Utc::now();

        let mut names = HashMap::new();
        names.insert(user.uid.clone(), user.best_display_name());
        names.insert(other_user_id.to_string(), other_user_name.to_string());

        let chat = Chat {
            id: chat_id.clone(),
            participant_ids: vec![user.uid.clone(), other_user_id.to_string()],
            participant_names: names,
            last_message: String::new(),
            last_message_time: now,
            created_at: now,
        };

        self.store
            .set(collections::CHATS, &chat_id, chat.to_fields())
            .await?;

        info!("Chat {} started by {}", chat_id, user.uid);
        Ok(chat_id)
    }

    /// Whether a chat record exists for the pair. Store failures read as `false`.
    pub async fn chat_exists(&self, user_a: &str, user_b: &str) -> bool {
        let chat_id = chat_key(user_a, user_b);
        match self.store.get(collections::CHATS, &chat_id).await {
            Ok(doc) => doc.is_some(),
            Err(e) => {
                debug!("chat_exists({}) failed: {}", chat_id, e);
                false
            }
        }
    }

    pub async fn get_chat(&self, chat_id: &str) -> SyncResult<Option<Chat>> {
        match self.store.get(collections::CHATS, chat_id).await? {
            Some(doc) => Ok(Some(Chat::from_document(&doc)?)),
            None => Ok(None),
        }
    }
}
