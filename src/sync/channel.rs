//! Message channel: sending into a chat and following its messages live.
//!
//! A send is two independent writes (the message, then the chat summary)
//! followed by a best-effort notification to the other participant. The
//! writes are not transactional; a failure between them leaves a message
//! whose chat summary is stale until the next send.

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::emitter::{Actor, NotificationEmitter};
use super::model::{chat_summary_fields, Chat, Message};
use super::{SyncError, SyncResult};
use crate::identity::IdentityProvider;
use crate::storage::{collections, Direction, Document, Query, SharedStore};

#[derive(Clone)]
pub struct MessageChannel {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
    emitter: NotificationEmitter,
}

impl MessageChannel {
    pub fn new(store: SharedStore, identity: Arc<dyn IdentityProvider>, emitter: NotificationEmitter) -> Self {
        Self {
            store,
            identity,
            emitter,
        }
    }

    fn messages_path(chat_id: &str) -> String {
        collections::subcollection(collections::CHATS, chat_id, collections::MESSAGES)
    }

    /// Send `text` as the current user.
    ///
    /// Returns `false` when nobody is signed in or either primary write fails.
    /// The outcome of the notification to the other participant never changes
    /// the result.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            warn!("send_message({}) without a signed-in user", chat_id);
            return false;
        };

        let text = text.trim();
        let now = Utc::now();
        let message = Message {
            id: String::new(),
            text: text.to_string(),
            sender_id: user.uid.clone(),
            sender_name: user.best_display_name(),
            timestamp: now,
        };

        let message_id = match self.store.add(&Self::messages_path(chat_id), message.to_fields()).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to write message to {}: {}", chat_id, e);
                return false;
            }
        };

        if let Err(e) = self
            .store
            .update(collections::CHATS, chat_id, chat_summary_fields(text, now))
            .await
        {
            error!("Message {} stored but summary of {} not updated: {}", message_id, chat_id, e);
            return false;
        }

        debug!("Message {} sent to {} by {}", message_id, chat_id, user.uid);

        let actor = Actor::from_user(&user);
        match self.recipient_of(chat_id, &user.uid).await {
            Some(recipient) => {
                self.emitter.notify_new_message(&recipient, &actor, chat_id).await;
            }
            None => debug!("No recipient to notify for {}", chat_id),
        }

        true
    }

    /// Other participant of the chat, if the chat can be read and decoded
    async fn recipient_of(&self, chat_id: &str, sender_id: &str) -> Option<String> {
        let doc = match self.store.get(collections::CHATS, chat_id).await {
            Ok(doc) => doc?,
            Err(e) => {
                warn!("Could not read chat {} for notification: {}", chat_id, e);
                return None;
            }
        };
        match Chat::from_document(&doc) {
            Ok(chat) => chat.other_participant(sender_id).map(str::to_string),
            Err(e) => {
                warn!("Skipping notification, {}", e);
                None
            }
        }
    }

    /// Live, timestamp-ascending message list of a chat.
    ///
    /// Every item is the whole list. A listener failure is yielded once and
    /// ends the stream; dropping the stream detaches its listener.
    pub fn stream_messages(&self, chat_id: &str) -> impl Stream<Item = SyncResult<Vec<Message>>> + Send + 'static {
        let query = Query::collection(Self::messages_path(chat_id)).order_by("timestamp", Direction::Ascending);
        let chat_id = chat_id.to_string();

        self.store.listen(query).map(move |snapshot| match snapshot {
            Ok(docs) => {
                let messages = decode_messages(&docs);
                debug!("{} messages in {}", messages.len(), chat_id);
                Ok(messages)
            }
            Err(e) => {
                warn!("Message stream for {} failed: {}", chat_id, e);
                Err(SyncError::Storage(e))
            }
        })
    }
}

fn decode_messages(docs: &[Document]) -> Vec<Message> {
    let mut messages: Vec<Message> = docs
        .iter()
        .filter_map(|doc| match Message::from_document(doc) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping message: {}", e);
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    messages
}
