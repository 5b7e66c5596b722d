//! One place to construct every service over a shared store and session.

use std::sync::Arc;

use crate::community::{ActivityBoard, QuestionBoard, UserDirectory};
use crate::identity::IdentityProvider;
use crate::storage::SharedStore;
use crate::sync::{ChatDirectory, ChatListProjector, MessageChannel, NotificationEmitter, NotificationFeed, SyncConfig};

/// All services of the app, sharing one store handle and one identity provider
#[derive(Clone)]
pub struct Services {
    pub chats: ChatDirectory,
    pub messages: MessageChannel,
    pub chat_list: ChatListProjector,
    pub notifications: NotificationFeed,
    pub users: UserDirectory,
    pub activities: ActivityBoard,
    pub questions: QuestionBoard,
}

impl Services {
    pub fn new(store: SharedStore, identity: Arc<dyn IdentityProvider>, config: &SyncConfig) -> Self {
        let emitter = NotificationEmitter::new(store.clone());
        let users = UserDirectory::new(store.clone(), identity.clone());

        Self {
            chats: ChatDirectory::new(store.clone(), identity.clone()),
            messages: MessageChannel::new(store.clone(), identity.clone(), emitter.clone()),
            chat_list: ChatListProjector::new(store.clone(), identity.clone()),
            notifications: NotificationFeed::new(store.clone(), config),
            activities: ActivityBoard::new(store.clone(), identity.clone(), users.clone(), emitter.clone()),
            questions: QuestionBoard::new(store, identity, users.clone(), emitter),
            users,
        }
    }
}
