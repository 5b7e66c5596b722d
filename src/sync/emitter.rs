//! Notification fan-out.
//!
//! Three domain events notify the other party: a chat message (to the
//! recipient), an activity join (to the activity creator) and a question
//! answer (to the question author). Every call writes at most one record and
//! never notifies the actor about their own action.
//!
//! Emission is a side channel. Its outcome is a [`Delivery`], not a `Result`,
//! so it cannot be propagated with `?` into the primary operation's error path.

use chrono::Utc;
use tracing::{debug, warn};

use super::model::{Notification, NotificationType};
use crate::identity::CurrentUser;
use crate::storage::{collections, SharedStore};

/// The user whose action triggers a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub image: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn from_user(user: &CurrentUser) -> Self {
        Self::new(user.uid.clone(), user.best_display_name())
    }
}

/// Outcome of a best-effort notification write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Written under this notification id
    Delivered(String),
    /// Recipient and actor are the same user
    SelfSuppressed,
    /// The write failed; already logged
    Dropped,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered(_))
    }
}

#[derive(Clone)]
pub struct NotificationEmitter {
    store: SharedStore,
}

impl NotificationEmitter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn notify_new_message(&self, recipient_id: &str, actor: &Actor, chat_id: &str) -> Delivery {
        self.emit(
            NotificationType::NewMessage,
            recipient_id,
            actor,
            format!("{} te ha enviado un mensaje", actor.name),
            chat_id,
            "",
        )
        .await
    }

    pub async fn notify_new_participant(
        &self,
        recipient_id: &str,
        actor: &Actor,
        activity_id: &str,
        activity_title: &str,
    ) -> Delivery {
        self.emit(
            NotificationType::NewParticipant,
            recipient_id,
            actor,
            format!("{} se ha unido a tu actividad", actor.name),
            activity_id,
            activity_title,
        )
        .await
    }

    pub async fn notify_new_answer(
        &self,
        recipient_id: &str,
        actor: &Actor,
        question_id: &str,
        question_text: &str,
    ) -> Delivery {
        self.emit(
            NotificationType::NewAnswer,
            recipient_id,
            actor,
            format!("{} respondió tu pregunta", actor.name),
            question_id,
            question_text,
        )
        .await
    }

    async fn emit(
        &self,
        kind: NotificationType,
        recipient_id: &str,
        actor: &Actor,
        message: String,
        target_id: &str,
        target_title: &str,
    ) -> Delivery {
        if recipient_id == actor.id {
            debug!("Skipping {} notification to self ({})", kind, actor.id);
            return Delivery::SelfSuppressed;
        }

        let notification = Notification {
            id: String::new(),
            kind,
            user_id: recipient_id.to_string(),
            from_user_id: actor.id.clone(),
            from_user_name: actor.name.clone(),
            from_user_image: actor.image.clone(),
            message,
            target_id: target_id.to_string(),
            target_title: target_title.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        };

        match self
            .store
            .add(collections::NOTIFICATIONS, notification.to_fields())
            .await
        {
            Ok(id) => {
                debug!("{} notification {} -> {}", kind, id, recipient_id);
                Delivery::Delivered(id)
            }
            Err(e) => {
                warn!("Dropped {} notification for {}: {}", kind, recipient_id, e);
                Delivery::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentStore, Query};
    use crate::testing::{temp_store, FlakyStore, Op};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_self_actions_never_notify() {
        let store = temp_store();
        let emitter = NotificationEmitter::new(store.clone());
        let me = Actor::new("ana", "Ana");

        assert_eq!(emitter.notify_new_message("ana", &me, "ana_bob").await, Delivery::SelfSuppressed);
        assert_eq!(emitter.notify_new_participant("ana", &me, "act1", "Fútbol").await, Delivery::SelfSuppressed);
        assert_eq!(emitter.notify_new_answer("ana", &me, "q1", "¿Dónde?").await, Delivery::SelfSuppressed);

        let all = store.query(&Query::collection(collections::NOTIFICATIONS)).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_writes_one_unread_record() {
        let store = temp_store();
        let emitter = NotificationEmitter::new(store.clone());
        let actor = Actor::new("ana", "Ana").with_image("https://img/ana.png");

        let delivery = emitter.notify_new_participant("bob", &actor, "act1", "Fútbol").await;
        let id = match delivery {
            Delivery::Delivered(id) => id,
            other => panic!("expected delivery, got {:?}", other),
        };

        let doc = store.get(collections::NOTIFICATIONS, &id).await.unwrap().unwrap();
        let n = Notification::from_document(&doc).unwrap();
        assert_eq!(n.kind, NotificationType::NewParticipant);
        assert_eq!(n.user_id, "bob");
        assert_eq!(n.from_user_id, "ana");
        assert_eq!(n.from_user_image, "https://img/ana.png");
        assert_eq!(n.message, "Ana se ha unido a tu actividad");
        assert_eq!(n.target_title, "Fútbol");
        assert!(!n.is_read);
    }

    #[tokio::test]
    async fn test_store_failure_is_dropped() {
        let flaky = Arc::new(FlakyStore::new(temp_store()));
        flaky.fail_on(Op::Add, collections::NOTIFICATIONS);
        let emitter = NotificationEmitter::new(flaky.clone());

        let delivery = emitter.notify_new_answer("bob", &Actor::new("ana", "Ana"), "q1", "¿Qué?").await;
        assert_eq!(delivery, Delivery::Dropped);
        assert!(!delivery.is_delivered());
    }
}
