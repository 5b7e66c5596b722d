//! Typed records of the chat and notification collections.
//!
//! Documents arrive as loose field maps. Each record type has a
//! `from_document` step that validates required fields and defaults the rest,
//! so a malformed document can be reported and skipped on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::identity::FALLBACK_NAME;
use crate::storage::{timestamp_value, DecodeError, Document, Fields};

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

/// Two-party chat record in `individual_chats/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Canonical key of the two participants
    pub id: String,
    pub participant_ids: Vec<String>,
    pub participant_names: HashMap<String, String>,
    /// Chat summary: last message text
    pub last_message: String,
    /// Chat summary: last message time
    pub last_message_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn to_fields(&self) -> Fields {
        into_fields(json!({
            "participants": self.participant_ids,
            "participantsMap": self.participant_names,
            "lastMessage": self.last_message,
            "lastMessageTime": timestamp_value(self.last_message_time),
            "createdAt": timestamp_value(self.created_at),
        }))
    }

    /// Both `participants` and `participantsMap` are required; summary fields
    /// default to empty / epoch.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let participant_ids = doc
            .get_str_list("participants")
            .ok_or_else(|| doc.missing("participants"))?;

        let participant_names = doc
            .get("participantsMap")
            .and_then(Value::as_object)
            .ok_or_else(|| doc.missing("participantsMap"))?
            .iter()
            .filter_map(|(id, name)| name.as_str().map(|n| (id.clone(), n.to_string())))
            .collect();

        Ok(Self {
            id: doc.id.clone(),
            participant_ids,
            participant_names,
            last_message: doc.get_str("lastMessage").unwrap_or_default().to_string(),
            last_message_time: doc.get_timestamp("lastMessageTime").unwrap_or_default(),
            created_at: doc.get_timestamp("createdAt").unwrap_or_default(),
        })
    }

    /// The first participant that is not `user_id`
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        self.participant_ids
            .iter()
            .map(String::as_str)
            .find(|id| *id != user_id)
    }

    pub fn name_of(&self, user_id: &str) -> &str {
        self.participant_names
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(FALLBACK_NAME)
    }
}

/// Summary fields written on every message send
pub fn chat_summary_fields(text: &str, at: DateTime<Utc>) -> Fields {
    into_fields(json!({
        "lastMessage": text,
        "lastMessageTime": timestamp_value(at),
    }))
}

/// Message in `individual_chats/{chatId}/messages/{id}`. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn to_fields(&self) -> Fields {
        into_fields(json!({
            "text": self.text,
            "senderId": self.sender_id,
            "senderName": self.sender_name,
            "timestamp": timestamp_value(self.timestamp),
        }))
    }

    /// `timestamp` is required since it drives display order.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            id: doc.id.clone(),
            text: doc.get_str("text").unwrap_or_default().to_string(),
            sender_id: doc.get_str("senderId").unwrap_or_default().to_string(),
            sender_name: doc.get_str("senderName").unwrap_or(FALLBACK_NAME).to_string(),
            timestamp: doc.require_timestamp("timestamp")?,
        })
    }
}

/// Kind of event a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// Someone sent a chat message; target is the chat id
    NewMessage,
    /// Someone joined an activity; target is the activity id
    NewParticipant,
    /// Someone answered a question; target is the question id
    NewAnswer,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewMessage => "NEW_MESSAGE",
            NotificationType::NewParticipant => "NEW_PARTICIPANT",
            NotificationType::NewAnswer => "NEW_ANSWER",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW_MESSAGE" => Ok(NotificationType::NewMessage),
            "NEW_PARTICIPANT" => Ok(NotificationType::NewParticipant),
            "NEW_ANSWER" => Ok(NotificationType::NewAnswer),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

/// Notification record in `notifications/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationType,
    /// Recipient
    pub user_id: String,
    pub from_user_id: String,
    pub from_user_name: String,
    pub from_user_image: String,
    /// Precomposed human-readable text
    pub message: String,
    /// Chat, activity or question id depending on `kind`
    pub target_id: String,
    pub target_title: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl Notification {
    pub fn to_fields(&self) -> Fields {
        into_fields(json!({
            "type": self.kind.as_str(),
            "userId": self.user_id,
            "fromUserId": self.from_user_id,
            "fromUserName": self.from_user_name,
            "fromUserImage": self.from_user_image,
            "message": self.message,
            "targetId": self.target_id,
            "targetTitle": self.target_title,
            "timestamp": timestamp_value(self.timestamp),
            "isRead": self.is_read,
        }))
    }

    /// `type` must name a known kind; everything else is defaulted.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let kind = doc
            .require_str("type")?
            .parse::<NotificationType>()
            .map_err(|reason| doc.invalid("type", reason))?;

        Ok(Self {
            id: doc.id.clone(),
            kind,
            user_id: doc.get_str("userId").unwrap_or_default().to_string(),
            from_user_id: doc.get_str("fromUserId").unwrap_or_default().to_string(),
            from_user_name: doc.get_str("fromUserName").unwrap_or(FALLBACK_NAME).to_string(),
            from_user_image: doc.get_str("fromUserImage").unwrap_or_default().to_string(),
            message: doc.get_str("message").unwrap_or_default().to_string(),
            target_id: doc.get_str("targetId").unwrap_or_default().to_string(),
            target_title: doc.get_str("targetTitle").unwrap_or_default().to_string(),
            timestamp: doc.get_timestamp("timestamp").unwrap_or_default(),
            is_read: doc.get_bool("isRead").unwrap_or(false),
        })
    }
}

/// A chat as seen from one participant. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPreview {
    pub chat_id: String,
    pub other_user_id: String,
    pub other_user_name: String,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
}

impl ChatPreview {
    /// Project a chat for `user_id`; `None` when no other participant exists.
    pub fn project(chat: &Chat, user_id: &str) -> Option<Self> {
        let other = chat.other_participant(user_id)?;
        Some(Self {
            chat_id: chat.id.clone(),
            other_user_id: other.to_string(),
            other_user_name: chat.name_of(other).to_string(),
            last_message: chat.last_message.clone(),
            last_message_time: chat.last_message_time,
        })
    }
}
