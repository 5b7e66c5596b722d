//! Records of the profile, activity and question collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::identity::FALLBACK_NAME;
use crate::storage::{timestamp_value, DecodeError, Document, Fields};

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

/// Profile in `users/{uid}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub profile_picture: String,
    pub bio: String,
    pub interests: Vec<String>,
    pub university: String,
    pub career: String,
    pub semester: u32,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            created_at: Utc::now(),
            ..Default::default()
        }
    }

    /// Blank strings are left out so a partial profile never clears stored values.
    pub fn to_fields(&self) -> Fields {
        let mut fields = into_fields(json!({
            "uid": self.uid,
            "email": self.email,
            "displayName": self.display_name,
            "profilePicture": self.profile_picture,
            "bio": self.bio,
            "interests": self.interests,
            "university": self.university,
            "career": self.career,
            "semester": self.semester,
            "isEmailVerified": self.is_email_verified,
            "createdAt": timestamp_value(self.created_at),
        }));
        fields.retain(|_, value| !matches!(value, Value::String(s) if s.trim().is_empty()));
        fields
    }

    pub fn from_document(doc: &Document) -> Self {
        let text = |field: &str| doc.get_str(field).unwrap_or_default().to_string();
        Self {
            uid: doc.get_str("uid").unwrap_or(&doc.id).to_string(),
            email: text("email"),
            display_name: text("displayName"),
            profile_picture: text("profilePicture"),
            bio: text("bio"),
            interests: doc.get_str_list("interests").unwrap_or_default(),
            university: text("university"),
            career: text("career"),
            semester: doc
                .get_i64("semester")
                .and_then(|s| u32::try_from(s).ok())
                .unwrap_or_default(),
            is_email_verified: doc.get_bool("isEmailVerified").unwrap_or(false),
            created_at: doc.get_timestamp("createdAt").unwrap_or_default(),
        }
    }
}

/// Meeting point of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

/// Input of [`ActivityBoard::create_activity`](super::ActivityBoard::create_activity)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    /// Free-form date as entered by the creator
    pub date: String,
    /// Free-form time as entered by the creator
    pub time: String,
    pub budget: Option<u32>,
    pub location: Option<Location>,
}

impl NewActivity {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schedule(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.date = date.into();
        self.time = time.into();
        self
    }

    pub fn with_budget(mut self, amount: u32) -> Self {
        self.budget = Some(amount);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Activity in `activities/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub budget: Option<u32>,
    pub location: Option<Location>,
    pub creator_id: String,
    pub creator_name: String,
    pub created_at: DateTime<Utc>,
    /// Size of the participants subcollection when read; not stored
    #[serde(default)]
    pub participant_count: usize,
}

impl Activity {
    pub fn fields_for(input: &NewActivity, creator_id: &str, creator_name: &str, at: DateTime<Utc>) -> Fields {
        let location = input.location.as_ref();
        into_fields(json!({
            "title": input.title,
            "description": input.description,
            "date": input.date,
            "time": input.time,
            "hasBudget": input.budget.is_some(),
            "budgetAmount": input.budget.unwrap_or(0),
            "locationLat": location.map(|l| l.lat),
            "locationLng": location.map(|l| l.lng),
            "locationName": location.map(|l| l.name.clone()),
            "creatorId": creator_id,
            "creatorName": creator_name,
            "timestamp": timestamp_value(at),
        }))
    }

    /// `creatorId` is required since joins notify the creator.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let creator_id = doc.require_str("creatorId")?.to_string();

        let budget = if doc.get_bool("hasBudget").unwrap_or(false) {
            doc.get_i64("budgetAmount").and_then(|b| u32::try_from(b).ok())
        } else {
            None
        };

        let location = match (doc.get_f64("locationLat"), doc.get_f64("locationLng")) {
            (Some(lat), Some(lng)) => Some(Location {
                lat,
                lng,
                name: doc.get_str("locationName").unwrap_or_default().to_string(),
            }),
            _ => None,
        };

        Ok(Self {
            id: doc.id.clone(),
            title: doc.get_str("title").unwrap_or("Actividad").to_string(),
            description: doc.get_str("description").unwrap_or_default().to_string(),
            date: doc.get_str("date").unwrap_or_default().to_string(),
            time: doc.get_str("time").unwrap_or_default().to_string(),
            budget,
            location,
            creator_id,
            creator_name: doc.get_str("creatorName").unwrap_or(FALLBACK_NAME).to_string(),
            created_at: doc.get_timestamp("timestamp").unwrap_or_default(),
            participant_count: 0,
        })
    }
}

/// Member of `activities/{id}/participants/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn to_fields(&self) -> Fields {
        into_fields(json!({
            "userId": self.user_id,
            "userName": self.user_name,
            "joinedAt": timestamp_value(self.joined_at),
        }))
    }

    pub fn from_document(doc: &Document) -> Self {
        Self {
            user_id: doc.get_str("userId").unwrap_or(&doc.id).to_string(),
            user_name: doc.get_str("userName").unwrap_or(FALLBACK_NAME).to_string(),
            joined_at: doc.get_timestamp("joinedAt").unwrap_or_default(),
        }
    }
}

/// Question in `questions/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    /// Size of the responses subcollection when read; not stored
    #[serde(default)]
    pub response_count: usize,
}

impl Question {
    /// `userId` is required since answers notify the author.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            id: doc.id.clone(),
            text: doc.get_str("text").unwrap_or("Pregunta").to_string(),
            user_id: doc.require_str("userId")?.to_string(),
            user_name: doc.get_str("userName").unwrap_or(FALLBACK_NAME).to_string(),
            created_at: doc.get_timestamp("timestamp").unwrap_or_default(),
            response_count: 0,
        })
    }
}

/// Authored text entry; both questions and their responses are written in
/// this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    pub fn to_fields(&self) -> Fields {
        into_fields(json!({
            "text": self.text,
            "userId": self.user_id,
            "userName": self.user_name,
            "timestamp": timestamp_value(self.timestamp),
        }))
    }

    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            id: doc.id.clone(),
            text: doc.get_str("text").unwrap_or_default().to_string(),
            user_id: doc.require_str("userId")?.to_string(),
            user_name: doc.get_str("userName").unwrap_or(FALLBACK_NAME).to_string(),
            timestamp: doc.get_timestamp("timestamp").unwrap_or_default(),
        })
    }
}
