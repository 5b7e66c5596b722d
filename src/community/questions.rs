//! Question board: questions, their responses, and the answer notification
//! sent to the author.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::model::{Question, Response};
use super::users::UserDirectory;
use crate::identity::IdentityProvider;
use crate::storage::{collections, Direction, Query, SharedStore};
use crate::sync::{Actor, NotificationEmitter, SyncError, SyncResult};

#[derive(Clone)]
pub struct QuestionBoard {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
    users: UserDirectory,
    emitter: NotificationEmitter,
}

impl QuestionBoard {
    pub fn new(
        store: SharedStore,
        identity: Arc<dyn IdentityProvider>,
        users: UserDirectory,
        emitter: NotificationEmitter,
    ) -> Self {
        Self {
            store,
            identity,
            users,
            emitter,
        }
    }

    fn responses_path(question_id: &str) -> String {
        collections::subcollection(collections::QUESTIONS, question_id, collections::RESPONSES)
    }

    /// Post a question as the current user. Blank text is ignored and
    /// yields `Ok(None)`.
    pub async fn add_question(&self, text: &str) -> SyncResult<Option<String>> {
        let user = self.identity.current_user().ok_or(SyncError::Unauthenticated)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let entry = Response {
            id: String::new(),
            text: text.to_string(),
            user_id: user.uid.clone(),
            user_name: self.users.display_name_for(&user).await,
            timestamp: Utc::now(),
        };
        let id = self.store.add(collections::QUESTIONS, entry.to_fields()).await?;

        info!("Question {} posted by {}", id, user.uid);
        Ok(Some(id))
    }

    async fn response_count(&self, question_id: &str) -> usize {
        match self.store.query(&Query::collection(Self::responses_path(question_id))).await {
            Ok(docs) => docs.len(),
            Err(_) => 0,
        }
    }

    pub async fn get_question(&self, question_id: &str) -> SyncResult<Option<Question>> {
        let Some(doc) = self.store.get(collections::QUESTIONS, question_id).await? else {
            return Ok(None);
        };
        let mut question = Question::from_document(&doc)?;
        question.response_count = self.response_count(question_id).await;
        Ok(Some(question))
    }

    /// Every question, newest first, with response counts. Empty when the
    /// read fails.
    pub async fn list_questions(&self) -> Vec<Question> {
        let query = Query::collection(collections::QUESTIONS).order_by("timestamp", Direction::Descending);
        let docs = match self.store.query(&query).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Failed to list questions: {}", e);
                return Vec::new();
            }
        };

        let mut questions = Vec::with_capacity(docs.len());
        for doc in &docs {
            match Question::from_document(doc) {
                Ok(mut question) => {
                    question.response_count = self.response_count(&question.id).await;
                    questions.push(question);
                }
                Err(e) => warn!("Skipping question: {}", e),
            }
        }
        questions
    }

    /// Answer as the current user and notify the author.
    ///
    /// Returns `false` when nobody is signed in, the text is blank, the
    /// question is missing or the response write fails.
    pub async fn answer_question(&self, question_id: &str, text: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            return false;
        };
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let question = match self.get_question(question_id).await {
            Ok(Some(question)) => question,
            Ok(None) => {
                warn!("answer_question: {} does not exist", question_id);
                return false;
            }
            Err(e) => {
                error!("answer_question: cannot read {}: {}", question_id, e);
                return false;
            }
        };

        let user_name = self.users.display_name_for(&user).await;
        let response = Response {
            id: String::new(),
            text: text.to_string(),
            user_id: user.uid.clone(),
            user_name: user_name.clone(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self
            .store
            .add(&Self::responses_path(question_id), response.to_fields())
            .await
        {
            error!("Failed to store answer to {}: {}", question_id, e);
            return false;
        }

        info!("{} answered question {}", user.uid, question_id);
        let actor = Actor::new(user.uid, user_name);
        self.emitter
            .notify_new_answer(&question.user_id, &actor, question_id, &question.text)
            .await;
        true
    }

    /// Responses in posting order. Malformed ones are skipped.
    pub async fn responses(&self, question_id: &str) -> Vec<Response> {
        let query = Query::collection(Self::responses_path(question_id)).order_by("timestamp", Direction::Ascending);
        match self.store.query(&query).await {
            Ok(docs) => docs
                .iter()
                .filter_map(|doc| match Response::from_document(doc) {
                    Ok(response) => Some(response),
                    Err(e) => {
                        warn!("Skipping response: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Failed to list responses of {}: {}", question_id, e);
                Vec::new()
            }
        }
    }

    pub async fn has_user_responded(&self, question_id: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            return false;
        };
        let query = Query::collection(Self::responses_path(question_id))
            .where_eq("userId", Value::String(user.uid.clone()))
            .limit(1);
        match self.store.query(&query).await {
            Ok(docs) => !docs.is_empty(),
            Err(e) => {
                warn!("has_user_responded({}) failed: {}", question_id, e);
                false
            }
        }
    }

    pub async fn delete_response(&self, question_id: &str, response_id: &str) -> bool {
        match self.store.delete(&Self::responses_path(question_id), response_id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete response {} of {}: {}", response_id, question_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CurrentUser, SessionIdentity};
    use crate::storage::DocumentStore;
    use crate::sync::{Notification, NotificationType};
    use crate::testing::{session, temp_store, FlakyStore, Op};

    fn board(store: SharedStore, identity: Arc<dyn IdentityProvider>) -> QuestionBoard {
        QuestionBoard::new(
            store.clone(),
            identity.clone(),
            UserDirectory::new(store.clone(), identity),
            NotificationEmitter::new(store),
        )
    }

    async fn notifications(store: &SharedStore) -> Vec<Notification> {
        store
            .query(&Query::collection(collections::NOTIFICATIONS))
            .await
            .unwrap()
            .iter()
            .map(|doc| Notification::from_document(doc).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_blank_question_is_ignored() {
        let store: SharedStore = temp_store();
        let ana = board(store.clone(), session(CurrentUser::new("ana")));

        assert_eq!(ana.add_question("   ").await.unwrap(), None);
        assert!(ana.list_questions().await.is_empty());

        let anonymous = board(store, Arc::new(SessionIdentity::new()));
        assert!(matches!(anonymous.add_question("¿Qué?").await, Err(SyncError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_answer_notifies_author() {
        let store: SharedStore = temp_store();
        let ana = board(store.clone(), session(CurrentUser::new("ana").with_display_name("Ana")));
        let id = ana.add_question("  ¿Dónde almorzamos?  ").await.unwrap().unwrap();

        let bob = board(store.clone(), session(CurrentUser::new("bob").with_display_name("Bob")));
        assert!(!bob.has_user_responded(&id).await);
        assert!(bob.answer_question(&id, "En la cafetería").await);
        assert!(bob.has_user_responded(&id).await);
        assert!(!ana.has_user_responded(&id).await);

        let sent = notifications(&store).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationType::NewAnswer);
        assert_eq!(sent[0].user_id, "ana");
        assert_eq!(sent[0].message, "Bob respondió tu pregunta");
        assert_eq!(sent[0].target_title, "¿Dónde almorzamos?");

        let question = ana.get_question(&id).await.unwrap().unwrap();
        assert_eq!(question.response_count, 1);
        assert_eq!(ana.responses(&id).await[0].user_name, "Bob");
    }

    #[tokio::test]
    async fn test_answering_own_question_is_silent() {
        let store: SharedStore = temp_store();
        let ana = board(store.clone(), session(CurrentUser::new("ana")));
        let id = ana.add_question("¿Alguien juega?").await.unwrap().unwrap();

        assert!(ana.answer_question(&id, "Yo").await);
        assert!(notifications(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_answer_rejections() {
        let store: SharedStore = temp_store();
        let ana = board(store.clone(), session(CurrentUser::new("ana")));
        let id = ana.add_question("¿Alguien juega?").await.unwrap().unwrap();

        assert!(!ana.answer_question(&id, "  ").await);
        assert!(!ana.answer_question("ghost", "hola").await);
        assert!(!board(store, Arc::new(SessionIdentity::new())).answer_question(&id, "hola").await);
    }

    #[tokio::test]
    async fn test_responses_in_order_and_delete() {
        let store: SharedStore = temp_store();
        let ana = board(store.clone(), session(CurrentUser::new("ana")));
        let id = ana.add_question("¿Plan?").await.unwrap().unwrap();

        assert!(ana.answer_question(&id, "primero").await);
        assert!(ana.answer_question(&id, "segundo").await);

        let responses = ana.responses(&id).await;
        let texts: Vec<&str> = responses.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["primero", "segundo"]);

        assert!(ana.delete_response(&id, &responses[0].id).await);
        assert_eq!(ana.responses(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_write_failure() {
        let flaky = Arc::new(FlakyStore::new(temp_store()));
        let ana = board(flaky.clone(), session(CurrentUser::new("ana")));
        let id = ana.add_question("¿Plan?").await.unwrap().unwrap();

        flaky.fail_on(Op::Add, collections::RESPONSES);
        let bob = board(flaky.clone(), session(CurrentUser::new("bob")));
        assert!(!bob.answer_question(&id, "sí").await);
        assert!(notifications(&(flaky.inner().clone() as SharedStore)).await.is_empty());
    }
}
