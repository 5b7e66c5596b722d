//! Activity board: activities, their participants, and the join
//! notification sent to the creator.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{Activity, NewActivity, Participant};
use super::users::UserDirectory;
use crate::identity::IdentityProvider;
use crate::storage::{collections, Direction, Query, SharedStore, WriteBatch};
use crate::sync::{Actor, NotificationEmitter, SyncError, SyncResult};

#[derive(Clone)]
pub struct ActivityBoard {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
    users: UserDirectory,
    emitter: NotificationEmitter,
}

impl ActivityBoard {
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

    fn participants_path(activity_id: &str) -> String {
        collections::subcollection(collections::ACTIVITIES, activity_id, collections::PARTICIPANTS)
    }

    /// Create an activity with the current user as creator and first
    /// participant. Both records land in one batch.
    pub async fn create_activity(&self, input: NewActivity) -> SyncResult<String> {
        let user = self.identity.current_user().ok_or(SyncError::Unauthenticated)?;
        let creator_name = self.users.display_name_for(&user).await;
        let now = Utc::now();
        let activity_id = Uuid::new_v4().to_string();

        let creator = Participant {
            user_id: user.uid.clone(),
            user_name: creator_name.clone(),
            joined_at: now,
        };

        let mut batch = WriteBatch::new();
        batch
            .set(
                collections::ACTIVITIES,
                activity_id.as_str(),
                Activity::fields_for(&input, &user.uid, &creator_name, now),
            )
            .set(Self::participants_path(&activity_id), user.uid.as_str(), creator.to_fields());
        self.store.commit(batch).await?;

        info!("Activity {} '{}' created by {}", activity_id, input.title, user.uid);
        Ok(activity_id)
    }

    async fn participant_count(&self, activity_id: &str) -> usize {
        match self.store.query(&Query::collection(Self::participants_path(activity_id))).await {
            Ok(docs) => docs.len(),
            Err(e) => {
                debug!("Participant count of {} unavailable: {}", activity_id, e);
                0
            }
        }
    }

    pub async fn get_activity(&self, activity_id: &str) -> SyncResult<Option<Activity>> {
        let Some(doc) = self.store.get(collections::ACTIVITIES, activity_id).await? else {
            return Ok(None);
        };
        let mut activity = Activity::from_document(&doc)?;
        activity.participant_count = self.participant_count(activity_id).await;
        Ok(Some(activity))
    }

    /// Every activity, newest first, with participant counts. Empty when the
    /// read fails.
    pub async fn list_activities(&self) -> Vec<Activity> {
        let query = Query::collection(collections::ACTIVITIES).order_by("timestamp", Direction::Descending);
        let docs = match self.store.query(&query).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Failed to list activities: {}", e);
                return Vec::new();
            }
        };

        let mut activities = Vec::with_capacity(docs.len());
        for doc in &docs {
            match Activity::from_document(doc) {
                Ok(mut activity) => {
                    activity.participant_count = self.participant_count(&activity.id).await;
                    activities.push(activity);
                }
                Err(e) => warn!("Skipping activity: {}", e),
            }
        }
        activities
    }

    /// Join as the current user and notify the creator.
    ///
    /// Returns `false` when nobody is signed in, the activity is missing or
    /// the participant write fails. The notification never changes the result.
    pub async fn join_activity(&self, activity_id: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            return false;
        };

        let activity = match self.get_activity(activity_id).await {
            Ok(Some(activity)) => activity,
            Ok(None) => {
                warn!("join_activity: {} does not exist", activity_id);
                return false;
            }
            Err(e) => {
                error!("join_activity: cannot read {}: {}", activity_id, e);
                return false;
            }
        };

        let user_name = self.users.display_name_for(&user).await;
        let participant = Participant {
            user_id: user.uid.clone(),
            user_name: user_name.clone(),
            joined_at: Utc::now(),
        };

        if let Err(e) = self
            .store
            .set(&Self::participants_path(activity_id), &user.uid, participant.to_fields())
            .await
        {
            error!("Failed to add {} to activity {}: {}", user.uid, activity_id, e);
            return false;
        }

        info!("{} joined activity {}", user.uid, activity_id);
        let actor = Actor::new(user.uid, user_name);
        self.emitter
            .notify_new_participant(&activity.creator_id, &actor, activity_id, &activity.title)
            .await;
        true
    }

    pub async fn leave_activity(&self, activity_id: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            return false;
        };
        match self.store.delete(&Self::participants_path(activity_id), &user.uid).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to remove {} from activity {}: {}", user.uid, activity_id, e);
                false
            }
        }
    }

    pub async fn is_participating(&self, activity_id: &str) -> bool {
        let Some(user) = self.identity.current_user() else {
            return false;
        };
        match self.store.get(&Self::participants_path(activity_id), &user.uid).await {
            Ok(doc) => doc.is_some(),
            Err(e) => {
                warn!("is_participating({}) failed: {}", activity_id, e);
                false
            }
        }
    }

    /// Participants in join order
    pub async fn participants(&self, activity_id: &str) -> Vec<Participant> {
        let query = Query::collection(Self::participants_path(activity_id)).order_by("joinedAt", Direction::Ascending);
        match self.store.query(&query).await {
            Ok(docs) => docs.iter().map(Participant::from_document).collect(),
            Err(e) => {
                warn!("Failed to list participants of {}: {}", activity_id, e);
                Vec::new()
            }
        }
    }

    /// Activities the current user takes part in, newest first
    pub async fn my_activities(&self) -> Vec<Activity> {
        if self.identity.current_user().is_none() {
            return Vec::new();
        }

        let mut mine = Vec::new();
        for activity in self.list_activities().await {
            if self.is_participating(&activity.id).await {
                mine.push(activity);
            }
        }
        mine
    }
}
