use std::sync::Arc;
use tracing::{debug, warn};

use super::model::UserProfile;
use crate::identity::{CurrentUser, IdentityProvider};
use crate::storage::{collections, SharedStore};
use crate::sync::{SyncError, SyncResult};

/// Read/write access to `users/{uid}` profiles
#[derive(Clone)]
pub struct UserDirectory {
    store: SharedStore,
    identity: Arc<dyn IdentityProvider>,
}

impl UserDirectory {
    pub fn new(store: SharedStore, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Store the current user's profile. The uid always comes from the
    /// session, never from the payload.
    pub async fn save_profile(&self, profile: &UserProfile) -> SyncResult<()> {
        let user = self.identity.current_user().ok_or(SyncError::Unauthenticated)?;

        let mut fields = profile.to_fields();
        fields.insert("uid".to_string(), user.uid.clone().into());

        let existing = self.store.get(collections::USERS, &user.uid).await?;
        if existing.is_some() {
            self.store.update(collections::USERS, &user.uid, fields).await?;
        } else {
            self.store.set(collections::USERS, &user.uid, fields).await?;
        }
        debug!("Profile of {} saved", user.uid);
        Ok(())
    }

    pub async fn get_profile(&self, uid: &str) -> SyncResult<Option<UserProfile>> {
        Ok(self
            .store
            .get(collections::USERS, uid)
            .await?
            .map(|doc| UserProfile::from_document(&doc)))
    }

    /// Name shown for `user` in records they author: the profile display
    /// name, else the session's best display name.
    pub async fn display_name_for(&self, user: &CurrentUser) -> String {
        match self.get_profile(&user.uid).await {
            Ok(Some(profile)) if !profile.display_name.trim().is_empty() => profile.display_name,
            Ok(_) => user.best_display_name(),
            Err(e) => {
                warn!("Profile of {} unavailable: {}", user.uid, e);
                user.best_display_name()
            }
        }
    }
}
