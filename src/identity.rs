//! Identity context: who is signed in on this device.
//!
//! Authentication itself is handled by the external auth provider; the
//! services only ask it for the current user.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Name shown when a user has neither a display name nor an email
pub const FALLBACK_NAME: &str = "Usuario";

/// The authenticated user as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl CurrentUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Display name, else email, else [`FALLBACK_NAME`]. Blank values are skipped.
    pub fn best_display_name(&self) -> String {
        [self.display_name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_NAME)
            .to_string()
    }
}

/// Source of the current user
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// In-process session holder fed by the auth flow
#[derive(Debug, Default)]
pub struct SessionIdentity {
    user: RwLock<Option<CurrentUser>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: CurrentUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: CurrentUser) {
        *self.user.write() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_display_name_chain() {
        let full = CurrentUser::new("u1")
            .with_display_name("Ana")
            .with_email("ana@utadeo.edu.co");
        assert_eq!(full.best_display_name(), "Ana");

        let email_only = CurrentUser::new("u1").with_email("ana@utadeo.edu.co");
        assert_eq!(email_only.best_display_name(), "ana@utadeo.edu.co");

        let blank = CurrentUser::new("u1").with_display_name("  ");
        assert_eq!(blank.best_display_name(), FALLBACK_NAME);
    }

    #[test]
    fn test_session_sign_in_out() {
        let session = SessionIdentity::new();
        assert!(session.current_user().is_none());

        session.sign_in(CurrentUser::new("u1"));
        assert_eq!(session.current_user().map(|u| u.uid), Some("u1".to_string()));

        session.sign_out();
        assert!(session.current_user().is_none());
    }
}
