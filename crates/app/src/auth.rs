//! Explicit authentication context.
//!
//! Every service operation receives the caller's identity as a value instead
//! of looking it up from ambient session state. Contexts are produced by
//! [`crate::services::ProvisioningService`] from an identity-provider session,
//! or built directly in tests and operator tooling.

use serde::{Deserialize, Serialize};

use tutaville_core::{Email, Role, UserId};

use crate::error::DomainError;
use crate::models::Profile;

/// Who is calling, and with which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Identity-provider user id (equal to the profile id).
    pub user_id: UserId,
    /// Email on the session, when known.
    pub email: Option<Email>,
    /// Role read from the caller's profile.
    pub role: Role,
}

impl AuthContext {
    /// Build a context from its parts.
    #[must_use]
    pub const fn new(user_id: UserId, email: Option<Email>, role: Role) -> Self {
        Self {
            user_id,
            email,
            role,
        }
    }

    /// Build a context for the owner of `profile`.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.id, profile.email.clone(), profile.role)
    }

    /// Returns true if the caller is an administrator.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Require the admin role.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Forbidden` for tutors.
    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Forbidden("administrator role required"))
        }
    }

    /// Require that the caller is `user_id` or an administrator.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Forbidden` when a tutor acts on someone else.
    pub fn require_self_or_admin(&self, user_id: UserId) -> Result<(), DomainError> {
        if self.is_admin() || self.user_id == user_id {
            Ok(())
        } else {
            Err(DomainError::Forbidden("tutors may only act on their own records"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_passes_every_check() {
        let ctx = AuthContext::new(UserId::generate(), None, Role::Admin);
        assert!(ctx.require_admin().is_ok());
        assert!(ctx.require_self_or_admin(UserId::generate()).is_ok());
    }

    #[test]
    fn test_tutor_limited_to_self() {
        let me = UserId::generate();
        let ctx = AuthContext::new(me, None, Role::Tutor);
        assert!(matches!(ctx.require_admin(), Err(DomainError::Forbidden(_))));
        assert!(ctx.require_self_or_admin(me).is_ok());
        assert!(matches!(
            ctx.require_self_or_admin(UserId::generate()),
            Err(DomainError::Forbidden(_))
        ));
    }
}
