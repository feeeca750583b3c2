//! Role resolution.
//!
//! Maps an identity-provider session to an [`AuthContext`], creating the
//! caller's profile on first sign-in.

use tracing::{info, instrument, warn};

use tutaville_core::{Email, Role};

use crate::auth::AuthContext;
use crate::error::DomainError;
use crate::identity::{IdentityProvider, Session};
use crate::models::{NewProfile, Profile};
use crate::store::{DataStore, PROFILES_EMAIL_KEY};

/// Resolves sessions into auth contexts.
pub struct ProvisioningService<'a, S, I> {
    store: &'a S,
    identity: &'a I,
    bootstrap_admin: Option<&'a Email>,
}

impl<'a, S: DataStore, I: IdentityProvider> ProvisioningService<'a, S, I> {
    /// `bootstrap_admin` is the address that is always given the admin role.
    #[must_use]
    pub const fn new(store: &'a S, identity: &'a I, bootstrap_admin: Option<&'a Email>) -> Self {
        Self {
            store,
            identity,
            bootstrap_admin,
        }
    }

    fn is_bootstrap(&self, email: Option<&Email>) -> bool {
        matches!((self.bootstrap_admin, email), (Some(admin), Some(email)) if admin == email)
    }

    /// Build the caller's context, provisioning a profile when none exists.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEmail` if another profile already claims the
    /// session's email, or `Store` on backend failure.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn resolve(&self, session: &Session) -> Result<AuthContext, DomainError> {
        let bootstrap = self.is_bootstrap(session.email.as_ref());

        if let Some(profile) = self.store.profile(session.user_id).await? {
            let profile = self.correct_bootstrap_role(profile, bootstrap).await?;
            return Ok(AuthContext::new(session.user_id, session.email.clone(), profile.role));
        }

        let role = if bootstrap { Role::Admin } else { Role::Tutor };
        let new = NewProfile {
            id: session.user_id,
            role,
            first_name: None,
            last_name: None,
            email: session.email.clone(),
            phone: None,
        };
        match self.store.upsert_profile(&new).await {
            Ok(profile) => {
                info!(role = %profile.role, "Profile provisioned on first sign-in");
                Ok(AuthContext::new(session.user_id, session.email.clone(), profile.role))
            }
            Err(e) if e.is_conflict_on(PROFILES_EMAIL_KEY) => match new.email {
                Some(email) => Err(DomainError::DuplicateEmail(email)),
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn correct_bootstrap_role(
        &self,
        profile: Profile,
        bootstrap: bool,
    ) -> Result<Profile, DomainError> {
        if !bootstrap || profile.role.is_admin() {
            return Ok(profile);
        }
        warn!("Bootstrap administrator had the tutor role; promoting");
        Ok(self
            .store
            .set_role(profile.id, Role::Admin)
            .await?
            .unwrap_or(Profile {
                role: Role::Admin,
                ..profile
            }))
    }

    /// Resolve the current session.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when nobody is signed in.
    pub async fn current_context(&self) -> Result<AuthContext, DomainError> {
        let session = self
            .identity
            .current_session()
            .await?
            .ok_or(DomainError::Unauthenticated)?;
        self.resolve(&session).await
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns `Identity` if the provider call fails.
    pub async fn sign_out(&self) -> Result<(), DomainError> {
        Ok(self.identity.sign_out().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentity;
    use crate::services::fixtures;
    use crate::store::{MemoryStore, StoreOp};

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_tutor_profile() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        identity.sign_in(&email("new@x.org")).await;

        let ctx = ProvisioningService::new(&store, &identity, None)
            .current_context()
            .await
            .unwrap();
        assert_eq!(ctx.role, Role::Tutor);

        let profile = store.profile(ctx.user_id).await.unwrap().unwrap();
        assert_eq!(profile.email, Some(email("new@x.org")));
    }

    #[tokio::test]
    async fn test_bootstrap_email_becomes_admin_case_insensitively() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let bootstrap = email("Boss@X.org");
        identity.sign_in(&email("boss@x.org")).await;

        let ctx = ProvisioningService::new(&store, &identity, Some(&bootstrap))
            .current_context()
            .await
            .unwrap();
        assert!(ctx.is_admin());
    }

    #[tokio::test]
    async fn test_bootstrap_tutor_is_promoted() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let existing = fixtures::tutor(&store, "Boss", "boss@x.org").await;
        let bootstrap = email("boss@x.org");
        let session = Session {
            user_id: existing.id,
            email: Some(bootstrap.clone()),
        };

        let ctx = ProvisioningService::new(&store, &identity, Some(&bootstrap))
            .resolve(&session)
            .await
            .unwrap();
        assert_eq!(ctx.role, Role::Admin);
        assert_eq!(store.calls_to(StoreOp::SetRole).await, 1);
        assert_eq!(
            store.profile(existing.id).await.unwrap().unwrap().role,
            Role::Admin
        );
    }

    #[tokio::test]
    async fn test_existing_profile_keeps_role() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let alice = fixtures::tutor(&store, "Alice", "alice@x.org").await;
        let session = Session {
            user_id: alice.id,
            email: alice.email.clone(),
        };

        let ctx = ProvisioningService::new(&store, &identity, None)
            .resolve(&session)
            .await
            .unwrap();
        assert_eq!(ctx, AuthContext::from_profile(&alice));
        assert_eq!(store.calls_to(StoreOp::UpsertProfile).await, 1);
    }

    #[tokio::test]
    async fn test_email_claimed_by_another_profile() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        fixtures::tutor(&store, "Alice", "alice@x.org").await;
        let session = identity.sign_in(&email("alice@x.org")).await;

        let err = ProvisioningService::new(&store, &identity, None)
            .resolve(&session)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn test_signed_out_is_unauthenticated() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        identity.sign_in(&email("alice@x.org")).await;
        let provisioning = ProvisioningService::new(&store, &identity, None);

        provisioning.sign_out().await.unwrap();
        let err = provisioning.current_context().await.unwrap_err();
        assert!(matches!(err, DomainError::Unauthenticated));
    }
}
