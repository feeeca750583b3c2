//! Roster management: subjects, tutors and per-subject rates.
//!
//! Uniqueness is checked up front and again by the store's constraints, so
//! a race between two administrators still ends in `DuplicateName` or
//! `DuplicateEmail` rather than a raw conflict.

use std::collections::HashSet;

use rand::Rng;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use tutaville_core::{Email, HourlyRate, Role, SubjectId, UserId};

use crate::auth::AuthContext;
use crate::error::{DomainError, ValidationError, optional_phone, required_text};
use crate::identity::{Account, AccountMetadata, IdentityError, IdentityProvider};
use crate::models::{
    AssignedSubject, AssignmentDraft, NewProfile, Profile, ProfileUpdate, Subject,
    TutorAssignment,
};
use crate::store::{
    CascadePlan, CascadeReport, DataStore, PROFILES_EMAIL_KEY, SUBJECTS_NAME_KEY, StoreError,
};

/// Maximum length of a subject name.
pub const MAX_SUBJECT_NAME_LENGTH: usize = 100;

/// Maximum length of a first or last name.
pub const MAX_PERSON_NAME_LENGTH: usize = 100;

const TEMPORARY_PASSWORD_LENGTH: usize = 24;

// =============================================================================
// Inputs and outputs
// =============================================================================

/// An administrator's request to bring a new tutor on board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorInvite {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// One entry of a desired assignment set, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRate {
    pub subject_id: SubjectId,
    pub rate_per_hour: Decimal,
}

/// How a new tutor was told about their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InviteDelivery {
    /// The identity provider sent an invitation link.
    Invitation,
    /// The account was created with a random password. `recovery_sent` is
    /// false when the follow-up reset email could not be requested.
    TemporaryPassword { recovery_sent: bool },
}

/// Result of a successful invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvite {
    pub profile: Profile,
    pub delivery: InviteDelivery,
}

/// Validated invitation fields.
struct CheckedInvite {
    email: Email,
    first_name: String,
    last_name: String,
    phone: Option<String>,
}

impl TryFrom<&TutorInvite> for CheckedInvite {
    type Error = ValidationError;

    fn try_from(invite: &TutorInvite) -> Result<Self, Self::Error> {
        Ok(Self {
            email: Email::parse(&invite.email)?,
            first_name: required_text("first name", &invite.first_name, MAX_PERSON_NAME_LENGTH)?,
            last_name: required_text("last name", &invite.last_name, MAX_PERSON_NAME_LENGTH)?,
            phone: optional_phone(invite.phone.as_deref())?,
        })
    }
}

fn temporary_password() -> SecretString {
    let password: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TEMPORARY_PASSWORD_LENGTH)
        .map(char::from)
        .collect();
    SecretString::from(password)
}

/// Trim and bound the name fields, validate the phone, reject no-ops.
fn check_update(update: ProfileUpdate) -> Result<ProfileUpdate, ValidationError> {
    if update.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }
    Ok(ProfileUpdate {
        first_name: update
            .first_name
            .map(|v| required_text("first name", &v, MAX_PERSON_NAME_LENGTH))
            .transpose()?,
        last_name: update
            .last_name
            .map(|v| required_text("last name", &v, MAX_PERSON_NAME_LENGTH))
            .transpose()?,
        email: update.email,
        phone: update
            .phone
            .map(|v| optional_phone(v.as_deref()))
            .transpose()?,
    })
}

/// Convert desired rates into drafts, rejecting bad rates and repeats.
fn check_rates(desired: &[DesiredRate]) -> Result<Vec<AssignmentDraft>, ValidationError> {
    let mut seen = HashSet::with_capacity(desired.len());
    desired
        .iter()
        .map(|d| {
            if !seen.insert(d.subject_id) {
                return Err(ValidationError::DuplicateSubject(d.subject_id));
            }
            Ok(AssignmentDraft {
                subject_id: d.subject_id,
                rate_per_hour: HourlyRate::new(d.rate_per_hour)?,
            })
        })
        .collect()
}

// =============================================================================
// Service
// =============================================================================

/// Subjects, tutors and their rates.
///
/// Only [`RosterService::invite_tutor`] talks to the identity provider; the
/// rest works on a service built with [`RosterService::without_identity`].
pub struct RosterService<'a, S, I> {
    store: &'a S,
    identity: &'a I,
}

impl<'a, S, I> RosterService<'a, S, I> {
    #[must_use]
    pub const fn new(store: &'a S, identity: &'a I) -> Self {
        Self { store, identity }
    }
}

impl<'a, S: DataStore> RosterService<'a, S, ()> {
    /// A service that cannot invite tutors.
    #[must_use]
    pub const fn without_identity(store: &'a S) -> Self {
        Self {
            store,
            identity: &(),
        }
    }
}

impl<S: DataStore, I> RosterService<'_, S, I> {
    // --- subjects ---

    /// All subjects ordered by name. Any signed-in user may read them.
    ///
    /// # Errors
    ///
    /// Returns `Store` on backend failure.
    pub async fn list_subjects(&self, _ctx: &AuthContext) -> Result<Vec<Subject>, DomainError> {
        Ok(self.store.subjects().await?)
    }

    /// Create a subject.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty or over-long name
    /// - `DuplicateName` if the name exists in any letter case
    #[instrument(skip(self, ctx), fields(caller = %ctx.user_id))]
    pub async fn add_subject(&self, ctx: &AuthContext, name: &str) -> Result<Subject, DomainError> {
        ctx.require_admin()?;
        let name = required_text("subject name", name, MAX_SUBJECT_NAME_LENGTH)?;

        if self.store.subject_by_name(&name).await?.is_some() {
            return Err(DomainError::DuplicateName(name));
        }

        match self.store.insert_subject(&name).await {
            Ok(subject) => {
                info!(subject_id = %subject.id, name = %subject.name, "Subject added");
                Ok(subject)
            }
            Err(e) if e.is_conflict_on(SUBJECTS_NAME_KEY) => Err(DomainError::DuplicateName(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a subject with its assignments, keeping its timesheets.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such subject exists. On a backend failure
    /// nothing is deleted.
    #[instrument(skip(self, ctx), fields(caller = %ctx.user_id))]
    pub async fn delete_subject(
        &self,
        ctx: &AuthContext,
        subject_id: SubjectId,
    ) -> Result<CascadeReport, DomainError> {
        ctx.require_admin()?;
        let report = self
            .store
            .execute(&CascadePlan::delete_subject(subject_id))
            .await?;
        if !report.root_deleted() {
            return Err(DomainError::not_found("subject", subject_id));
        }
        info!("Subject deleted");
        Ok(report)
    }

    // --- tutors ---

    /// All tutor profiles, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for tutors, `Store` on backend failure.
    pub async fn list_tutors(&self, ctx: &AuthContext) -> Result<Vec<Profile>, DomainError> {
        ctx.require_admin()?;
        Ok(self.store.profiles_with_role(Role::Tutor).await?)
    }

    /// Change a tutor's contact fields. Tutors may edit only themselves.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty update or bad field values
    /// - `DuplicateEmail` if another profile has the new email
    /// - `NotFound` if the profile does not exist
    #[instrument(skip(self, ctx, update), fields(caller = %ctx.user_id))]
    pub async fn update_tutor(
        &self,
        ctx: &AuthContext,
        tutor_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, DomainError> {
        ctx.require_self_or_admin(tutor_id)?;
        let update = check_update(update)?;

        if let Some(email) = &update.email
            && let Some(owner) = self.store.profile_by_email(email).await?
            && owner.id != tutor_id
        {
            return Err(DomainError::DuplicateEmail(email.clone()));
        }

        match self.store.update_profile(tutor_id, &update).await {
            Ok(Some(profile)) => {
                info!("Tutor profile updated");
                Ok(profile)
            }
            Ok(None) => Err(DomainError::not_found("tutor", tutor_id)),
            Err(e) if e.is_conflict_on(PROFILES_EMAIL_KEY) => match update.email {
                Some(email) => Err(DomainError::DuplicateEmail(email)),
                None => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a tutor's profile and assignments, keeping their timesheets.
    ///
    /// The identity account is left in place.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Forbidden` for an admin
    /// profile.
    #[instrument(skip(self, ctx), fields(caller = %ctx.user_id))]
    pub async fn delete_tutor(
        &self,
        ctx: &AuthContext,
        tutor_id: UserId,
    ) -> Result<CascadeReport, DomainError> {
        ctx.require_admin()?;
        let target = self
            .store
            .profile(tutor_id)
            .await?
            .ok_or_else(|| DomainError::not_found("tutor", tutor_id))?;
        if target.role.is_admin() {
            return Err(DomainError::Forbidden("administrator profiles cannot be deleted"));
        }

        let report = self.store.execute(&CascadePlan::delete_tutor(tutor_id)).await?;
        if !report.root_deleted() {
            return Err(DomainError::not_found("tutor", tutor_id));
        }
        info!("Tutor deleted");
        Ok(report)
    }

    // --- assignments ---

    /// A tutor's subjects and rates.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if a tutor asks about someone else.
    pub async fn assignments_for(
        &self,
        ctx: &AuthContext,
        tutor_id: UserId,
    ) -> Result<Vec<AssignedSubject>, DomainError> {
        ctx.require_self_or_admin(tutor_id)?;
        Ok(self.store.assignments_for_tutor(tutor_id).await?)
    }

    /// Replace a tutor's whole assignment set with `desired`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative rate or a repeated subject
    /// - `NotFound` if the tutor or any subject does not exist
    /// - `Forbidden` if the target is not a tutor
    #[instrument(skip(self, ctx, desired), fields(caller = %ctx.user_id, count = desired.len()))]
    pub async fn set_assignments(
        &self,
        ctx: &AuthContext,
        tutor_id: UserId,
        desired: &[DesiredRate],
    ) -> Result<Vec<TutorAssignment>, DomainError> {
        ctx.require_admin()?;
        let drafts = check_rates(desired)?;

        let target = self
            .store
            .profile(tutor_id)
            .await?
            .ok_or_else(|| DomainError::not_found("tutor", tutor_id))?;
        if target.role != Role::Tutor {
            return Err(DomainError::Forbidden("rates can only be assigned to tutors"));
        }
        for draft in &drafts {
            if self.store.subject(draft.subject_id).await?.is_none() {
                return Err(DomainError::not_found("subject", draft.subject_id));
            }
        }

        let assignments = self
            .store
            .replace_assignments(tutor_id, &drafts)
            .await
            .map_err(|e| match e {
                StoreError::ForeignKey { .. } => DomainError::not_found("tutor or subject", tutor_id),
                other => other.into(),
            })?;
        info!(count = assignments.len(), "Assignments replaced");
        Ok(assignments)
    }
}

impl<S: DataStore, I: IdentityProvider> RosterService<'_, S, I> {
    /// Create an identity account for a new tutor and record their profile.
    ///
    /// Uses an emailed invitation when the provider supports it, otherwise a
    /// random password followed by a password-reset email.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed email, blank names or a bad phone
    /// - `DuplicateEmail` if a profile or account already uses the address
    /// - `Identity` if the account could not be created, or if it was
    ///   created but could not be read back (flagged by
    ///   [`DomainError::may_be_inconsistent`])
    /// - `PartialInviteFailure` if the account exists but the profile write
    ///   failed
    #[instrument(skip(self, ctx, invite), fields(caller = %ctx.user_id))]
    pub async fn invite_tutor(
        &self,
        ctx: &AuthContext,
        invite: &TutorInvite,
    ) -> Result<PendingInvite, DomainError> {
        ctx.require_admin()?;
        let checked = CheckedInvite::try_from(invite)?;

        if self.store.profile_by_email(&checked.email).await?.is_some() {
            return Err(DomainError::DuplicateEmail(checked.email));
        }

        let metadata = AccountMetadata {
            first_name: checked.first_name.clone(),
            last_name: checked.last_name.clone(),
            phone: checked.phone.clone(),
            role: Role::Tutor,
        };
        let (account, delivery) = self
            .create_account(&checked.email, &metadata)
            .await
            .inspect_err(|e| {
                if e.may_be_inconsistent() {
                    error!(
                        email = %checked.email,
                        error = %e,
                        "Account may exist but its id could not be read"
                    );
                }
            })?;

        let profile = NewProfile {
            id: account.user_id,
            role: Role::Tutor,
            first_name: Some(checked.first_name),
            last_name: Some(checked.last_name),
            email: Some(checked.email),
            phone: checked.phone,
        };
        match self.store.upsert_profile(&profile).await {
            Ok(profile) => {
                info!(user_id = %profile.id, ?delivery, "Tutor invited");
                Ok(PendingInvite { profile, delivery })
            }
            Err(source) => {
                error!(
                    user_id = %account.user_id,
                    email = %account.email,
                    error = %source,
                    "Account created but tutor profile was not saved"
                );
                Err(DomainError::PartialInviteFailure {
                    user_id: account.user_id,
                    email: account.email,
                    source,
                })
            }
        }
    }

    async fn create_account(
        &self,
        email: &Email,
        metadata: &AccountMetadata,
    ) -> Result<(Account, InviteDelivery), DomainError> {
        let duplicate = |err: IdentityError| match err {
            IdentityError::AlreadyRegistered => DomainError::DuplicateEmail(email.clone()),
            other => other.into(),
        };

        match self.identity.invite_by_email(email, metadata).await {
            Ok(account) => return Ok((account, InviteDelivery::Invitation)),
            Err(IdentityError::InviteUnsupported) => {
                info!("Invitations unsupported, creating account with a temporary password");
            }
            Err(e) => return Err(duplicate(e)),
        }

        let account = self
            .identity
            .create_account(email, &temporary_password(), metadata)
            .await
            .map_err(duplicate)?;

        let recovery_sent = match self.identity.send_password_recovery(email).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Password recovery email could not be requested");
                false
            }
        };
        Ok((account, InviteDelivery::TemporaryPassword { recovery_sent }))
    }
}
