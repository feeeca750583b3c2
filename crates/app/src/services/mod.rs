//! Domain services.
//!
//! # Services
//!
//! - `timesheets` - Submission, listing, review decisions and rate lookup
//! - `roster` - Subjects, tutors, invitations and rate assignments
//! - `provisioning` - Turns an identity session into an [`crate::AuthContext`]
//!
//! Services borrow their collaborators and are cheap to build per request:
//!
//! ```rust,ignore
//! let roster = RosterService::new(&store, &identity);
//! let subject = roster.add_subject(&ctx, "Math").await?;
//! ```
//!
//! No service retries internally. A failed call either changed nothing or
//! reports [`crate::DomainError::may_be_inconsistent`].

pub mod provisioning;
pub mod roster;
pub mod timesheets;

pub use provisioning::ProvisioningService;
pub use roster::{DesiredRate, InviteDelivery, PendingInvite, RosterService, TutorInvite};
pub use timesheets::TimesheetService;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;

    use tutaville_core::{Email, Role, UserId};

    use crate::auth::AuthContext;
    use crate::models::{AssignmentDraft, NewProfile, Profile, Subject};
    use crate::store::{DataStore, MemoryStore};

    pub fn admin_ctx() -> AuthContext {
        AuthContext::new(UserId::generate(), None, Role::Admin)
    }

    pub fn ctx_for(profile: &Profile) -> AuthContext {
        AuthContext::from_profile(profile)
    }

    pub async fn tutor(store: &MemoryStore, first: &str, email: &str) -> Profile {
        store
            .upsert_profile(&NewProfile {
                id: UserId::generate(),
                role: Role::Tutor,
                first_name: Some(first.to_owned()),
                last_name: None,
                email: Some(Email::parse(email).unwrap()),
                phone: None,
            })
            .await
            .unwrap()
    }

    pub async fn admin(store: &MemoryStore, email: &str) -> Profile {
        store
            .upsert_profile(&NewProfile {
                id: UserId::generate(),
                role: Role::Admin,
                first_name: Some("Ada".to_owned()),
                last_name: Some("Admin".to_owned()),
                email: Some(Email::parse(email).unwrap()),
                phone: None,
            })
            .await
            .unwrap()
    }

    pub async fn subject(store: &MemoryStore, name: &str) -> Subject {
        store.insert_subject(name).await.unwrap()
    }

    pub async fn assign(store: &MemoryStore, tutor: &Profile, subjects: &[(&Subject, i64)]) {
        let drafts: Vec<AssignmentDraft> = subjects
            .iter()
            .map(|(s, rate)| AssignmentDraft {
                subject_id: s.id,
                rate_per_hour: tutaville_core::HourlyRate::new(Decimal::from(*rate)).unwrap(),
            })
            .collect();
        store.replace_assignments(tutor.id, &drafts).await.unwrap();
    }
}
