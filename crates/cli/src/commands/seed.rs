//! Seed subjects and tutors from a YAML file.
//!
//! ```yaml
//! subjects:
//!   - Mathematics
//!   - Physics
//! tutors:
//!   - email: alice@example.com
//!     first_name: Alice
//!     last_name: Lovelace
//!     phone: "+44 20 7946 0000"
//!     rates:
//!       Mathematics: 50
//!       Physics: "47.50"
//! ```
//!
//! Seeding is repeatable: subjects and tutors that already exist are
//! skipped, and each listed tutor's rates are replaced with the file's.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use tutaville_app::identity::IdentityProvider;
use tutaville_app::services::{DesiredRate, RosterService, TutorInvite};
use tutaville_app::store::DataStore;
use tutaville_app::{AuthContext, DomainError};
use tutaville_core::Email;

use super::{CliError, Runtime};

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub tutors: Vec<SeedTutor>,
}

/// A tutor entry with rates keyed by subject name.
#[derive(Debug, Deserialize)]
pub struct SeedTutor {
    #[serde(flatten)]
    pub invite: TutorInvite,
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
}

/// What a seeding run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub subjects_added: usize,
    pub subjects_skipped: usize,
    pub tutors_invited: usize,
    pub tutors_skipped: usize,
    pub assignments: usize,
}

/// Read `path` and seed the configured database.
pub async fn run(rt: &Runtime, ctx: &AuthContext, path: &Path) -> Result<(), CliError> {
    info!(path = %path.display(), "Loading seed file");
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;
    info!(
        subjects = seed.subjects.len(),
        tutors = seed.tutors.len(),
        "Parsed seed file"
    );

    let identity = rt.identity()?;
    let summary = apply(&rt.store, &identity, ctx, &seed).await?;

    info!("Seeding complete!");
    info!("  Subjects added: {}", summary.subjects_added);
    info!("  Subjects skipped (already exist): {}", summary.subjects_skipped);
    info!("  Tutors invited: {}", summary.tutors_invited);
    info!("  Tutors skipped (already exist): {}", summary.tutors_skipped);
    info!("  Rate assignments written: {}", summary.assignments);
    Ok(())
}

/// Apply a parsed seed file.
///
/// Stops at the first error other than an already-existing subject or
/// tutor. Everything applied before that point stays applied.
pub async fn apply<S: DataStore, I: IdentityProvider>(
    store: &S,
    identity: &I,
    ctx: &AuthContext,
    seed: &SeedFile,
) -> Result<SeedSummary, CliError> {
    let roster = RosterService::new(store, identity);
    let mut summary = SeedSummary::default();

    for name in &seed.subjects {
        match roster.add_subject(ctx, name).await {
            Ok(_) => summary.subjects_added += 1,
            Err(DomainError::DuplicateName(_)) => summary.subjects_skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    for tutor in &seed.tutors {
        let tutor_id = match roster.invite_tutor(ctx, &tutor.invite).await {
            Ok(pending) => {
                summary.tutors_invited += 1;
                pending.profile.id
            }
            Err(DomainError::DuplicateEmail(email)) => {
                summary.tutors_skipped += 1;
                existing_profile(store, &email).await?
            }
            Err(e) => {
                error!(email = %tutor.invite.email, error = %e, "Could not invite tutor");
                return Err(e.into());
            }
        };

        if tutor.rates.is_empty() {
            continue;
        }
        let mut desired = Vec::with_capacity(tutor.rates.len());
        for (name, rate) in &tutor.rates {
            let subject = store
                .subject_by_name(name)
                .await
                .map_err(DomainError::from)?
                .ok_or_else(|| CliError::UnknownSubject(name.clone()))?;
            desired.push(DesiredRate {
                subject_id: subject.id,
                rate_per_hour: *rate,
            });
        }
        summary.assignments += roster.set_assignments(ctx, tutor_id, &desired).await?.len();
    }

    Ok(summary)
}

async fn existing_profile<S: DataStore>(
    store: &S,
    email: &Email,
) -> Result<tutaville_core::UserId, CliError> {
    store
        .profile_by_email(email)
        .await
        .map_err(DomainError::from)?
        .map(|p| p.id)
        .ok_or_else(|| CliError::UnknownUser(email.clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use tutaville_app::identity::MemoryIdentity;
    use tutaville_app::store::MemoryStore;
    use tutaville_core::{Role, UserId};

    use super::*;

    const SEED: &str = r#"
subjects:
  - Mathematics
  - Physics
tutors:
  - email: alice@example.com
    first_name: Alice
    last_name: Lovelace
    rates:
      Mathematics: 50
      Physics: "47.50"
  - email: bob@example.com
    first_name: Bob
    last_name: Babbage
"#;

    fn admin() -> AuthContext {
        AuthContext::new(UserId::generate(), None, Role::Admin)
    }

    #[test]
    fn test_parse_seed_file() {
        let seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        assert_eq!(seed.subjects, ["Mathematics", "Physics"]);
        assert_eq!(seed.tutors.len(), 2);
        assert_eq!(seed.tutors[0].invite.email, "alice@example.com");
        assert_eq!(seed.tutors[0].rates["Physics"], Decimal::new(4750, 2));
        assert!(seed.tutors[1].rates.is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_yaml::from_str::<SeedFile>("subject: [Math]").is_err());
    }

    #[tokio::test]
    async fn test_apply_is_repeatable() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        let ctx = admin();

        let first = apply(&store, &identity, &ctx, &seed).await.unwrap();
        assert_eq!(
            first,
            SeedSummary {
                subjects_added: 2,
                subjects_skipped: 0,
                tutors_invited: 2,
                tutors_skipped: 0,
                assignments: 2,
            }
        );

        let second = apply(&store, &identity, &ctx, &seed).await.unwrap();
        assert_eq!(second.subjects_skipped, 2);
        assert_eq!(second.tutors_skipped, 2);
        assert_eq!(second.assignments, 2);
        assert_eq!(identity.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_apply_unknown_subject_in_rates() {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let seed: SeedFile = serde_yaml::from_str(
            r"
tutors:
  - email: carol@example.com
    first_name: Carol
    last_name: Shaw
    rates:
      Chemistry: 40
",
        )
        .unwrap();

        let err = apply(&store, &identity, &admin(), &seed).await.unwrap_err();
        assert!(matches!(err, CliError::UnknownSubject(ref n) if n == "Chemistry"));
    }
}
