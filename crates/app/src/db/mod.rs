//! `PostgreSQL` implementation of [`DataStore`].
//!
//! # Tables
//!
//! - `profiles` - One row per identity account, keyed by the account's user id
//! - `subjects` - Subjects, unique on `lower(name)`
//! - `tutor_subjects` - Per-tutor, per-subject hourly rates
//! - `timesheets` - Logged hours with review status and name snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/app/migrations/`, embedded at build time
//! and run via:
//! ```bash
//! tv-cli migrate
//! ```
//!
//! # Queries
//!
//! Queries are checked at runtime (`sqlx::query_as` with `FromRow` row
//! types) so the crate builds without a live database. Row types decode into
//! primitives and are converted to domain types with `TryFrom`, which turns
//! malformed data into [`StoreError::DataCorruption`].

pub mod assignments;
pub mod cascade;
pub mod profiles;
pub mod subjects;
pub mod timesheets;

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::error::ErrorKind;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::instrument;

use tutaville_core::{Email, Role, SubjectId, TimesheetId, UserId};

pub use assignments::AssignmentRepository;
pub use cascade::CascadeRepository;
pub use profiles::ProfileRepository;
pub use subjects::SubjectRepository;
pub use timesheets::TimesheetRepository;

use crate::models::{
    AssignedSubject, AssignmentDraft, DecisionRecord, NewProfile, NewTimesheet, Profile,
    ProfileUpdate, Subject, Timesheet, TimesheetEntry, TimesheetFilter, TutorAssignment,
};
use crate::store::{CascadePlan, CascadeReport, DataStore, StoreError};

/// Embedded migrations from `crates/app/migrations/`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// `SQLSTATE` for `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let constraint = db.constraint().unwrap_or("unknown").to_owned();
                match db.kind() {
                    ErrorKind::UniqueViolation => Self::Conflict { constraint },
                    ErrorKind::ForeignKeyViolation => Self::ForeignKey { constraint },
                    _ if db.code().as_deref() == Some(QUERY_CANCELED) => Self::Timeout,
                    _ => Self::Backend(Box::new(sqlx::Error::Database(db))),
                }
            }
            sqlx::Error::PoolTimedOut => Self::Timeout,
            sqlx::Error::PoolClosed => Self::Unavailable("connection pool closed".to_owned()),
            sqlx::Error::Io(e) => Self::Unavailable(e.to_string()),
            sqlx::Error::Tls(e) => Self::Unavailable(e.to_string()),
            err @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
                Self::DataCorruption(err.to_string())
            }
            other => Self::Backend(Box::new(other)),
        }
    }
}

/// Create a `PostgreSQL` connection pool.
///
/// `timeout` bounds both waiting for a pooled connection and every statement
/// run on it (`statement_timeout`), so a stuck query surfaces as
/// [`StoreError::Timeout`] instead of hanging.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the connection cannot be
/// established.
pub async fn create_pool(
    database_url: &SecretString,
    timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url.expose_secret())?
        .options([("statement_timeout", timeout.as_millis().to_string())]);

    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history is inconsistent.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// [`DataStore`] over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    const fn profiles(&self) -> ProfileRepository<'_> {
        ProfileRepository::new(&self.pool)
    }

    const fn subjects_repo(&self) -> SubjectRepository<'_> {
        SubjectRepository::new(&self.pool)
    }

    const fn assignments(&self) -> AssignmentRepository<'_> {
        AssignmentRepository::new(&self.pool)
    }

    const fn timesheets(&self) -> TimesheetRepository<'_> {
        TimesheetRepository::new(&self.pool)
    }
}

impl DataStore for PgStore {
    async fn profile(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        self.profiles().get_by_id(id).await
    }

    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError> {
        self.profiles().get_by_email(email).await
    }

    async fn profiles_with_role(&self, role: Role) -> Result<Vec<Profile>, StoreError> {
        self.profiles().list_by_role(role).await
    }

    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        self.profiles().upsert(profile).await
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError> {
        self.profiles().update(id, update).await
    }

    #[instrument(skip(self))]
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Profile>, StoreError> {
        self.profiles().set_role(id, role).await
    }

    async fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
        self.subjects_repo().list_all().await
    }

    async fn subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        self.subjects_repo().get_by_id(id).await
    }

    async fn subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError> {
        self.subjects_repo().get_by_name(name).await
    }

    #[instrument(skip(self))]
    async fn insert_subject(&self, name: &str) -> Result<Subject, StoreError> {
        self.subjects_repo().create(name).await
    }

    async fn assignment(
        &self,
        tutor_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<TutorAssignment>, StoreError> {
        self.assignments().get(tutor_id, subject_id).await
    }

    async fn assignments_for_tutor(
        &self,
        tutor_id: UserId,
    ) -> Result<Vec<AssignedSubject>, StoreError> {
        self.assignments().list_for_tutor(tutor_id).await
    }

    #[instrument(skip(self, desired), fields(count = desired.len()))]
    async fn replace_assignments(
        &self,
        tutor_id: UserId,
        desired: &[AssignmentDraft],
    ) -> Result<Vec<TutorAssignment>, StoreError> {
        self.assignments().replace_all(tutor_id, desired).await
    }

    #[instrument(skip(self, timesheet), fields(tutor_id = %timesheet.tutor_id))]
    async fn insert_timesheet(&self, timesheet: &NewTimesheet) -> Result<Timesheet, StoreError> {
        self.timesheets().create(timesheet).await
    }

    async fn timesheet(&self, id: TimesheetId) -> Result<Option<Timesheet>, StoreError> {
        self.timesheets().get_by_id(id).await
    }

    async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<TimesheetEntry>, StoreError> {
        self.timesheets().list(filter).await
    }

    #[instrument(skip(self, decision))]
    async fn decide_if_pending(
        &self,
        id: TimesheetId,
        decision: &DecisionRecord,
    ) -> Result<Option<Timesheet>, StoreError> {
        self.timesheets().decide_if_pending(id, decision).await
    }

    #[instrument(skip(self, plan), fields(steps = plan.steps().len()))]
    async fn execute(&self, plan: &CascadePlan) -> Result<CascadeReport, StoreError> {
        CascadeRepository::new(&self.pool).execute(plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_retryable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Timeout
        ));
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_retryable());
    }

    #[test]
    fn test_other_errors_are_opaque() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decode_errors_are_corruption() {
        let err = StoreError::from(sqlx::Error::Decode("bad numeric".into()));
        assert!(matches!(err, StoreError::DataCorruption(_)));
    }
}
