//! The Data Store boundary.
//!
//! [`DataStore`] is the one interface the domain services use to read and
//! write Profiles, Subjects, `TutorAssignments` and Timesheets. It is
//! entity-scoped rather than generic: each method names the entity and the
//! shape of the read or write, so the services never build queries.
//!
//! Two implementations ship with the crate:
//!
//! - [`crate::db::PgStore`] - `PostgreSQL` through `sqlx`
//! - [`MemoryStore`] - in-process tables for tests and local tooling
//!
//! # Constraints
//!
//! Implementations must enforce the same constraints the migrations declare:
//! case-insensitive unique profile email and subject name (reported as
//! [`StoreError::Conflict`] naming the constraint), and foreign keys from
//! assignments and timesheets (reported as [`StoreError::ForeignKey`]).
//! [`DataStore::decide_if_pending`] must test and write in one step.

pub mod memory;

use core::fmt;

use thiserror::Error;

use tutaville_core::{Email, Role, SubjectId, TimesheetId, UserId};

use crate::models::{
    AssignedSubject, AssignmentDraft, DecisionRecord, NewProfile, NewTimesheet, Profile,
    ProfileUpdate, Subject, Timesheet, TimesheetEntry, TimesheetFilter, TutorAssignment,
};

pub use memory::{MemoryStore, StoreOp};

/// Unique index on `lower(profiles.email)`.
pub const PROFILES_EMAIL_KEY: &str = "profiles_email_key";

/// Unique index on `lower(subjects.name)`.
pub const SUBJECTS_NAME_KEY: &str = "subjects_name_key";

/// Errors raised by a [`DataStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint {constraint} violated")]
    Conflict {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A foreign key rejected the write.
    #[error("foreign key {constraint} violated")]
    ForeignKey {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("data store timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("data store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into a domain value.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Timeouts and connectivity failures may succeed on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }

    /// Returns true if this is a unique violation of `constraint`.
    #[must_use]
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, Self::Conflict { constraint: c } if c == constraint)
    }
}

/// One step of a [`CascadePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStep {
    /// Remove every assignment that references the subject.
    DeleteAssignmentsForSubject(SubjectId),
    /// Remove every assignment held by the tutor.
    DeleteAssignmentsForTutor(UserId),
    /// Null `subject_id` on the subject's timesheets, refreshing the name snapshot.
    DetachTimesheetsFromSubject(SubjectId),
    /// Null `tutor_id` on the tutor's timesheets, refreshing the name snapshot.
    DetachTimesheetsFromTutor(UserId),
    DeleteSubject(SubjectId),
    DeleteProfile(UserId),
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteAssignmentsForSubject(id) => write!(f, "delete assignments for subject {id}"),
            Self::DeleteAssignmentsForTutor(id) => write!(f, "delete assignments for tutor {id}"),
            Self::DetachTimesheetsFromSubject(id) => write!(f, "detach timesheets from subject {id}"),
            Self::DetachTimesheetsFromTutor(id) => write!(f, "detach timesheets from tutor {id}"),
            Self::DeleteSubject(id) => write!(f, "delete subject {id}"),
            Self::DeleteProfile(id) => write!(f, "delete profile {id}"),
        }
    }
}

/// An ordered list of deletes that removes an entity and its dependents.
///
/// Plans are executed by [`DataStore::execute`] as a single unit: either every
/// step is applied or none is, and the first failing step's error is
/// returned. The final step always removes the root entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    steps: Vec<CascadeStep>,
}

impl CascadePlan {
    /// Plan for deleting a subject: its assignments go, its timesheets are
    /// retained with the subject detached.
    #[must_use]
    pub fn delete_subject(id: SubjectId) -> Self {
        Self {
            steps: vec![
                CascadeStep::DeleteAssignmentsForSubject(id),
                CascadeStep::DetachTimesheetsFromSubject(id),
                CascadeStep::DeleteSubject(id),
            ],
        }
    }

    /// Plan for deleting a tutor's profile: assignments go, timesheets are
    /// retained with the tutor detached.
    #[must_use]
    pub fn delete_tutor(id: UserId) -> Self {
        Self {
            steps: vec![
                CascadeStep::DeleteAssignmentsForTutor(id),
                CascadeStep::DetachTimesheetsFromTutor(id),
                CascadeStep::DeleteProfile(id),
            ],
        }
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[CascadeStep] {
        &self.steps
    }
}

/// Rows touched by each step of an executed [`CascadePlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// `(step, rows affected)` in execution order.
    pub steps: Vec<(CascadeStep, u64)>,
}

impl CascadeReport {
    /// Record the outcome of one step.
    pub fn record(&mut self, step: CascadeStep, rows: u64) {
        self.steps.push((step, rows));
    }

    /// Whether the root entity (the last step) existed and was removed.
    #[must_use]
    pub fn root_deleted(&self) -> bool {
        self.steps.last().is_some_and(|(_, rows)| *rows > 0)
    }

    /// Rows affected by steps of the given kind.
    #[must_use]
    pub fn rows_for(&self, matches: impl Fn(&CascadeStep) -> bool) -> u64 {
        self.steps
            .iter()
            .filter(|(step, _)| matches(step))
            .map(|(_, rows)| rows)
            .sum()
    }
}

/// Typed, entity-scoped persistence consumed by the domain services.
pub trait DataStore: Send + Sync {
    // --- profiles ---

    async fn profile(&self, id: UserId) -> Result<Option<Profile>, StoreError>;

    /// Case-insensitive lookup.
    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError>;

    /// Profiles with `role`, ordered by last name, first name, then email.
    async fn profiles_with_role(&self, role: Role) -> Result<Vec<Profile>, StoreError>;

    /// Insert a profile, or overwrite every field of an existing one with the
    /// same id (except `created_at`).
    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    /// Apply a partial contact-field update. `None` if the profile is missing.
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError>;

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Profile>, StoreError>;

    // --- subjects ---

    /// All subjects ordered by name.
    async fn subjects(&self) -> Result<Vec<Subject>, StoreError>;

    async fn subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError>;

    /// Case-insensitive lookup on the trimmed name.
    async fn subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError>;

    async fn insert_subject(&self, name: &str) -> Result<Subject, StoreError>;

    // --- assignments ---

    async fn assignment(
        &self,
        tutor_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<TutorAssignment>, StoreError>;

    /// A tutor's assignments joined with subject names, ordered by name.
    async fn assignments_for_tutor(
        &self,
        tutor_id: UserId,
    ) -> Result<Vec<AssignedSubject>, StoreError>;

    /// Delete every assignment of `tutor_id` and insert `desired`, as one unit.
    async fn replace_assignments(
        &self,
        tutor_id: UserId,
        desired: &[AssignmentDraft],
    ) -> Result<Vec<TutorAssignment>, StoreError>;

    // --- timesheets ---

    /// Insert with `status = pending` and no approval fields.
    async fn insert_timesheet(&self, timesheet: &NewTimesheet) -> Result<Timesheet, StoreError>;

    async fn timesheet(&self, id: TimesheetId) -> Result<Option<Timesheet>, StoreError>;

    /// Joined projection ordered by `date_worked` desc, then `created_at` desc.
    async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<TimesheetEntry>, StoreError>;

    /// Apply `decision` only if the timesheet is still pending.
    ///
    /// Returns the updated row, or `None` when no pending row with this id
    /// exists. The status test and the write are a single atomic step.
    async fn decide_if_pending(
        &self,
        id: TimesheetId,
        decision: &DecisionRecord,
    ) -> Result<Option<Timesheet>, StoreError>;

    // --- cascades ---

    /// Run every step of `plan` as one unit.
    async fn execute(&self, plan: &CascadePlan) -> Result<CascadeReport, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_end_with_root() {
        let subject = SubjectId::generate();
        let plan = CascadePlan::delete_subject(subject);
        assert_eq!(
            plan.steps().first(),
            Some(&CascadeStep::DeleteAssignmentsForSubject(subject))
        );
        assert_eq!(plan.steps().last(), Some(&CascadeStep::DeleteSubject(subject)));

        let tutor = UserId::generate();
        let plan = CascadePlan::delete_tutor(tutor);
        assert_eq!(plan.steps().last(), Some(&CascadeStep::DeleteProfile(tutor)));
    }

    #[test]
    fn test_report_root_deleted() {
        let id = SubjectId::generate();
        let mut report = CascadeReport::default();
        assert!(!report.root_deleted());

        report.record(CascadeStep::DeleteAssignmentsForSubject(id), 2);
        report.record(CascadeStep::DeleteSubject(id), 0);
        assert!(!report.root_deleted());

        report.steps.pop();
        report.record(CascadeStep::DeleteSubject(id), 1);
        assert!(report.root_deleted());
        assert_eq!(
            report.rows_for(|s| matches!(s, CascadeStep::DeleteAssignmentsForSubject(_))),
            2
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Timeout.is_retryable());
        assert!(StoreError::Unavailable("down".to_owned()).is_retryable());
        assert!(
            !StoreError::Conflict {
                constraint: PROFILES_EMAIL_KEY.to_owned()
            }
            .is_retryable()
        );
        assert!(
            StoreError::Conflict {
                constraint: SUBJECTS_NAME_KEY.to_owned()
            }
            .is_conflict_on(SUBJECTS_NAME_KEY)
        );
    }
}
