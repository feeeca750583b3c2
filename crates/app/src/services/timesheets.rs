//! Timesheet lifecycle.
//!
//! A timesheet is created `pending` by (or on behalf of) a tutor and then
//! decided exactly once by an administrator:
//!
//! ```text
//! submit ──► pending ──decide(approve)──► approved
//!               │
//!               └────decide(reject)─────► rejected
//! ```
//!
//! Rates are never copied onto timesheets; [`TimesheetService::rate_for`]
//! and the listing projection read them from the tutor's current assignment.

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use tutaville_core::{Decision, HourlyRate, Hours, SubjectId, TimesheetId, UserId};

use crate::auth::AuthContext;
use crate::error::{DomainError, ValidationError, optional_text};
use crate::models::{
    DecisionRecord, NewTimesheet, Timesheet, TimesheetEntry, TimesheetFilter,
    TimesheetSubmission,
};
use crate::store::DataStore;

/// Maximum length of timesheet notes, in characters.
pub const MAX_NOTES_LENGTH: usize = 2000;

/// Name recorded for a tutor whose profile has neither name nor email.
const UNNAMED_TUTOR: &str = "Unnamed tutor";

/// Validated parts of a submission.
#[derive(Debug)]
struct CheckedSubmission {
    hours: Hours,
    notes: Option<String>,
}

/// Check a submission's shape against the calendar date `today`.
fn check_submission(
    submission: &TimesheetSubmission,
    today: NaiveDate,
) -> Result<CheckedSubmission, ValidationError> {
    let hours = Hours::new(submission.hours_worked)?;
    if submission.date_worked > today {
        return Err(ValidationError::FutureDate(submission.date_worked));
    }
    let notes = optional_text("notes", submission.notes.as_deref(), MAX_NOTES_LENGTH)?;
    Ok(CheckedSubmission { hours, notes })
}

/// Timesheet lifecycle service.
pub struct TimesheetService<'a, S> {
    store: &'a S,
}

impl<'a, S: DataStore> TimesheetService<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Log hours for a tutor against one of their assigned subjects.
    ///
    /// Input is validated before the store is touched. The current tutor
    /// and subject names are snapshotted onto the record.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if a tutor submits for someone else
    /// - `Validation` for non-positive or excessive hours, a future date, or
    ///   over-long notes
    /// - `NotAssigned` if the tutor has no rate for the subject
    #[instrument(
        skip(self, ctx, submission),
        fields(caller = %ctx.user_id, tutor_id = %submission.tutor_id, subject_id = %submission.subject_id)
    )]
    pub async fn submit(
        &self,
        ctx: &AuthContext,
        submission: TimesheetSubmission,
    ) -> Result<Timesheet, DomainError> {
        ctx.require_self_or_admin(submission.tutor_id)?;
        let checked = check_submission(&submission, Utc::now().date_naive())?;

        let tutor_id = submission.tutor_id;
        let subject_id = submission.subject_id;
        if self.store.assignment(tutor_id, subject_id).await?.is_none() {
            return Err(DomainError::NotAssigned {
                tutor_id,
                subject_id,
            });
        }

        let tutor = self
            .store
            .profile(tutor_id)
            .await?
            .ok_or_else(|| DomainError::not_found("tutor", tutor_id))?;
        let subject = self
            .store
            .subject(subject_id)
            .await?
            .ok_or_else(|| DomainError::not_found("subject", subject_id))?;

        let timesheet = self
            .store
            .insert_timesheet(&NewTimesheet {
                tutor_id,
                subject_id,
                tutor_name: tutor
                    .display_name()
                    .unwrap_or_else(|| UNNAMED_TUTOR.to_owned()),
                subject_name: subject.name,
                hours_worked: checked.hours,
                date_worked: submission.date_worked,
                notes: checked.notes,
            })
            .await?;

        info!(timesheet_id = %timesheet.id, hours = %timesheet.hours_worked, "Timesheet submitted");
        Ok(timesheet)
    }

    /// List timesheets, newest work first.
    ///
    /// Tutors only ever see their own rows: for a non-admin caller the
    /// filter's tutor is replaced with the caller.
    ///
    /// # Errors
    ///
    /// Returns `Store` on backend failure.
    #[instrument(skip(self, ctx), fields(caller = %ctx.user_id))]
    pub async fn list(
        &self,
        ctx: &AuthContext,
        filter: TimesheetFilter,
    ) -> Result<Vec<TimesheetEntry>, DomainError> {
        let filter = if ctx.is_admin() {
            filter
        } else {
            TimesheetFilter {
                tutor_id: Some(ctx.user_id),
                ..filter
            }
        };
        Ok(self.store.list_timesheets(&filter).await?)
    }

    /// Everything awaiting review, for administrators.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for tutors, `Store` on backend failure.
    pub async fn pending_queue(&self, ctx: &AuthContext) -> Result<Vec<TimesheetEntry>, DomainError> {
        ctx.require_admin()?;
        self.list(ctx, TimesheetFilter::pending()).await
    }

    /// Approve or reject a pending timesheet. The caller is the decider.
    ///
    /// The store applies the decision only while the row is still pending,
    /// so of two concurrent decisions exactly one succeeds.
    ///
    /// # Errors
    ///
    /// - `Forbidden` for tutors
    /// - `NotFound` if the timesheet does not exist
    /// - `AlreadyDecided` if it was approved or rejected before
    #[instrument(skip(self, ctx), fields(decider = %ctx.user_id))]
    pub async fn decide(
        &self,
        ctx: &AuthContext,
        id: TimesheetId,
        decision: Decision,
    ) -> Result<Timesheet, DomainError> {
        ctx.require_admin()?;

        let record = DecisionRecord::new(decision, ctx.user_id, Utc::now());
        if let Some(timesheet) = self.store.decide_if_pending(id, &record).await? {
            info!(status = %timesheet.status, "Timesheet decided");
            return Ok(timesheet);
        }

        match self.store.timesheet(id).await? {
            None => Err(DomainError::not_found("timesheet", id)),
            Some(existing) => Err(DomainError::AlreadyDecided {
                id,
                status: existing.status,
            }),
        }
    }

    /// The hourly rate a tutor currently earns for a subject.
    ///
    /// # Errors
    ///
    /// Returns `NotAssigned` if there is no assignment, `Forbidden` if a
    /// tutor asks about someone else.
    pub async fn rate_for(
        &self,
        ctx: &AuthContext,
        tutor_id: UserId,
        subject_id: SubjectId,
    ) -> Result<HourlyRate, DomainError> {
        ctx.require_self_or_admin(tutor_id)?;
        self.store
            .assignment(tutor_id, subject_id)
            .await?
            .map(|a| a.rate_per_hour)
            .ok_or(DomainError::NotAssigned {
                tutor_id,
                subject_id,
            })
    }
}
