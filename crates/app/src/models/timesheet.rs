//! Timesheet domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tutaville_core::{
    Decision, HourlyRate, Hours, SubjectId, TimesheetId, TimesheetStatus, UserId,
};

/// Hours a tutor logged against one subject on one date.
///
/// `tutor_id` and `subject_id` are `None` once the tutor or subject has been
/// deleted; `tutor_name` and `subject_name` keep the last known names so the
/// record remains readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timesheet {
    pub id: TimesheetId,
    pub tutor_id: Option<UserId>,
    pub subject_id: Option<SubjectId>,
    pub tutor_name: String,
    pub subject_name: String,
    pub hours_worked: Hours,
    pub date_worked: NaiveDate,
    pub notes: Option<String>,
    pub status: TimesheetStatus,
    /// Set only when approved, together with `approval_date`.
    pub approved_by: Option<UserId>,
    pub approval_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timesheet {
    /// Checks the approval invariant: `approved_by` and `approval_date` are
    /// both set when approved and both empty otherwise.
    #[must_use]
    pub const fn approval_is_consistent(&self) -> bool {
        match self.status {
            TimesheetStatus::Approved => {
                self.approved_by.is_some() && self.approval_date.is_some()
            }
            TimesheetStatus::Pending | TimesheetStatus::Rejected => {
                self.approved_by.is_none() && self.approval_date.is_none()
            }
        }
    }
}

/// Raw input for logging hours, as received from a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetSubmission {
    pub tutor_id: UserId,
    pub subject_id: SubjectId,
    pub hours_worked: Decimal,
    pub date_worked: NaiveDate,
    pub notes: Option<String>,
}

/// Validated values for inserting a timesheet. Status is always `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimesheet {
    pub tutor_id: UserId,
    pub subject_id: SubjectId,
    pub tutor_name: String,
    pub subject_name: String,
    pub hours_worked: Hours,
    pub date_worked: NaiveDate,
    pub notes: Option<String>,
}

/// The column values a decision writes.
///
/// Built only through [`DecisionRecord::new`], which keeps the approval
/// fields in step with the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionRecord {
    status: TimesheetStatus,
    approved_by: Option<UserId>,
    approval_date: Option<DateTime<Utc>>,
}

impl DecisionRecord {
    /// Record `decision` made by `decider` at `at`.
    #[must_use]
    pub const fn new(decision: Decision, decider: UserId, at: DateTime<Utc>) -> Self {
        match decision {
            Decision::Approve => Self {
                status: TimesheetStatus::Approved,
                approved_by: Some(decider),
                approval_date: Some(at),
            },
            Decision::Reject => Self {
                status: TimesheetStatus::Rejected,
                approved_by: None,
                approval_date: None,
            },
        }
    }

    #[must_use]
    pub const fn status(&self) -> TimesheetStatus {
        self.status
    }

    #[must_use]
    pub const fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    #[must_use]
    pub const fn approval_date(&self) -> Option<DateTime<Utc>> {
        self.approval_date
    }

    /// Write this decision onto an in-memory timesheet.
    pub const fn apply_to(&self, timesheet: &mut Timesheet, at: DateTime<Utc>) {
        timesheet.status = self.status;
        timesheet.approved_by = self.approved_by;
        timesheet.approval_date = self.approval_date;
        timesheet.updated_at = at;
    }
}

/// Filter for listing timesheets. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetFilter {
    pub tutor_id: Option<UserId>,
    pub status: Option<TimesheetStatus>,
}

impl TimesheetFilter {
    /// Everything awaiting review.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            tutor_id: None,
            status: Some(TimesheetStatus::Pending),
        }
    }

    /// All timesheets of one tutor.
    #[must_use]
    pub const fn for_tutor(tutor_id: UserId) -> Self {
        Self {
            tutor_id: Some(tutor_id),
            status: None,
        }
    }

    /// Returns true if `timesheet` passes this filter.
    #[must_use]
    pub fn matches(&self, timesheet: &Timesheet) -> bool {
        self.tutor_id.is_none_or(|id| timesheet.tutor_id == Some(id))
            && self.status.is_none_or(|s| timesheet.status == s)
    }
}

/// A timesheet joined with current names and the tutor's current rate.
///
/// Names come from the live profile and subject when they still exist and
/// fall back to the snapshots on the timesheet otherwise. The rate is read
/// from the tutor's assignment; it is `None` when the assignment has since
/// been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetEntry {
    pub timesheet: Timesheet,
    pub tutor_name: String,
    pub subject_name: String,
    pub rate_per_hour: Option<HourlyRate>,
}

impl TimesheetEntry {
    /// Rate × hours, for display only.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        self.rate_per_hour
            .map(|rate| rate.amount_for(self.timesheet.hours_worked))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pending() -> Timesheet {
        Timesheet {
            id: TimesheetId::generate(),
            tutor_id: Some(UserId::generate()),
            subject_id: Some(SubjectId::generate()),
            tutor_name: "Alice".to_owned(),
            subject_name: "Math".to_owned(),
            hours_worked: Hours::new(Decimal::from(3)).unwrap(),
            date_worked: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            notes: None,
            status: TimesheetStatus::Pending,
            approved_by: None,
            approval_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_approve_sets_both_fields() {
        let admin = UserId::generate();
        let now = Utc::now();
        let mut ts = pending();
        DecisionRecord::new(Decision::Approve, admin, now).apply_to(&mut ts, now);

        assert_eq!(ts.status, TimesheetStatus::Approved);
        assert_eq!(ts.approved_by, Some(admin));
        assert_eq!(ts.approval_date, Some(now));
        assert!(ts.approval_is_consistent());
    }

    #[test]
    fn test_reject_leaves_fields_empty() {
        let now = Utc::now();
        let mut ts = pending();
        DecisionRecord::new(Decision::Reject, UserId::generate(), now).apply_to(&mut ts, now);

        assert_eq!(ts.status, TimesheetStatus::Rejected);
        assert_eq!(ts.approved_by, None);
        assert_eq!(ts.approval_date, None);
        assert!(ts.approval_is_consistent());
    }

    #[test]
    fn test_filter_matches() {
        let ts = pending();
        assert!(TimesheetFilter::default().matches(&ts));
        assert!(TimesheetFilter::pending().matches(&ts));
        assert!(TimesheetFilter::for_tutor(ts.tutor_id.unwrap()).matches(&ts));
        assert!(!TimesheetFilter::for_tutor(UserId::generate()).matches(&ts));
    }

    #[test]
    fn test_entry_amount() {
        let entry = TimesheetEntry {
            timesheet: pending(),
            tutor_name: "Alice".to_owned(),
            subject_name: "Math".to_owned(),
            rate_per_hour: Some(HourlyRate::new(Decimal::from(50)).unwrap()),
        };
        assert_eq!(entry.amount(), Some(Decimal::from(150)));

        let unassigned = TimesheetEntry {
            rate_per_hour: None,
            ..entry
        };
        assert_eq!(unassigned.amount(), None);
    }
}
