//! Timesheet repository.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use tutaville_core::{HourlyRate, Hours, SubjectId, TimesheetId, TimesheetStatus, UserId};

use crate::models::{DecisionRecord, NewTimesheet, Timesheet, TimesheetEntry, TimesheetFilter};
use crate::store::StoreError;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TimesheetRow {
    id: TimesheetId,
    tutor_id: Option<UserId>,
    subject_id: Option<SubjectId>,
    tutor_name: String,
    subject_name: String,
    hours_worked: Decimal,
    date_worked: NaiveDate,
    notes: Option<String>,
    status: TimesheetStatus,
    approved_by: Option<UserId>,
    approval_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TimesheetRow> for Timesheet {
    type Error = StoreError;

    fn try_from(row: TimesheetRow) -> Result<Self, Self::Error> {
        let hours_worked = Hours::new(row.hours_worked).map_err(|e| {
            StoreError::DataCorruption(format!("invalid hours on timesheet {}: {e}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            tutor_id: row.tutor_id,
            subject_id: row.subject_id,
            tutor_name: row.tutor_name,
            subject_name: row.subject_name,
            hours_worked,
            date_worked: row.date_worked,
            notes: row.notes,
            status: row.status,
            approved_by: row.approved_by,
            approval_date: row.approval_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    #[sqlx(flatten)]
    timesheet: TimesheetRow,
    current_tutor_name: String,
    current_subject_name: String,
    rate_per_hour: Option<Decimal>,
}

impl TryFrom<EntryRow> for TimesheetEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let rate_per_hour = row
            .rate_per_hour
            .map(HourlyRate::new)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("stored rate: {e}")))?;

        Ok(Self {
            timesheet: row.timesheet.try_into()?,
            tutor_name: row.current_tutor_name,
            subject_name: row.current_subject_name,
            rate_per_hour,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for `timesheets`.
pub struct TimesheetRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TimesheetRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending timesheet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` if the tutor or subject is missing.
    pub async fn create(&self, new: &NewTimesheet) -> Result<Timesheet, StoreError> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r"
            INSERT INTO timesheets (
                tutor_id, subject_id, tutor_name, subject_name,
                hours_worked, date_worked, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING
                id, tutor_id, subject_id, tutor_name, subject_name,
                hours_worked, date_worked, notes, status,
                approved_by, approval_date, created_at, updated_at
            ",
        )
        .bind(new.tutor_id)
        .bind(new.subject_id)
        .bind(&new.tutor_name)
        .bind(&new.subject_name)
        .bind(new.hours_worked)
        .bind(new.date_worked)
        .bind(new.notes.as_deref())
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Get a timesheet by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the row is malformed.
    pub async fn get_by_id(&self, id: TimesheetId) -> Result<Option<Timesheet>, StoreError> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r"
            SELECT
                id, tutor_id, subject_id, tutor_name, subject_name,
                hours_worked, date_worked, notes, status,
                approved_by, approval_date, created_at, updated_at
            FROM timesheets
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List timesheets with current names and rates, newest work first.
    ///
    /// The tutor name mirrors `Profile::display_name`: trimmed first and last
    /// name, else email, else the snapshot taken at submission.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or a row is malformed.
    pub async fn list(&self, filter: &TimesheetFilter) -> Result<Vec<TimesheetEntry>, StoreError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r"
            SELECT
                t.id, t.tutor_id, t.subject_id, t.tutor_name, t.subject_name,
                t.hours_worked, t.date_worked, t.notes, t.status,
                t.approved_by, t.approval_date, t.created_at, t.updated_at,
                COALESCE(
                    NULLIF(concat_ws(' ', NULLIF(btrim(p.first_name), ''), NULLIF(btrim(p.last_name), '')), ''),
                    p.email,
                    t.tutor_name
                ) AS current_tutor_name,
                COALESCE(s.name, t.subject_name) AS current_subject_name,
                ts.rate_per_hour
            FROM timesheets t
            LEFT JOIN profiles p ON p.id = t.tutor_id
            LEFT JOIN subjects s ON s.id = t.subject_id
            LEFT JOIN tutor_subjects ts
                ON ts.tutor_id = t.tutor_id AND ts.subject_id = t.subject_id
            WHERE ($1::uuid IS NULL OR t.tutor_id = $1)
              AND ($2::timesheet_status IS NULL OR t.status = $2)
            ORDER BY t.date_worked DESC, t.created_at DESC
            ",
        )
        .bind(filter.tutor_id)
        .bind(filter.status)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Write a decision if, and only if, the timesheet is still pending.
    ///
    /// The status check lives in the `WHERE` clause, so two concurrent
    /// decisions cannot both match.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the update fails.
    pub async fn decide_if_pending(
        &self,
        id: TimesheetId,
        decision: &DecisionRecord,
    ) -> Result<Option<Timesheet>, StoreError> {
        let row = sqlx::query_as::<_, TimesheetRow>(
            r"
            UPDATE timesheets
            SET status = $2, approved_by = $3, approval_date = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING
                id, tutor_id, subject_id, tutor_name, subject_name,
                hours_worked, date_worked, notes, status,
                approved_by, approval_date, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(decision.status())
        .bind(decision.approved_by())
        .bind(decision.approval_date())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}
