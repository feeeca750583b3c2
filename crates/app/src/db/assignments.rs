//! Tutor-subject rate repository (`tutor_subjects`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use tutaville_core::{HourlyRate, SubjectId, UserId};

use crate::models::{AssignedSubject, AssignmentDraft, TutorAssignment};
use crate::store::StoreError;

fn rate(raw: Decimal) -> Result<HourlyRate, StoreError> {
    HourlyRate::new(raw).map_err(|e| StoreError::DataCorruption(format!("stored rate: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    tutor_id: UserId,
    subject_id: SubjectId,
    rate_per_hour: Decimal,
    assigned_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for TutorAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            tutor_id: row.tutor_id,
            subject_id: row.subject_id,
            rate_per_hour: rate(row.rate_per_hour)?,
            assigned_at: row.assigned_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignedSubjectRow {
    subject_id: SubjectId,
    subject_name: String,
    rate_per_hour: Decimal,
    assigned_at: DateTime<Utc>,
}

impl TryFrom<AssignedSubjectRow> for AssignedSubject {
    type Error = StoreError;

    fn try_from(row: AssignedSubjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            subject_id: row.subject_id,
            subject_name: row.subject_name,
            rate_per_hour: rate(row.rate_per_hour)?,
            assigned_at: row.assigned_at,
        })
    }
}

/// Repository for `tutor_subjects`.
pub struct AssignmentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AssignmentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get one tutor's rate for one subject.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the stored rate is invalid.
    pub async fn get(
        &self,
        tutor_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<TutorAssignment>, StoreError> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r"
            SELECT tutor_id, subject_id, rate_per_hour, assigned_at
            FROM tutor_subjects
            WHERE tutor_id = $1 AND subject_id = $2
            ",
        )
        .bind(tutor_id)
        .bind(subject_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// A tutor's assignments with subject names.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or a stored rate is invalid.
    pub async fn list_for_tutor(&self, tutor_id: UserId) -> Result<Vec<AssignedSubject>, StoreError> {
        let rows = sqlx::query_as::<_, AssignedSubjectRow>(
            r"
            SELECT ts.subject_id, s.name AS subject_name, ts.rate_per_hour, ts.assigned_at
            FROM tutor_subjects ts
            JOIN subjects s ON s.id = ts.subject_id
            WHERE ts.tutor_id = $1
            ORDER BY lower(s.name)
            ",
        )
        .bind(tutor_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Replace a tutor's whole assignment set in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` if the tutor or a subject is missing.
    /// Nothing is changed on error.
    pub async fn replace_all(
        &self,
        tutor_id: UserId,
        desired: &[AssignmentDraft],
    ) -> Result<Vec<TutorAssignment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM tutor_subjects WHERE tutor_id = $1")
            .bind(tutor_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = Vec::with_capacity(desired.len());
        for draft in desired {
            let row = sqlx::query_as::<_, AssignmentRow>(
                r"
                INSERT INTO tutor_subjects (tutor_id, subject_id, rate_per_hour)
                VALUES ($1, $2, $3)
                RETURNING tutor_id, subject_id, rate_per_hour, assigned_at
                ",
            )
            .bind(tutor_id)
            .bind(draft.subject_id)
            .bind(draft.rate_per_hour)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(TutorAssignment::try_from(row)?);
        }

        tx.commit().await?;
        tracing::debug!(%tutor_id, removed, inserted = inserted.len(), "Assignments replaced");
        Ok(inserted)
    }
}
