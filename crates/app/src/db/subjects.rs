//! Subject repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use tutaville_core::SubjectId;

use crate::models::Subject;
use crate::store::StoreError;

#[derive(Debug, sqlx::FromRow)]
struct SubjectRow {
    id: SubjectId,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// Repository for `subjects`.
pub struct SubjectRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubjectRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all subjects by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Subject>, StoreError> {
        let rows = sqlx::query_as::<_, SubjectRow>(
            r"
            SELECT id, name, created_at
            FROM subjects
            ORDER BY lower(name)
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get a subject by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    pub async fn get_by_id(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, name, created_at FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a subject by name, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            r"
            SELECT id, name, created_at
            FROM subjects
            WHERE lower(name) = lower(btrim($1))
            ",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create a subject.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` on `subjects_name_key` if the name is taken.
    pub async fn create(&self, name: &str) -> Result<Subject, StoreError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            r"
            INSERT INTO subjects (name)
            VALUES (btrim($1))
            RETURNING id, name, created_at
            ",
        )
        .bind(name)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }
}
