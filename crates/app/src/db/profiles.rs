//! Profile repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use tutaville_core::{Email, Role, UserId};

use crate::models::{NewProfile, Profile, ProfileUpdate};
use crate::store::StoreError;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    role: Role,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = row
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                StoreError::DataCorruption(format!("invalid email on profile {}: {e}", row.id))
            })?;

        Ok(Self {
            id: row.id,
            role: row.role,
            first_name: row.first_name,
            last_name: row.last_name,
            email,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for `profiles`.
pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a profile by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the row is malformed.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            SELECT id, role, first_name, last_name, email, phone, created_at, updated_at
            FROM profiles
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a profile by email, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the row is malformed.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            SELECT id, role, first_name, last_name, email, phone, created_at, updated_at
            FROM profiles
            WHERE lower(email) = lower($1)
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List profiles with the given role, by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or any row is malformed.
    pub async fn list_by_role(&self, role: Role) -> Result<Vec<Profile>, StoreError> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            r"
            SELECT id, role, first_name, last_name, email, phone, created_at, updated_at
            FROM profiles
            WHERE role = $1
            ORDER BY last_name, first_name, email
            ",
        )
        .bind(role)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Insert a profile, or overwrite the one with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another profile has the email.
    pub async fn upsert(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            INSERT INTO profiles (id, role, first_name, last_name, email, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                role = EXCLUDED.role,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                updated_at = NOW()
            RETURNING id, role, first_name, last_name, email, phone, created_at, updated_at
            ",
        )
        .bind(profile.id)
        .bind(profile.role)
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .bind(profile.email.as_ref().map(Email::as_str))
        .bind(profile.phone.as_deref())
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Apply a partial update of contact fields.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the new email belongs to another profile.
    pub async fn update(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            UPDATE profiles SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = CASE WHEN $5 THEN $6 ELSE phone END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, role, first_name, last_name, email, phone, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.email.as_ref().map(Email::as_str))
        .bind(update.phone.is_some())
        .bind(update.phone.clone().flatten())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Change a profile's role.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the update fails.
    pub async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r"
            UPDATE profiles SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, role, first_name, last_name, email, phone, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(role)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}
