//! Integration tests for Tutaville.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios
//! cargo test -p tutaville-integration-tests
//!
//! # Postgres-backed tests (each run uses fresh, uniquely named rows)
//! DATABASE_URL=postgres://localhost/tutaville_test \
//!     cargo test -p tutaville-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `timesheet_lifecycle` - Submission through review, in memory
//! - `roster` - Subjects, invitations, rates and cascades, in memory
//! - `postgres_store` - The `PostgreSQL` store against a live database

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use secrecy::SecretString;

use tutaville_app::AuthContext;
use tutaville_app::db::{self, PgStore};
use tutaville_app::identity::MemoryIdentity;
use tutaville_app::services::{ProvisioningService, RosterService, TimesheetService};
use tutaville_app::store::MemoryStore;
use tutaville_core::Email;

/// Address provisioned as the administrator of every [`World`].
pub const ADMIN_EMAIL: &str = "office@tutaville.test";

/// An in-memory deployment with one signed-in administrator.
pub struct World {
    pub store: MemoryStore,
    pub identity: MemoryIdentity,
    pub admin_email: Email,
    pub admin: AuthContext,
}

impl World {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let identity = MemoryIdentity::new();
        let admin_email = Email::parse(ADMIN_EMAIL).unwrap();

        let session = identity.sign_in(&admin_email).await;
        let admin = ProvisioningService::new(&store, &identity, Some(&admin_email))
            .resolve(&session)
            .await
            .unwrap();
        assert!(admin.is_admin());

        Self {
            store,
            identity,
            admin_email,
            admin,
        }
    }

    pub const fn roster(&self) -> RosterService<'_, MemoryStore, MemoryIdentity> {
        RosterService::new(&self.store, &self.identity)
    }

    pub const fn timesheets(&self) -> TimesheetService<'_, MemoryStore> {
        TimesheetService::new(&self.store)
    }

    /// Sign `email` in and resolve their context, as a login would.
    pub async fn sign_in(&self, email: &str) -> AuthContext {
        let session = self.identity.sign_in(&Email::parse(email).unwrap()).await;
        ProvisioningService::new(&self.store, &self.identity, Some(&self.admin_email))
            .resolve(&session)
            .await
            .unwrap()
    }
}

/// Connect to `DATABASE_URL` and apply migrations.
///
/// Panics when the variable is unset; callers are `#[ignore]`d tests.
pub async fn postgres() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let pool = db::create_pool(&SecretString::from(url), Duration::from_secs(10))
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    PgStore::new(pool)
}

/// `label` with a random suffix, for names that must not collide across runs.
#[must_use]
pub fn unique(label: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{label}-{}", suffix.get(..8).unwrap_or(&suffix))
}

/// A unique email address under the test domain.
#[must_use]
pub fn unique_email(local: &str) -> Email {
    Email::parse(&format!("{}@tutaville.test", unique(local))).unwrap()
}
