//! CLI command implementations.

pub mod migrate;
pub mod seed;
pub mod subject;
pub mod timesheet;
pub mod tutor;
pub mod whoami;

use thiserror::Error;
use tracing::info;

use tutaville_app::config::{AppConfig, ConfigError};
use tutaville_app::db::{self, PgStore};
use tutaville_app::identity::{IdentityError, SupabaseAuth};
use tutaville_app::models::Profile;
use tutaville_app::store::DataStore;
use tutaville_app::{AuthContext, DomainError};
use tutaville_core::{Email, EmailError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No `--as` flag and no bootstrap admin configured.
    #[error("No acting user: pass --as <email> or set BOOTSTRAP_ADMIN_EMAIL")]
    NoActor,

    #[error("No profile found for {0}")]
    UnknownUser(Email),

    #[error("No subject named {0:?}")]
    UnknownSubject(String),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration plus a connected store, shared by the roster commands.
///
/// The identity client is built on demand by the commands that need it.
pub struct Runtime {
    pub config: AppConfig,
    pub store: PgStore,
}

impl Runtime {
    /// Load configuration and connect to the database.
    pub async fn connect() -> Result<Self, CliError> {
        let config = AppConfig::from_env()?;
        info!("Connecting to database...");
        let pool = db::create_pool(&config.database_url, config.store_timeout).await?;
        Ok(Self {
            config,
            store: PgStore::new(pool),
        })
    }

    /// Identity client acting with the service-role key.
    pub fn identity(&self) -> Result<SupabaseAuth, CliError> {
        let supabase = self.config.require_supabase()?;
        Ok(SupabaseAuth::new(supabase, self.config.identity_timeout)?)
    }

    /// Context for the operator: the `--as` profile, else the bootstrap admin.
    pub async fn actor(&self, act_as: Option<&str>) -> Result<AuthContext, CliError> {
        let email = match act_as {
            Some(raw) => Email::parse(raw)?,
            None => self
                .config
                .bootstrap_admin_email
                .clone()
                .ok_or(CliError::NoActor)?,
        };
        let profile = self.profile(&email).await?;
        Ok(AuthContext::from_profile(&profile))
    }

    /// Look up a profile by email.
    pub async fn profile(&self, email: &Email) -> Result<Profile, CliError> {
        profile_by_email(&self.store, email).await
    }
}

/// The profile registered under `email`.
pub async fn profile_by_email<S: DataStore>(
    store: &S,
    email: &Email,
) -> Result<Profile, CliError> {
    store
        .profile_by_email(email)
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| CliError::UnknownUser(email.clone()))
}
