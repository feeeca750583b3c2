//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! tv-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! Migrations are embedded from `crates/app/migrations/` at build time.

use secrecy::SecretString;
use tracing::info;

use tutaville_app::db;

use super::CliError;

/// Apply every pending migration.
pub async fn run() -> Result<(), CliError> {
    let database_url = std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| tutaville_app::config::ConfigError::MissingEnvVar("DATABASE_URL".to_owned()))?;

    info!("Connecting to database...");
    let pool = db::create_pool(&database_url, std::time::Duration::from_secs(60)).await?;

    info!(available = db::MIGRATOR.iter().count(), "Running migrations...");
    db::migrate(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}
