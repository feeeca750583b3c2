//! Tutaville CLI - migrations and operator tooling.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! tv-cli migrate
//!
//! # Manage subjects
//! tv-cli --as admin@tutaville.org subject add "Mathematics"
//! tv-cli --as admin@tutaville.org subject list
//!
//! # Invite a tutor and set their rates
//! tv-cli --as admin@tutaville.org tutor invite -e alice@example.com -f Alice -l Lovelace
//! tv-cli --as admin@tutaville.org tutor assign alice@example.com Mathematics=50 Physics=45
//!
//! # Review timesheets
//! tv-cli --as admin@tutaville.org timesheet list --status pending
//! tv-cli --as admin@tutaville.org timesheet approve 5f0c...
//!
//! # Resolve the role behind an access token
//! tv-cli whoami --token "$ACCESS_TOKEN"
//!
//! # Load subjects and tutors from YAML
//! tv-cli --as admin@tutaville.org seed roster.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `subject` - Add, list and delete subjects
//! - `tutor` - Invite, list, delete and assign rates to tutors
//! - `timesheet` - List, approve and reject timesheets
//! - `whoami` - Resolve an access token to a role
//! - `seed` - Seed subjects and tutors from a YAML file
//!
//! Commands that act on the roster run as the profile given by `--as`
//! (or `BOOTSTRAP_ADMIN_EMAIL` when omitted).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutaville_app::config::SentryConfig;
use tutaville_core::{SubjectId, TimesheetId, TimesheetStatus};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "tv-cli")]
#[command(author, version, about = "Tutaville operator tools")]
struct Cli {
    /// Email of the profile to act as
    #[arg(long = "as", global = true, env = "TV_ACT_AS", value_name = "EMAIL")]
    act_as: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "TV_LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage subjects
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },
    /// Manage tutors
    Tutor {
        #[command(subcommand)]
        action: TutorAction,
    },
    /// Review timesheets
    Timesheet {
        #[command(subcommand)]
        action: TimesheetAction,
    },
    /// Show the profile and role behind an access token
    Whoami {
        /// Identity provider access token
        #[arg(long, env = "TV_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Seed subjects and tutors from a YAML file
    Seed {
        /// Path to the YAML file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum SubjectAction {
    /// Add a subject
    Add {
        /// Subject name
        name: String,
    },
    /// List all subjects
    List,
    /// Delete a subject, its rate assignments, and detach its timesheets
    Delete {
        /// Subject id
        id: SubjectId,
    },
}

#[derive(Subcommand)]
enum TutorAction {
    /// Invite a new tutor
    Invite {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        first_name: String,

        #[arg(short, long)]
        last_name: String,

        #[arg(short, long)]
        phone: Option<String>,
    },
    /// List tutors
    List,
    /// Delete a tutor profile (the login account is kept)
    Delete {
        /// Tutor email
        email: String,
    },
    /// Replace a tutor's subjects and hourly rates
    Assign {
        /// Tutor email
        email: String,

        /// `SUBJECT=RATE` pairs; pass none to clear every assignment
        #[arg(value_parser = parse_rate)]
        rates: Vec<(String, Decimal)>,
    },
}

#[derive(Subcommand)]
enum TimesheetAction {
    /// List timesheets, newest first
    List {
        /// Only this tutor's timesheets
        #[arg(long)]
        tutor: Option<String>,

        /// Only timesheets with this status
        #[arg(long)]
        status: Option<TimesheetStatus>,
    },
    /// Approve a pending timesheet
    Approve { id: TimesheetId },
    /// Reject a pending timesheet
    Reject { id: TimesheetId },
}

fn parse_rate(raw: &str) -> Result<(String, Decimal), String> {
    let (name, rate) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected SUBJECT=RATE, got {raw:?}"))?;
    let rate = rate
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid rate in {raw:?}: {e}"))?;
    Ok((name.trim().to_owned(), rate))
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SentryConfig) -> sentry::ClientInitGuard {
    sentry::init((
        config.dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ))
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tv_cli=info,tutaville_app=info,sqlx=warn".into());

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = SentryConfig::from_env().map(|config| init_sentry(&config));
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let act_as = cli.act_as.as_deref();
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Subject { action } => {
            let rt = commands::Runtime::connect().await?;
            let ctx = rt.actor(act_as).await?;
            match action {
                SubjectAction::Add { name } => {
                    commands::subject::add(&rt.store, &ctx, &name).await?;
                }
                SubjectAction::List => commands::subject::list(&rt.store, &ctx).await?,
                SubjectAction::Delete { id } => {
                    commands::subject::delete(&rt.store, &ctx, id).await?;
                }
            }
        }
        Commands::Tutor { action } => {
            let rt = commands::Runtime::connect().await?;
            let ctx = rt.actor(act_as).await?;
            match action {
                TutorAction::Invite {
                    email,
                    first_name,
                    last_name,
                    phone,
                } => {
                    let invite = tutaville_app::services::TutorInvite {
                        email,
                        first_name,
                        last_name,
                        phone,
                    };
                    commands::tutor::invite(&rt, &ctx, &invite).await?;
                }
                TutorAction::List => commands::tutor::list(&rt.store, &ctx).await?,
                TutorAction::Delete { email } => {
                    commands::tutor::delete(&rt.store, &ctx, &email).await?;
                }
                TutorAction::Assign { email, rates } => {
                    commands::tutor::assign(&rt.store, &ctx, &email, &rates).await?;
                }
            }
        }
        Commands::Timesheet { action } => {
            let rt = commands::Runtime::connect().await?;
            let ctx = rt.actor(act_as).await?;
            match action {
                TimesheetAction::List { tutor, status } => {
                    commands::timesheet::list(&rt, &ctx, tutor.as_deref(), status).await?;
                }
                TimesheetAction::Approve { id } => {
                    commands::timesheet::decide(&rt, &ctx, id, true).await?;
                }
                TimesheetAction::Reject { id } => {
                    commands::timesheet::decide(&rt, &ctx, id, false).await?;
                }
            }
        }
        Commands::Whoami { token } => {
            let rt = commands::Runtime::connect().await?;
            commands::whoami::run(&rt, token).await?;
        }
        Commands::Seed { file } => {
            let rt = commands::Runtime::connect().await?;
            let ctx = rt.actor(act_as).await?;
            commands::seed::run(&rt, &ctx, &file).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(
            parse_rate("Further Maths = 52.50").unwrap(),
            ("Further Maths".to_owned(), Decimal::new(5250, 2))
        );
        assert!(parse_rate("Maths").is_err());
        assert!(parse_rate("Maths=fifty").is_err());
    }

    #[test]
    fn test_cli_parses_assign() {
        let cli = Cli::try_parse_from([
            "tv-cli", "--as", "admin@x.org", "tutor", "assign", "alice@x.org", "Math=50", "Art=0",
        ])
        .unwrap();
        assert_eq!(cli.act_as.as_deref(), Some("admin@x.org"));
        let Commands::Tutor {
            action: TutorAction::Assign { rates, .. },
        } = cli.command
        else {
            panic!("expected tutor assign");
        };
        assert_eq!(rates.len(), 2);
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
