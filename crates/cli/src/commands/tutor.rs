//! Tutor commands.

use rust_decimal::Decimal;
use tracing::{info, warn};

use tutaville_app::AuthContext;
use tutaville_app::services::{DesiredRate, InviteDelivery, RosterService, TutorInvite};
use tutaville_app::store::DataStore;
use tutaville_core::Email;

use super::{CliError, Runtime, profile_by_email};

pub async fn invite(rt: &Runtime, ctx: &AuthContext, invite: &TutorInvite) -> Result<(), CliError> {
    let identity = rt.identity()?;
    let pending = RosterService::new(&rt.store, &identity)
        .invite_tutor(ctx, invite)
        .await?;

    info!(id = %pending.profile.id, delivery = ?pending.delivery, "Tutor invited");
    if pending.delivery == (InviteDelivery::TemporaryPassword { recovery_sent: false }) {
        warn!("No password email was sent; ask the tutor to use 'forgot password'");
    }
    Ok(())
}

pub async fn list<S: DataStore>(store: &S, ctx: &AuthContext) -> Result<(), CliError> {
    let tutors = RosterService::without_identity(store)
        .list_tutors(ctx)
        .await?;

    #[allow(clippy::print_stdout)]
    for tutor in &tutors {
        println!(
            "{}  {:<30}  {}",
            tutor.id,
            tutor.display_name().unwrap_or_default(),
            tutor.phone.as_deref().unwrap_or("-"),
        );
    }
    info!(count = tutors.len(), "Tutors listed");
    Ok(())
}

pub async fn delete<S: DataStore>(
    store: &S,
    ctx: &AuthContext,
    email: &str,
) -> Result<(), CliError> {
    let tutor = profile_by_email(store, &Email::parse(email)?).await?;
    RosterService::without_identity(store)
        .delete_tutor(ctx, tutor.id)
        .await?;
    info!(id = %tutor.id, "Tutor deleted; the login account was not removed");
    Ok(())
}

/// Resolve subject names to ids and replace the tutor's assignment set.
pub async fn assign<S: DataStore>(
    store: &S,
    ctx: &AuthContext,
    email: &str,
    rates: &[(String, Decimal)],
) -> Result<(), CliError> {
    let tutor = profile_by_email(store, &Email::parse(email)?).await?;

    let mut desired = Vec::with_capacity(rates.len());
    for (name, rate) in rates {
        let subject = store
            .subject_by_name(name)
            .await
            .map_err(tutaville_app::DomainError::from)?
            .ok_or_else(|| CliError::UnknownSubject(name.clone()))?;
        desired.push(DesiredRate {
            subject_id: subject.id,
            rate_per_hour: *rate,
        });
    }

    let assignments = RosterService::without_identity(store)
        .set_assignments(ctx, tutor.id, &desired)
        .await?;
    info!(tutor = %tutor.id, count = assignments.len(), "Assignments replaced");
    Ok(())
}
