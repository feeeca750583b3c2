//! Timesheet review commands.

use tracing::info;

use tutaville_app::AuthContext;
use tutaville_app::models::TimesheetFilter;
use tutaville_app::services::TimesheetService;
use tutaville_core::{Decision, Email, TimesheetId, TimesheetStatus};

use super::{CliError, Runtime};

pub async fn list(
    rt: &Runtime,
    ctx: &AuthContext,
    tutor: Option<&str>,
    status: Option<TimesheetStatus>,
) -> Result<(), CliError> {
    let tutor_id = match tutor {
        Some(email) => Some(rt.profile(&Email::parse(email)?).await?.id),
        None => None,
    };
    let entries = TimesheetService::new(&rt.store)
        .list(ctx, TimesheetFilter { tutor_id, status })
        .await?;

    #[allow(clippy::print_stdout)]
    for entry in &entries {
        let ts = &entry.timesheet;
        let amount = entry
            .amount()
            .map_or_else(|| "-".to_owned(), |a| a.round_dp(2).to_string());
        println!(
            "{}  {}  {:<8}  {:<24}  {:<16}  {:>5}h  {:>9}",
            ts.id,
            ts.date_worked,
            ts.status.as_str(),
            entry.tutor_name,
            entry.subject_name,
            ts.hours_worked.to_string(),
            amount,
        );
    }
    info!(count = entries.len(), "Timesheets listed");
    Ok(())
}

pub async fn decide(
    rt: &Runtime,
    ctx: &AuthContext,
    id: TimesheetId,
    approve: bool,
) -> Result<(), CliError> {
    let timesheet = TimesheetService::new(&rt.store)
        .decide(ctx, id, Decision::from_approved(approve))
        .await?;
    info!(%id, status = %timesheet.status, "Timesheet decided");
    Ok(())
}
