//! Resolve an access token to a profile and role.

use secrecy::SecretString;
use tracing::info;

use tutaville_app::services::ProvisioningService;

use super::{CliError, Runtime};

/// Resolve the session behind `token`, provisioning its profile if needed.
pub async fn run(rt: &Runtime, token: String) -> Result<(), CliError> {
    let identity = rt.identity()?.with_access_token(SecretString::from(token));
    let provisioning = ProvisioningService::new(
        &rt.store,
        &identity,
        rt.config.bootstrap_admin_email.as_ref(),
    );
    let ctx = provisioning.current_context().await?;

    #[allow(clippy::print_stdout)]
    {
        println!("user:  {}", ctx.user_id);
        println!("email: {}", ctx.email.as_ref().map_or("-", |e| e.as_str()));
        println!("role:  {}", ctx.role);
    }
    info!(user_id = %ctx.user_id, role = %ctx.role, "Session resolved");
    Ok(())
}
