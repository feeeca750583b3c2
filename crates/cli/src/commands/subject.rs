//! Subject commands.
//!
//! None of these contact the identity provider, so they run with only
//! `DATABASE_URL` configured.

use tracing::info;

use tutaville_app::AuthContext;
use tutaville_app::models::Subject;
use tutaville_app::services::RosterService;
use tutaville_app::store::DataStore;
use tutaville_core::SubjectId;

use super::CliError;

pub async fn add<S: DataStore>(
    store: &S,
    ctx: &AuthContext,
    name: &str,
) -> Result<Subject, CliError> {
    let subject = RosterService::without_identity(store)
        .add_subject(ctx, name)
        .await?;
    info!(id = %subject.id, name = %subject.name, "Subject created");
    Ok(subject)
}

pub async fn list<S: DataStore>(store: &S, ctx: &AuthContext) -> Result<(), CliError> {
    let subjects = RosterService::without_identity(store)
        .list_subjects(ctx)
        .await?;

    #[allow(clippy::print_stdout)]
    for subject in &subjects {
        println!("{}  {}", subject.id, subject.name);
    }
    info!(count = subjects.len(), "Subjects listed");
    Ok(())
}

pub async fn delete<S: DataStore>(
    store: &S,
    ctx: &AuthContext,
    id: SubjectId,
) -> Result<(), CliError> {
    let report = RosterService::without_identity(store)
        .delete_subject(ctx, id)
        .await?;
    for (step, rows) in &report.steps {
        info!(%step, rows, "Cascade step");
    }
    info!(%id, "Subject deleted");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tutaville_app::config::AppConfig;
    use tutaville_app::store::MemoryStore;
    use tutaville_core::{Role, UserId};

    use super::*;

    #[tokio::test]
    async fn test_subject_commands_need_no_identity_config() {
        let config = AppConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://db/tv".to_owned())
        })
        .unwrap();
        assert!(config.supabase.is_none());

        let store = MemoryStore::new();
        let ctx = AuthContext::new(UserId::generate(), config.bootstrap_admin_email, Role::Admin);

        let math = add(&store, &ctx, "Mathematics").await.unwrap();
        list(&store, &ctx).await.unwrap();
        delete(&store, &ctx, math.id).await.unwrap();
        assert!(store.subjects().await.unwrap().is_empty());
    }
}
