//! Cascade plan execution.
//!
//! Every step of a plan runs inside one transaction. If any step fails the
//! transaction is dropped (rolled back) and the error is returned, so a plan
//! either completes or leaves the database untouched.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::store::{CascadePlan, CascadeReport, CascadeStep, StoreError};

/// Executes [`CascadePlan`]s.
pub struct CascadeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CascadeRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Run every step of `plan` in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's `StoreError`; nothing is committed.
    pub async fn execute(&self, plan: &CascadePlan) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut report = CascadeReport::default();

        for step in plan.steps() {
            let rows = run_step(&mut tx, *step).await?;
            debug!(%step, rows, "Cascade step applied");
            report.record(*step, rows);
        }

        tx.commit().await?;
        info!(steps = report.steps.len(), root_deleted = report.root_deleted(), "Cascade committed");
        Ok(report)
    }
}

async fn run_step(tx: &mut Transaction<'_, Postgres>, step: CascadeStep) -> Result<u64, StoreError> {
    let result = match step {
        CascadeStep::DeleteAssignmentsForSubject(id) => {
            sqlx::query("DELETE FROM tutor_subjects WHERE subject_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?
        }
        CascadeStep::DeleteAssignmentsForTutor(id) => {
            sqlx::query("DELETE FROM tutor_subjects WHERE tutor_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?
        }
        CascadeStep::DetachTimesheetsFromSubject(id) => {
            sqlx::query(
                r"
                UPDATE timesheets t
                SET subject_id = NULL, subject_name = s.name, updated_at = NOW()
                FROM subjects s
                WHERE s.id = $1 AND t.subject_id = $1
                ",
            )
            .bind(id)
            .execute(&mut **tx)
            .await?
        }
        CascadeStep::DetachTimesheetsFromTutor(id) => {
            sqlx::query(
                r"
                UPDATE timesheets t
                SET tutor_id = NULL,
                    tutor_name = COALESCE(
                        NULLIF(concat_ws(' ', NULLIF(btrim(p.first_name), ''), NULLIF(btrim(p.last_name), '')), ''),
                        p.email,
                        t.tutor_name
                    ),
                    updated_at = NOW()
                FROM profiles p
                WHERE p.id = $1 AND t.tutor_id = $1
                ",
            )
            .bind(id)
            .execute(&mut **tx)
            .await?
        }
        CascadeStep::DeleteSubject(id) => {
            sqlx::query("DELETE FROM subjects WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?
        }
        CascadeStep::DeleteProfile(id) => {
            sqlx::query("DELETE FROM profiles WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?
        }
    };
    Ok(result.rows_affected())
}
