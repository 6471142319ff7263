//! Admin-initiated account removal.
//!
//! The store has no cross-table transaction in this access pattern, so the
//! account is torn down as an ordered list of steps. Best-effort steps log
//! and record a warning; a critical step aborts the run.

use tracing::{error, info, warn};
use uuid::Uuid;

use super::dto::{DeletionReport, StepWarning};
use super::repo::ProfileStore;
use super::repo_types::DependentTable;
use crate::auth::IdentityAdmin;
use crate::error::{ErrorDetail, ServiceError, ServiceResult, StoreError};

pub const DELETE_ACCOUNT_FAILED: &str = "Unable to delete user account";
pub const DELETE_PROFILE_FAILED: &str = "Database error deleting user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionAction {
    Dependents(DependentTable),
    AuthIdentity,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionStep {
    pub action: DeletionAction,
    pub critical: bool,
}

impl DeletionStep {
    const fn best_effort(table: DependentTable) -> Self {
        Self {
            action: DeletionAction::Dependents(table),
            critical: false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.action {
            DeletionAction::Dependents(table) => table.table(),
            DeletionAction::AuthIdentity => "auth_identity",
            DeletionAction::Profile => "profile",
        }
    }
}

/// Children before parents, auth identity before the profile row.
const DEPENDENT_STEPS: [DeletionStep; 8] = [
    DeletionStep::best_effort(DependentTable::Comments),
    DeletionStep::best_effort(DependentTable::Ratings),
    DeletionStep::best_effort(DependentTable::CollectionDishes),
    DeletionStep::best_effort(DependentTable::Collections),
    DeletionStep::best_effort(DependentTable::DishCategories),
    DeletionStep::best_effort(DependentTable::DishIngredients),
    DeletionStep::best_effort(DependentTable::DishSteps),
    DeletionStep::best_effort(DependentTable::Dishes),
];

pub fn deletion_plan(with_identity: bool) -> Vec<DeletionStep> {
    let mut plan = DEPENDENT_STEPS.to_vec();
    if with_identity {
        plan.push(DeletionStep {
            action: DeletionAction::AuthIdentity,
            critical: true,
        });
    }
    plan.push(DeletionStep {
        action: DeletionAction::Profile,
        critical: true,
    });
    plan
}

enum StepOutcome {
    Done(u64),
    Failed(String),
}

async fn run_step(
    step: &DeletionStep,
    user_id: Uuid,
    store: &dyn ProfileStore,
    identity_admin: Option<&dyn IdentityAdmin>,
) -> StepOutcome {
    match step.action {
        DeletionAction::Dependents(table) => match store.delete_dependents(table, user_id).await {
            Ok(n) => StepOutcome::Done(n),
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
        DeletionAction::AuthIdentity => match identity_admin {
            Some(admin) => match admin.delete_identity(user_id).await {
                Ok(()) => StepOutcome::Done(1),
                Err(e) => StepOutcome::Failed(format!("{e:#}")),
            },
            None => StepOutcome::Done(0),
        },
        // a row that is already gone counts as deleted
        DeletionAction::Profile => match store.delete_profile(user_id).await {
            Ok(n) => StepOutcome::Done(n),
            Err(StoreError::NoRows) => StepOutcome::Done(0),
            Err(e) => StepOutcome::Failed(e.to_string()),
        },
    }
}

fn critical_error(step: &DeletionStep, user_id: Uuid, message: String) -> ServiceError {
    let category = match step.action {
        DeletionAction::AuthIdentity => DELETE_ACCOUNT_FAILED,
        _ => DELETE_PROFILE_FAILED,
    };
    ServiceError::Internal(
        ErrorDetail::new(category, message)
            .with("user_id", user_id)
            .with("step", step.name()),
    )
}

/// Runs `plan` in order for `user_id`.
pub async fn execute(
    plan: &[DeletionStep],
    user_id: Uuid,
    store: &dyn ProfileStore,
    identity_admin: Option<&dyn IdentityAdmin>,
) -> ServiceResult<DeletionReport> {
    let mut report = DeletionReport::default();

    for step in plan {
        match run_step(step, user_id, store, identity_admin).await {
            StepOutcome::Done(rows) => {
                info!(user_id = %user_id, step = step.name(), rows, "deletion step done");
            }
            StepOutcome::Failed(message) if step.critical => {
                error!(user_id = %user_id, step = step.name(), error = %message, "critical deletion step failed");
                return Err(critical_error(step, user_id, message));
            }
            StepOutcome::Failed(message) => {
                warn!(
                    user_id = %user_id,
                    step = step.name(),
                    error = %message,
                    side_effect = "cascade_delete",
                    "best-effort deletion step failed; continuing"
                );
                report.warnings.push(StepWarning {
                    step: step.name(),
                    message,
                });
            }
        }
    }

    Ok(report)
}
