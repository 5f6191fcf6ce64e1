use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status of a scheduled execution through its lifecycle.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Default, Serialize, DeriveActiveEnum,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "execution_status")]
pub enum ExecutionStatus {
    /// Waiting for its due time
    #[sea_orm(string_value = "scheduled")]
    #[default]
    Scheduled,
    /// Claimed by a sweep worker, collaborator call pending
    #[sea_orm(string_value = "in_flight")]
    InFlight,
    /// Collaborator accepted the action
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Collaborator rejected the action or the claim expired
    #[sea_orm(string_value = "failed")]
    Failed,
    /// A precondition no longer held at execution time
    #[sea_orm(string_value = "skipped")]
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Sent | ExecutionStatus::Failed | ExecutionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Scheduled => write!(fmt, "scheduled"),
            ExecutionStatus::InFlight => write!(fmt, "in_flight"),
            ExecutionStatus::Sent => write!(fmt, "sent"),
            ExecutionStatus::Failed => write!(fmt, "failed"),
            ExecutionStatus::Skipped => write!(fmt, "skipped"),
        }
    }
}
