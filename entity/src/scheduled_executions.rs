//! SeaORM Entity for scheduled_executions table.
//! One row per action queued for one customer; doubles as the execution log.

use crate::automation_action::AutomationAction;
use crate::execution_status::ExecutionStatus;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "lifecycle_engine", table_name = "scheduled_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,

    pub profile_id: Id,

    /// Set when an automation rule produced this execution
    pub rule_id: Option<Id>,

    /// Set when a segment join produced this execution
    pub segment_id: Option<Id>,

    pub customer_id: Id,

    /// Snapshot of the action at scheduling time
    #[sea_orm(column_type = "JsonBinary")]
    pub action: AutomationAction,

    /// Unique: (rule or segment, customer, triggering occurrence)
    #[sea_orm(unique)]
    pub trigger_key: String,

    pub due_at: DateTimeWithTimeZone,

    pub status: ExecutionStatus,

    /// Bumped by every status transition; guards claims
    pub version: i32,

    /// Skip reason code or failure description
    pub reason: Option<String>,

    pub claimed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub resolved_at: Option<DateTimeWithTimeZone>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
