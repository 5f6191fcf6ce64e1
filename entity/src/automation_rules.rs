//! SeaORM Entity for automation_rules table.
//! Binds a lifecycle trigger to a delayed action.

use crate::automation_action::AutomationAction;
use crate::trigger_type::TriggerType;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "lifecycle_engine", table_name = "automation_rules")]
pub struct Model {
    #[serde(skip_deserializing)]
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,

    pub profile_id: Id,

    pub name: String,

    pub trigger: TriggerType,

    #[sea_orm(column_type = "JsonBinary")]
    pub action: AutomationAction,

    pub is_active: bool,

    #[serde(skip_deserializing)]
    pub sent_count: i32,

    #[serde(skip_deserializing)]
    pub scheduled_count: i32,

    #[serde(skip_deserializing)]
    pub created_at: DateTimeWithTimeZone,

    #[serde(skip_deserializing)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
