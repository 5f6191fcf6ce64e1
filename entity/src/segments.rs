//! SeaORM Entity for segments table.
//! A segment is a named, dynamically computed group of customers.

use crate::automation_action::AutoActions;
use crate::criteria::{CriteriaSpec, MemberIds};
use crate::segment_kind::SegmentKind;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "lifecycle_engine", table_name = "segments")]
pub struct Model {
    #[serde(skip_deserializing)]
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,

    pub profile_id: Id,

    pub kind: SegmentKind,

    pub name: String,

    pub color: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub criteria: CriteriaSpec,

    #[sea_orm(column_type = "JsonBinary")]
    pub auto_actions: AutoActions,

    /// Members as of the last refresh. Replaced wholesale, never edited in place.
    #[sea_orm(column_type = "JsonBinary")]
    pub member_ids: MemberIds,

    pub member_count: i32,

    /// Bumped by every membership replacement; guards concurrent refreshes.
    pub membership_version: i64,

    pub refreshed_at: Option<DateTimeWithTimeZone>,

    pub is_active: bool,

    #[serde(skip_deserializing)]
    pub created_at: DateTimeWithTimeZone,

    #[serde(skip_deserializing)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
