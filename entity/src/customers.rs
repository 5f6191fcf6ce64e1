//! SeaORM Entity for the product's customers table.
//! The engine reads customers and only ever writes back to `tags`.

use crate::Id;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct CustomerTags(pub BTreeSet<String>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(schema_name = "lifecycle_engine", table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,

    /// The hosted profile (tenant) this customer belongs to
    pub profile_id: Id,

    pub display_name: Option<String>,

    pub email: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub tags: CustomerTags,

    /// Comma separated acquisition channels, e.g. "booking,contact"
    pub source: Option<String>,

    pub total_bookings: i32,

    pub total_messages: i32,

    pub is_subscriber: bool,

    pub birthday: Option<Date>,

    pub last_seen_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
