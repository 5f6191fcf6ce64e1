use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Default, Serialize, DeriveActiveEnum,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "segment_kind")]
pub enum SegmentKind {
    /// Seeded once per profile, never deletable
    #[sea_orm(string_value = "system")]
    System,
    #[sea_orm(string_value = "custom")]
    #[default]
    Custom,
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentKind::System => write!(fmt, "system"),
            SegmentKind::Custom => write!(fmt, "custom"),
        }
    }
}
