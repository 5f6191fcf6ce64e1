use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The kind of lifecycle occurrence an automation rule reacts to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Deserialize, Serialize, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "trigger_type")]
pub enum TriggerType {
    #[sea_orm(string_value = "after_booking")]
    AfterBooking,
    #[sea_orm(string_value = "after_contact")]
    AfterContact,
    #[sea_orm(string_value = "after_subscribe")]
    AfterSubscribe,
    #[sea_orm(string_value = "after_stamp_complete")]
    AfterStampComplete,
    #[serde(rename = "no_visit_30d")]
    #[sea_orm(string_value = "no_visit_30d")]
    NoVisit30d,
    #[serde(rename = "no_visit_60d")]
    #[sea_orm(string_value = "no_visit_60d")]
    NoVisit60d,
    #[serde(rename = "no_visit_90d")]
    #[sea_orm(string_value = "no_visit_90d")]
    NoVisit90d,
    #[sea_orm(string_value = "birthday")]
    Birthday,
}

impl TriggerType {
    /// Triggers fired by the periodic sweep rather than by an inbound event.
    pub fn is_time_derived(&self) -> bool {
        matches!(
            self,
            TriggerType::NoVisit30d
                | TriggerType::NoVisit60d
                | TriggerType::NoVisit90d
                | TriggerType::Birthday
        )
    }

    /// Inactivity threshold in days for the no-visit triggers.
    pub fn no_visit_threshold_days(&self) -> Option<i64> {
        match self {
            TriggerType::NoVisit30d => Some(30),
            TriggerType::NoVisit60d => Some(60),
            TriggerType::NoVisit90d => Some(90),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::AfterBooking => write!(fmt, "after_booking"),
            TriggerType::AfterContact => write!(fmt, "after_contact"),
            TriggerType::AfterSubscribe => write!(fmt, "after_subscribe"),
            TriggerType::AfterStampComplete => write!(fmt, "after_stamp_complete"),
            TriggerType::NoVisit30d => write!(fmt, "no_visit_30d"),
            TriggerType::NoVisit60d => write!(fmt, "no_visit_60d"),
            TriggerType::NoVisit90d => write!(fmt, "no_visit_90d"),
            TriggerType::Birthday => write!(fmt, "birthday"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_visit_triggers_serialize_with_separated_day_suffix() {
        assert_eq!(
            serde_json::to_string(&TriggerType::NoVisit30d).unwrap(),
            "\"no_visit_30d\""
        );
        assert_eq!(
            serde_json::from_str::<TriggerType>("\"no_visit_90d\"").unwrap(),
            TriggerType::NoVisit90d
        );
    }

    #[test]
    fn only_sweep_triggers_are_time_derived() {
        assert!(TriggerType::Birthday.is_time_derived());
        assert!(TriggerType::NoVisit60d.is_time_derived());
        assert!(!TriggerType::AfterBooking.is_time_derived());
        assert_eq!(TriggerType::NoVisit60d.no_visit_threshold_days(), Some(60));
        assert_eq!(TriggerType::Birthday.no_visit_threshold_days(), None);
    }
}
