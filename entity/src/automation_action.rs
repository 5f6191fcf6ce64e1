//! The action half of an automation rule or a segment auto-action.

use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendCoupon,
    AddTag,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::SendEmail => write!(fmt, "send_email"),
            ActionType::SendCoupon => write!(fmt, "send_coupon"),
            ActionType::AddTag => write!(fmt, "add_tag"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct AutomationAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub delay_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl AutomationAction {
    pub fn send_email(template_id: &str, delay_hours: u32) -> Self {
        Self {
            action_type: ActionType::SendEmail,
            delay_hours,
            template_id: Some(template_id.to_owned()),
            coupon_id: None,
            tag: None,
        }
    }

    pub fn send_coupon(coupon_id: &str, delay_hours: u32) -> Self {
        Self {
            action_type: ActionType::SendCoupon,
            delay_hours,
            template_id: None,
            coupon_id: Some(coupon_id.to_owned()),
            tag: None,
        }
    }

    pub fn add_tag(tag: &str, delay_hours: u32) -> Self {
        Self {
            action_type: ActionType::AddTag,
            delay_hours,
            template_id: None,
            coupon_id: None,
            tag: Some(tag.to_owned()),
        }
    }

    /// Actions that reach the customer through their email address.
    pub fn needs_email(&self) -> bool {
        matches!(
            self.action_type,
            ActionType::SendEmail | ActionType::SendCoupon
        )
    }
}

/// Ordered auto-actions attached to a segment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct AutoActions(pub Vec<AutomationAction>);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_deserializes_from_dashboard_shape() {
        let action: AutomationAction = serde_json::from_value(json!({
            "type": "send_email",
            "delay_hours": 24,
            "template_id": "thanks"
        }))
        .unwrap();

        assert_eq!(action, AutomationAction::send_email("thanks", 24));
        assert!(action.needs_email());
    }

    #[test]
    fn delay_defaults_to_zero() {
        let action: AutomationAction =
            serde_json::from_value(json!({ "type": "add_tag", "tag": "vip" })).unwrap();

        assert_eq!(action.delay_hours, 0);
        assert!(!action.needs_email());
    }
}
