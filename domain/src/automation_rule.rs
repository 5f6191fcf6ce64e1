use crate::action;
use crate::automation_action::AutomationAction;
use crate::clock::Clock;
use crate::error::Error;
use crate::storage::RuleRepository;
use crate::trigger_type::TriggerType;
use crate::{automation_rules, Id};
use log::*;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NewAutomationRule {
    pub name: String,
    pub trigger: TriggerType,
    pub action: AutomationAction,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Changes to an existing rule. Already scheduled executions keep the action they were
/// created with.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AutomationRuleUpdate {
    pub name: String,
    pub trigger: TriggerType,
    pub action: AutomationAction,
}

#[derive(Clone)]
pub struct RuleStore {
    rules: Arc<dyn RuleRepository>,
    clock: Arc<dyn Clock>,
}

impl RuleStore {
    pub fn new(rules: Arc<dyn RuleRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { rules, clock }
    }

    pub async fn create(
        &self,
        profile_id: Id,
        new_rule: NewAutomationRule,
    ) -> Result<automation_rules::Model, Error> {
        let name = action::validate_name(&new_rule.name)?;
        action::validate(0, &new_rule.action)?;

        let now = self.clock.now();
        let rule = self
            .rules
            .insert(automation_rules::Model {
                id: Id::new_v4(),
                profile_id,
                name,
                trigger: new_rule.trigger,
                action: new_rule.action,
                is_active: new_rule.is_active,
                sent_count: 0,
                scheduled_count: 0,
                created_at: now.into(),
                updated_at: now.into(),
            })
            .await?;

        info!(
            "Created automation rule {} ({}) on {}",
            rule.name, rule.id, rule.trigger
        );
        Ok(rule)
    }

    pub async fn update(
        &self,
        id: Id,
        update: AutomationRuleUpdate,
    ) -> Result<automation_rules::Model, Error> {
        let name = action::validate_name(&update.name)?;
        action::validate(0, &update.action)?;

        self.rules
            .update(id, name, update.trigger, update.action)
            .await
    }

    /// Deactivation stops future occurrences from scheduling; it cancels nothing.
    pub async fn toggle(&self, id: Id, is_active: bool) -> Result<automation_rules::Model, Error> {
        let rule = self.rules.set_active(id, is_active).await?;
        debug!("Automation rule {} is_active={}", rule.id, rule.is_active);
        Ok(rule)
    }

    pub async fn delete(&self, id: Id) -> Result<(), Error> {
        self.rules.delete(id).await?;
        info!("Deleted automation rule {id}");
        Ok(())
    }

    pub async fn find(&self, id: Id) -> Result<automation_rules::Model, Error> {
        self.rules.find(id).await?.ok_or_else(Error::not_found)
    }

    pub async fn list(&self, profile_id: Id) -> Result<Vec<automation_rules::Model>, Error> {
        self.rules.list(profile_id).await
    }

    pub async fn list_all_active(&self) -> Result<Vec<automation_rules::Model>, Error> {
        self.rules.list_all_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{DomainErrorKind, ValidationErrorKind};
    use crate::storage::memory::InMemoryStore;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> RuleStore {
        RuleStore::new(InMemoryStore::new(), Arc::new(ManualClock::new(Utc::now())))
    }

    fn thanks() -> NewAutomationRule {
        NewAutomationRule {
            name: " Thank you mail ".to_string(),
            trigger: TriggerType::AfterBooking,
            action: AutomationAction::send_email("thanks", 24),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_trims_the_name_and_starts_counters_at_zero() -> Result<(), Error> {
        let rules = store();
        let profile_id = Id::new_v4();

        let rule = rules.create(profile_id, thanks()).await?;

        assert_eq!(rule.name, "Thank you mail");
        assert_eq!(rule.sent_count, 0);
        assert_eq!(rule.scheduled_count, 0);
        assert_eq!(rules.list(profile_id).await?, vec![rule]);

        Ok(())
    }

    #[tokio::test]
    async fn coupons_need_a_coupon_id() {
        let rules = store();
        let mut rule = thanks();
        rule.action = AutomationAction {
            coupon_id: None,
            ..AutomationAction::send_coupon("x", 0)
        };

        let err = rules.create(Id::new_v4(), rule).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Validation(ValidationErrorKind::MissingActionParameter {
                index: 0,
                parameter: "coupon_id"
            })
        );
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let rules = store();
        let mut rule = thanks();
        rule.name = "   ".to_string();

        let err = rules.create(Id::new_v4(), rule).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Validation(ValidationErrorKind::BlankName)
        );
    }

    #[tokio::test]
    async fn update_toggle_and_delete() -> Result<(), Error> {
        let rules = store();
        let rule = rules.create(Id::new_v4(), thanks()).await?;

        let updated = rules
            .update(
                rule.id,
                AutomationRuleUpdate {
                    name: "Come back".to_string(),
                    trigger: TriggerType::NoVisit60d,
                    action: AutomationAction::send_coupon("WELCOMEBACK", 0),
                },
            )
            .await?;
        assert_eq!(updated.trigger, TriggerType::NoVisit60d);
        assert_eq!(updated.name, "Come back");

        let paused = rules.toggle(rule.id, false).await?;
        assert!(!paused.is_active);
        assert!(rules.list_all_active().await?.is_empty());

        rules.delete(rule.id).await?;
        assert!(rules.find(rule.id).await.unwrap_err().is_not_found());

        Ok(())
    }

    #[test]
    fn unknown_triggers_do_not_deserialize() {
        let result = serde_json::from_value::<NewAutomationRule>(json!({
            "name": "Anniversary",
            "trigger": "anniversary",
            "action": { "type": "add_tag", "tag": "loyal" }
        }));

        assert!(result.is_err());
    }

    #[test]
    fn rules_are_active_unless_stated_otherwise() {
        let rule: NewAutomationRule = serde_json::from_value(json!({
            "name": "Tag bookers",
            "trigger": "after_booking",
            "action": { "type": "add_tag", "tag": "booked" }
        }))
        .unwrap();

        assert!(rule.is_active);
    }
}
