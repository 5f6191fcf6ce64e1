use crate::automation_action::{ActionType, AutomationAction};
use crate::error::{Error, ValidationErrorKind};

/// Checks that `action` carries the parameter its type needs. `index` is the action's
/// position in a segment's auto-actions, `0` for a rule's single action.
pub fn validate(index: usize, action: &AutomationAction) -> Result<(), Error> {
    let (parameter, value) = match action.action_type {
        ActionType::SendEmail => ("template_id", &action.template_id),
        ActionType::SendCoupon => ("coupon_id", &action.coupon_id),
        ActionType::AddTag => ("tag", &action.tag),
    };

    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(()),
        _ => Err(Error::validation(
            ValidationErrorKind::MissingActionParameter { index, parameter },
        )),
    }
}

pub fn validate_all(actions: &[AutomationAction]) -> Result<(), Error> {
    actions
        .iter()
        .enumerate()
        .try_for_each(|(index, action)| validate(index, action))
}

pub(crate) fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation(ValidationErrorKind::BlankName));
    }
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainErrorKind;

    #[test]
    fn complete_actions_pass() {
        assert!(validate_all(&[
            AutomationAction::send_email("welcome", 0),
            AutomationAction::send_coupon("SPRING10", 24),
            AutomationAction::add_tag("vip", 0),
        ])
        .is_ok());
    }

    #[test]
    fn blank_tags_are_rejected_with_the_action_index() {
        let result = validate_all(&[
            AutomationAction::send_email("welcome", 0),
            AutomationAction::add_tag("  ", 0),
        ]);

        assert_eq!(
            result.unwrap_err().error_kind,
            DomainErrorKind::Validation(ValidationErrorKind::MissingActionParameter {
                index: 1,
                parameter: "tag"
            })
        );
    }

    #[test]
    fn coupons_need_a_coupon_id() {
        let mut action = AutomationAction::send_coupon("SPRING10", 0);
        action.coupon_id = None;

        assert!(validate(0, &action).is_err());
    }

    #[test]
    fn emails_need_a_template() {
        let mut action = AutomationAction::send_email("welcome", 0);
        action.template_id = Some(String::new());

        assert!(validate(0, &action).is_err());
    }

    #[test]
    fn names_are_trimmed_and_must_not_be_blank() {
        assert_eq!(validate_name("  Regulars ").unwrap(), "Regulars");
        assert!(validate_name(" \t").is_err());
    }
}
