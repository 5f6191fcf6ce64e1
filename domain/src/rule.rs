//! Typed segment rules.
//!
//! A [`RuleSpec`] arrives as loosely-typed JSON. [`SegmentRule::compile`] checks it against
//! the field registry and turns it into one variant per field type, so that an operator that
//! makes no sense for a field cannot be represented at all. Evaluating a compiled rule is
//! infallible.

use crate::customer::Customer;
use crate::error::{Error, ValidationErrorKind};
use crate::field::{Field, FlagField, NumberField, TextField};
use entity::criteria::RuleSpec;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumberPredicate {
    Eq(f64),
    Neq(f64),
    Gt(f64),
    Lt(f64),
    Gte(f64),
    Lte(f64),
    /// Inclusive on both ends, `low <= high`.
    Between(f64, f64),
}

/// Needles are stored lowercased; comparisons are case-insensitive.
#[derive(Clone, Debug, PartialEq)]
pub enum TextPredicate {
    Eq(String),
    Neq(String),
    Contains(String),
    NotContains(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumberRule {
    pub field: NumberField,
    pub predicate: NumberPredicate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextRule {
    pub field: TextField,
    pub predicate: TextPredicate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlagRule {
    pub field: FlagField,
    pub expected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentRule {
    Number(NumberRule),
    Text(TextRule),
    Flag(FlagRule),
}

impl SegmentRule {
    /// `index` is the rule's position in its criteria and is reported in every error.
    pub fn compile(index: usize, spec: &RuleSpec) -> Result<Self, Error> {
        let field = Field::parse(&spec.field).ok_or_else(|| {
            Error::validation(ValidationErrorKind::UnknownField {
                index,
                field: spec.field.clone(),
            })
        })?;

        let illegal_operator = || {
            Error::validation(ValidationErrorKind::IllegalOperator {
                index,
                field: spec.field.clone(),
                operator: spec.operator.clone(),
            })
        };
        let invalid_value = |reason: &str| {
            Error::validation(ValidationErrorKind::InvalidValue {
                index,
                field: spec.field.clone(),
                reason: reason.to_owned(),
            })
        };

        match field {
            Field::Number(field) => {
                let predicate = match spec.operator.as_str() {
                    "between" => {
                        let (low, high) = match &spec.value {
                            Value::Array(bounds) if bounds.len() == 2 => (
                                number(&bounds[0]).ok_or_else(|| invalid_value("lower bound is not a number"))?,
                                number(&bounds[1]).ok_or_else(|| invalid_value("upper bound is not a number"))?,
                            ),
                            _ => return Err(invalid_value("between expects a [low, high] pair")),
                        };
                        if low > high {
                            return Err(invalid_value("lower bound is greater than upper bound"));
                        }
                        NumberPredicate::Between(low, high)
                    }
                    operator => {
                        let constructor: fn(f64) -> NumberPredicate = match operator {
                            "eq" => NumberPredicate::Eq,
                            "neq" => NumberPredicate::Neq,
                            "gt" => NumberPredicate::Gt,
                            "lt" => NumberPredicate::Lt,
                            "gte" => NumberPredicate::Gte,
                            "lte" => NumberPredicate::Lte,
                            _ => return Err(illegal_operator()),
                        };
                        constructor(number(&spec.value).ok_or_else(|| invalid_value("expected a number"))?)
                    }
                };
                Ok(SegmentRule::Number(NumberRule { field, predicate }))
            }
            Field::Text(field) => {
                let constructor: fn(String) -> TextPredicate = match spec.operator.as_str() {
                    "eq" => TextPredicate::Eq,
                    "neq" => TextPredicate::Neq,
                    "contains" => TextPredicate::Contains,
                    "not_contains" => TextPredicate::NotContains,
                    _ => return Err(illegal_operator()),
                };
                let needle = match &spec.value {
                    Value::String(text) => text.to_lowercase(),
                    Value::Number(number) => number.to_string(),
                    _ => return Err(invalid_value("expected a string")),
                };
                Ok(SegmentRule::Text(TextRule {
                    field,
                    predicate: constructor(needle),
                }))
            }
            Field::Flag(field) => {
                if spec.operator != "eq" {
                    return Err(illegal_operator());
                }
                let expected = flag(&spec.value).ok_or_else(|| invalid_value("expected true or false"))?;
                Ok(SegmentRule::Flag(FlagRule { field, expected }))
            }
        }
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            SegmentRule::Number(rule) => rule.matches(customer),
            SegmentRule::Text(rule) => rule.matches(customer),
            SegmentRule::Flag(rule) => rule.matches(customer),
        }
    }
}

/// `evaluateRule(rule, customer) -> bool`
pub fn evaluate_rule(rule: &SegmentRule, customer: &Customer) -> bool {
    rule.matches(customer)
}

impl NumberRule {
    fn matches(&self, customer: &Customer) -> bool {
        let actual = match self.field {
            NumberField::TotalBookings => customer.total_bookings,
            NumberField::TotalMessages => customer.total_messages,
            NumberField::DaysSinceLastSeen => customer.days_since_last_seen,
        } as f64;

        match self.predicate {
            NumberPredicate::Eq(expected) => actual == expected,
            NumberPredicate::Neq(expected) => actual != expected,
            NumberPredicate::Gt(expected) => actual > expected,
            NumberPredicate::Lt(expected) => actual < expected,
            NumberPredicate::Gte(expected) => actual >= expected,
            NumberPredicate::Lte(expected) => actual <= expected,
            NumberPredicate::Between(low, high) => low <= actual && actual <= high,
        }
    }
}

impl TextRule {
    fn matches(&self, customer: &Customer) -> bool {
        match self.field {
            // Positive operators match when any tag does, negative ones when no tag does.
            TextField::Tags => {
                let mut tags = customer.tags.iter().map(|tag| tag.to_lowercase());
                match &self.predicate {
                    TextPredicate::Eq(needle) => tags.any(|tag| tag == *needle),
                    TextPredicate::Neq(needle) => !tags.any(|tag| tag == *needle),
                    TextPredicate::Contains(needle) => tags.any(|tag| tag.contains(needle.as_str())),
                    TextPredicate::NotContains(needle) => {
                        !tags.any(|tag| tag.contains(needle.as_str()))
                    }
                }
            }
            TextField::Source | TextField::Email => {
                let value = match self.field {
                    TextField::Source => customer.source.as_deref(),
                    _ => customer.email.as_deref(),
                }
                .unwrap_or_default()
                .to_lowercase();

                match &self.predicate {
                    TextPredicate::Eq(needle) => value == *needle,
                    TextPredicate::Neq(needle) => value != *needle,
                    TextPredicate::Contains(needle) => value.contains(needle.as_str()),
                    TextPredicate::NotContains(needle) => !value.contains(needle.as_str()),
                }
            }
        }
    }
}

impl FlagRule {
    fn matches(&self, customer: &Customer) -> bool {
        let actual = match self.field {
            FlagField::HasEmail => customer.has_email(),
            FlagField::IsSubscriber => customer.is_subscriber,
        };
        actual == self.expected
    }
}

fn number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.trim().eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.trim().eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
