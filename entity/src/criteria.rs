//! JSON payloads stored in the `segments.criteria` and `segments.member_ids` columns.
//!
//! Criteria are persisted in the same loosely-typed shape the dashboard submits them in.
//! The `domain` crate compiles them into typed rules and rejects anything the field
//! registry does not allow before a row is ever written.

use crate::Id;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the per-rule verdicts of a criteria are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every rule must match
    #[default]
    All,
    /// At least one rule must match
    Any,
}

/// A single rule as submitted: `{ "field": .., "operator": .., "value": .. }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub field: String,
    pub operator: String,
    pub value: serde_json::Value,
}

impl RuleSpec {
    pub fn new(field: &str, operator: &str, value: serde_json::Value) -> Self {
        Self {
            field: field.to_owned(),
            operator: operator.to_owned(),
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CriteriaSpec {
    #[serde(rename = "match", default)]
    pub match_policy: MatchPolicy,
    pub rules: Vec<RuleSpec>,
}

/// Cached member set of a segment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct MemberIds(pub BTreeSet<Id>);

impl MemberIds {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.0.contains(id)
    }
}

impl FromIterator<Id> for MemberIds {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        MemberIds(iter.into_iter().collect())
    }
}
