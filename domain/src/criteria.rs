use crate::customer::Customer;
use crate::error::{Error, ValidationErrorKind};
use crate::rule::SegmentRule;
pub use entity::criteria::{CriteriaSpec, MatchPolicy, MemberIds, RuleSpec};

/// A validated, compiled segment criteria.
#[derive(Clone, Debug, PartialEq)]
pub struct Criteria {
    match_policy: MatchPolicy,
    rules: Vec<SegmentRule>,
}

impl Criteria {
    /// Fails on the first invalid rule; an empty rule list is rejected.
    pub fn compile(spec: &CriteriaSpec) -> Result<Self, Error> {
        if spec.rules.is_empty() {
            return Err(Error::validation(ValidationErrorKind::EmptyCriteria));
        }

        let rules = spec
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| SegmentRule::compile(index, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            match_policy: spec.match_policy,
            rules,
        })
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.match_policy
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match self.match_policy {
            MatchPolicy::All => self.rules.iter().all(|rule| rule.matches(customer)),
            MatchPolicy::Any => self.rules.iter().any(|rule| rule.matches(customer)),
        }
    }

    pub fn count_matches(&self, customers: &[Customer]) -> usize {
        customers.iter().filter(|c| self.matches(c)).count()
    }

    pub fn member_ids(&self, customers: &[Customer]) -> MemberIds {
        customers
            .iter()
            .filter(|c| self.matches(c))
            .map(|c| c.id)
            .collect()
    }
}

/// `evaluate(criteria, customer) -> bool`
pub fn evaluate(criteria: &Criteria, customer: &Customer) -> bool {
    criteria.matches(customer)
}
