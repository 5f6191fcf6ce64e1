//! Creates scheduled executions from trigger occurrences and segment joins.
//!
//! Scheduling is insert-if-absent on a deterministic `trigger_key`, so offering the same
//! occurrence twice (a redelivered event, an overlapping sweep) is a no-op the second time.

use crate::automation_action::AutomationAction;
use crate::clock::Clock;
use crate::error::Error;
use crate::execution_status::ExecutionStatus;
use crate::storage::{ExecutionRepository, RuleRepository};
use crate::trigger::TriggerOccurrence;
use crate::{automation_rules, scheduled_executions, segments, Id};
use chrono::{DateTime, Duration, Utc};
use events::{EngineEvent, EventPublisher};
use log::*;
use std::sync::Arc;

pub fn rule_trigger_key(rule_id: Id, customer_id: Id, occurrence_key: &str) -> String {
    format!("rule:{rule_id}:{customer_id}:{occurrence_key}")
}

/// `membership_version` is the version the join was observed at; each auto-action gets its own key.
pub fn segment_trigger_key(
    segment_id: Id,
    customer_id: Id,
    membership_version: i64,
    action_index: usize,
) -> String {
    format!("segment:{segment_id}:{customer_id}:join:{membership_version}:action:{action_index}")
}

pub fn due_at(occurred_at: DateTime<Utc>, action: &AutomationAction) -> DateTime<Utc> {
    occurred_at + Duration::hours(i64::from(action.delay_hours))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub created: usize,
    pub duplicates: usize,
}

impl ScheduleOutcome {
    fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.duplicates += 1;
        }
    }

    pub fn merge(&mut self, other: ScheduleOutcome) {
        self.created += other.created;
        self.duplicates += other.duplicates;
    }
}

enum Owner {
    Rule(Id),
    Segment(Id),
}

#[derive(Clone)]
pub struct Scheduler {
    rules: Arc<dyn RuleRepository>,
    executions: Arc<dyn ExecutionRepository>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        executions: Arc<dyn ExecutionRepository>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            executions,
            publisher,
            clock,
        }
    }

    /// Schedules the occurrence for every active rule of its profile listening to its trigger.
    pub async fn schedule_occurrence(
        &self,
        occurrence: &TriggerOccurrence,
    ) -> Result<ScheduleOutcome, Error> {
        let rules = self
            .rules
            .list_active_by_trigger(occurrence.profile_id, occurrence.trigger)
            .await?;

        self.schedule_for_rules(occurrence, &rules).await
    }

    /// Like [`Scheduler::schedule_occurrence`] with the candidate rules already loaded.
    /// Rules of another profile, another trigger or inactive rules are ignored.
    pub async fn schedule_for_rules(
        &self,
        occurrence: &TriggerOccurrence,
        rules: &[automation_rules::Model],
    ) -> Result<ScheduleOutcome, Error> {
        let mut outcome = ScheduleOutcome::default();

        for rule in rules.iter().filter(|rule| {
            rule.is_active
                && rule.profile_id == occurrence.profile_id
                && rule.trigger == occurrence.trigger
        }) {
            let trigger_key =
                rule_trigger_key(rule.id, occurrence.customer_id, &occurrence.occurrence_key);
            let created = self
                .schedule(
                    occurrence.profile_id,
                    Owner::Rule(rule.id),
                    occurrence.customer_id,
                    rule.action.clone(),
                    trigger_key,
                    occurrence.occurred_at,
                )
                .await?;
            outcome.record(created);
        }

        Ok(outcome)
    }

    /// Schedules every auto-action of `segment` for a customer that joined it at
    /// `membership_version`.
    pub async fn schedule_segment_join(
        &self,
        segment: &segments::Model,
        customer_id: Id,
        membership_version: i64,
        joined_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, Error> {
        let mut outcome = ScheduleOutcome::default();

        for (index, action) in segment.auto_actions.0.iter().enumerate() {
            let trigger_key =
                segment_trigger_key(segment.id, customer_id, membership_version, index);
            let created = self
                .schedule(
                    segment.profile_id,
                    Owner::Segment(segment.id),
                    customer_id,
                    action.clone(),
                    trigger_key,
                    joined_at,
                )
                .await?;
            outcome.record(created);
        }

        Ok(outcome)
    }

    async fn schedule(
        &self,
        profile_id: Id,
        owner: Owner,
        customer_id: Id,
        action: AutomationAction,
        trigger_key: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let now = self.clock.now();
        let (rule_id, segment_id) = match owner {
            Owner::Rule(id) => (Some(id), None),
            Owner::Segment(id) => (None, Some(id)),
        };

        let execution = scheduled_executions::Model {
            id: Id::new_v4(),
            profile_id,
            rule_id,
            segment_id,
            customer_id,
            due_at: due_at(occurred_at, &action).into(),
            action,
            trigger_key,
            status: ExecutionStatus::Scheduled,
            version: 0,
            reason: None,
            claimed_at: None,
            created_at: now.into(),
            resolved_at: None,
            updated_at: now.into(),
        };

        if !self.executions.insert_if_absent(execution.clone()).await? {
            debug!("Already scheduled: {}", execution.trigger_key);
            return Ok(false);
        }

        info!(
            "Scheduled {} for customer {} due at {} ({})",
            execution.action.action_type, customer_id, execution.due_at, execution.trigger_key
        );

        self.publisher
            .publish(EngineEvent::ExecutionScheduled {
                profile_id,
                execution_id: execution.id,
                execution: serde_json::to_value(&execution)?,
            })
            .await;

        Ok(true)
    }
}
