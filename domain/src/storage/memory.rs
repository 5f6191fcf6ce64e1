//! In-memory repositories and collaborators for engine tests.
//!
//! Each map sits behind one mutex, so the conditional writes below are atomic in the same
//! way the single-statement SQL updates are.

use super::{ExecutionFilter, ExecutionRepository, RuleRepository, SegmentRepository};
use crate::automation_action::{AutoActions, AutomationAction};
use crate::clock::Clock;
use crate::criteria::MemberIds;
use crate::customer::{Customer, CustomerDirectory};
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use crate::execution_status::ExecutionStatus;
use crate::gateway::{CouponIssuer, EmailSender};
use crate::trigger_type::TriggerType;
use crate::{automation_rules, customers, scheduled_executions, segments, Id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) fn storage_error() -> Error {
    Error {
        source: None,
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
            "storage unavailable".to_owned(),
        )),
    }
}

pub(crate) fn customer_model(profile_id: Id) -> customers::Model {
    let now = Utc::now();
    customers::Model {
        id: Id::new_v4(),
        profile_id,
        display_name: Some("Aiko Tanaka".to_owned()),
        email: Some("aiko@example.com".to_owned()),
        tags: customers::CustomerTags(BTreeSet::new()),
        source: Some("booking".to_owned()),
        total_bookings: 1,
        total_messages: 0,
        is_subscriber: false,
        birthday: None,
        last_seen_at: Some(now.into()),
        created_at: now.into(),
        updated_at: now.into(),
    }
}

#[derive(Default)]
pub(crate) struct InMemoryStore {
    segments: Mutex<HashMap<Id, segments::Model>>,
    rules: Mutex<HashMap<Id, automation_rules::Model>>,
    executions: Mutex<HashMap<Id, scheduled_executions::Model>>,
    pub(crate) fail_claims: AtomicBool,
    pub(crate) fail_inserts: AtomicBool,
}

impl InMemoryStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn executions(&self) -> Vec<scheduled_executions::Model> {
        let mut rows: Vec<_> = self.executions.lock().await.values().cloned().collect();
        rows.sort_by_key(|row| (row.created_at, row.trigger_key.clone()));
        rows
    }

    pub(crate) async fn rule(&self, id: Id) -> Option<automation_rules::Model> {
        self.rules.lock().await.get(&id).cloned()
    }

    async fn transition<F>(
        &self,
        id: Id,
        from: ExecutionStatus,
        expected_version: i32,
        apply: F,
    ) -> Result<bool, Error>
    where
        F: FnOnce(&mut scheduled_executions::Model) + Send,
    {
        let mut executions = self.executions.lock().await;
        match executions.get_mut(&id) {
            Some(row) if row.status == from && row.version == expected_version => {
                apply(row);
                row.version = expected_version + 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SegmentRepository for InMemoryStore {
    async fn insert(&self, segment: segments::Model) -> Result<segments::Model, Error> {
        self.segments
            .lock()
            .await
            .insert(segment.id, segment.clone());
        Ok(segment)
    }

    async fn find(&self, id: Id) -> Result<Option<segments::Model>, Error> {
        Ok(self.segments.lock().await.get(&id).cloned())
    }

    async fn list(&self, profile_id: Id) -> Result<Vec<segments::Model>, Error> {
        let mut segments: Vec<_> = self
            .segments
            .lock()
            .await
            .values()
            .filter(|s| s.profile_id == profile_id)
            .cloned()
            .collect();
        segments.sort_by_key(|s| (s.created_at, s.name.clone()));
        Ok(segments)
    }

    async fn list_all(&self) -> Result<Vec<segments::Model>, Error> {
        let mut segments: Vec<_> = self.segments.lock().await.values().cloned().collect();
        segments.sort_by_key(|s| (s.profile_id, s.created_at, s.name.clone()));
        Ok(segments)
    }

    async fn replace_membership(
        &self,
        id: Id,
        expected_version: i64,
        member_ids: MemberIds,
        refreshed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut segments = self.segments.lock().await;
        match segments.get_mut(&id) {
            Some(segment) if segment.membership_version == expected_version => {
                segment.member_count = member_ids.len() as i32;
                segment.member_ids = member_ids;
                segment.membership_version = expected_version + 1;
                segment.refreshed_at = Some(refreshed_at.into());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_active(&self, id: Id, is_active: bool) -> Result<segments::Model, Error> {
        let mut segments = self.segments.lock().await;
        let segment = segments.get_mut(&id).ok_or_else(Error::not_found)?;
        segment.is_active = is_active;
        Ok(segment.clone())
    }

    async fn set_auto_actions(
        &self,
        id: Id,
        auto_actions: AutoActions,
    ) -> Result<segments::Model, Error> {
        let mut segments = self.segments.lock().await;
        let segment = segments.get_mut(&id).ok_or_else(Error::not_found)?;
        segment.auto_actions = auto_actions;
        Ok(segment.clone())
    }

    async fn delete(&self, id: Id) -> Result<(), Error> {
        self.segments
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }
}

#[async_trait]
impl RuleRepository for InMemoryStore {
    async fn insert(&self, rule: automation_rules::Model) -> Result<automation_rules::Model, Error> {
        let rule = automation_rules::Model {
            sent_count: 0,
            scheduled_count: 0,
            ..rule
        };
        self.rules.lock().await.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update(
        &self,
        id: Id,
        name: String,
        trigger: TriggerType,
        action: AutomationAction,
    ) -> Result<automation_rules::Model, Error> {
        let mut rules = self.rules.lock().await;
        let rule = rules.get_mut(&id).ok_or_else(Error::not_found)?;
        rule.name = name;
        rule.trigger = trigger;
        rule.action = action;
        Ok(rule.clone())
    }

    async fn set_active(&self, id: Id, is_active: bool) -> Result<automation_rules::Model, Error> {
        let mut rules = self.rules.lock().await;
        let rule = rules.get_mut(&id).ok_or_else(Error::not_found)?;
        rule.is_active = is_active;
        Ok(rule.clone())
    }

    async fn delete(&self, id: Id) -> Result<(), Error> {
        self.rules
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }

    async fn find(&self, id: Id) -> Result<Option<automation_rules::Model>, Error> {
        Ok(self.rules.lock().await.get(&id).cloned())
    }

    async fn list(&self, profile_id: Id) -> Result<Vec<automation_rules::Model>, Error> {
        let mut rules: Vec<_> = self
            .rules
            .lock()
            .await
            .values()
            .filter(|r| r.profile_id == profile_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.created_at, r.name.clone()));
        Ok(rules)
    }

    async fn list_active_by_trigger(
        &self,
        profile_id: Id,
        trigger: TriggerType,
    ) -> Result<Vec<automation_rules::Model>, Error> {
        Ok(RuleRepository::list(self, profile_id)
            .await?
            .into_iter()
            .filter(|r| r.is_active && r.trigger == trigger)
            .collect())
    }

    async fn list_all_active(&self) -> Result<Vec<automation_rules::Model>, Error> {
        Ok(self
            .rules
            .lock()
            .await
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    async fn increment_sent_count(&self, id: Id) -> Result<(), Error> {
        if let Some(rule) = self.rules.lock().await.get_mut(&id) {
            rule.sent_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryStore {
    async fn insert_if_absent(&self, execution: scheduled_executions::Model) -> Result<bool, Error> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        let mut executions = self.executions.lock().await;
        if executions
            .values()
            .any(|row| row.trigger_key == execution.trigger_key)
        {
            return Ok(false);
        }
        if let Some(rule_id) = execution.rule_id {
            if let Some(rule) = self.rules.lock().await.get_mut(&rule_id) {
                rule.scheduled_count += 1;
            }
        }
        executions.insert(execution.id, execution);
        Ok(true)
    }

    async fn find(&self, id: Id) -> Result<Option<scheduled_executions::Model>, Error> {
        Ok(self.executions.lock().await.get(&id).cloned())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<scheduled_executions::Model>, Error> {
        let mut due: Vec<_> = self
            .executions
            .lock()
            .await
            .values()
            .filter(|row| row.status == ExecutionStatus::Scheduled && row.due_at <= now.fixed_offset())
            .cloned()
            .collect();
        due.sort_by_key(|row| row.due_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error> {
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        self.transition(id, ExecutionStatus::Scheduled, expected_version, |row| {
            row.status = ExecutionStatus::InFlight;
            row.claimed_at = Some(now.into());
            row.updated_at = now.into();
        })
        .await
    }

    async fn resolve(
        &self,
        id: Id,
        expected_version: i32,
        status: ExecutionStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.transition(id, ExecutionStatus::InFlight, expected_version, |row| {
            row.status = status;
            row.reason = reason;
            row.resolved_at = Some(now.into());
            row.updated_at = now.into();
        })
        .await
    }

    async fn release(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error> {
        self.transition(id, ExecutionStatus::InFlight, expected_version, |row| {
            row.status = ExecutionStatus::Scheduled;
            row.claimed_at = None;
            row.updated_at = now.into();
        })
        .await
    }

    async fn requeue_failed(
        &self,
        id: Id,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        self.transition(id, ExecutionStatus::Failed, expected_version, |row| {
            row.status = ExecutionStatus::Scheduled;
            row.due_at = now.into();
            row.reason = None;
            row.claimed_at = None;
            row.resolved_at = None;
            row.updated_at = now.into();
        })
        .await
    }

    async fn expire_claims(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut expired = 0;
        for row in self.executions.lock().await.values_mut() {
            let stale = row
                .claimed_at
                .is_some_and(|claimed_at| claimed_at < claimed_before.fixed_offset());
            if row.status == ExecutionStatus::InFlight && stale {
                row.status = ExecutionStatus::Failed;
                row.reason = Some(reason.to_owned());
                row.resolved_at = Some(now.into());
                row.updated_at = now.into();
                row.version += 1;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn list(&self, filter: ExecutionFilter) -> Result<Vec<scheduled_executions::Model>, Error> {
        let mut rows: Vec<_> = self
            .executions
            .lock()
            .await
            .values()
            .filter(|row| filter.profile_id.map_or(true, |id| row.profile_id == id))
            .filter(|row| filter.rule_id.map_or(true, |id| row.rule_id == Some(id)))
            .filter(|row| filter.segment_id.map_or(true, |id| row.segment_id == Some(id)))
            .filter(|row| filter.customer_id.map_or(true, |id| row.customer_id == id))
            .filter(|row| filter.status.map_or(true, |status| row.status == status))
            .filter(|row| filter.created_after.map_or(true, |at| row.created_at >= at))
            .filter(|row| filter.created_before.map_or(true, |at| row.created_at < at))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }
}

/// Customer directory over raw rows; day counts are derived from the shared clock on read.
pub(crate) struct InMemoryCustomers {
    customers: Mutex<HashMap<Id, customers::Model>>,
    clock: Arc<dyn Clock>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_tag_writes: AtomicBool,
}

impl InMemoryCustomers {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            customers: Mutex::new(HashMap::new()),
            clock,
            fail_reads: AtomicBool::new(false),
            fail_tag_writes: AtomicBool::new(false),
        })
    }

    pub(crate) async fn put(&self, model: customers::Model) -> Id {
        let id = model.id;
        self.customers.lock().await.insert(id, model);
        id
    }

    pub(crate) async fn update<F>(&self, id: Id, change: F)
    where
        F: FnOnce(&mut customers::Model),
    {
        if let Some(model) = self.customers.lock().await.get_mut(&id) {
            change(model);
        }
    }

    pub(crate) async fn remove(&self, id: Id) {
        self.customers.lock().await.remove(&id);
    }

    pub(crate) async fn tags(&self, id: Id) -> BTreeSet<String> {
        self.customers
            .lock()
            .await
            .get(&id)
            .map(|model| model.tags.0.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomers {
    async fn get_customer(&self, id: Id) -> Result<Option<Customer>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        let now = self.clock.now();
        Ok(self
            .customers
            .lock()
            .await
            .get(&id)
            .cloned()
            .map(|model| Customer::from_model(model, now)))
    }

    async fn list_customers(&self, profile_id: Id) -> Result<Vec<Customer>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        let now = self.clock.now();
        let mut customers: Vec<_> = self
            .customers
            .lock()
            .await
            .values()
            .filter(|model| model.profile_id == profile_id)
            .cloned()
            .map(|model| Customer::from_model(model, now))
            .collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }

    async fn add_tag(&self, id: Id, tag: &str) -> Result<bool, Error> {
        if self.fail_tag_writes.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        let mut customers = self.customers.lock().await;
        let model = customers.get_mut(&id).ok_or_else(Error::not_found)?;
        Ok(model.tags.0.insert(tag.to_owned()))
    }

    async fn list_profile_ids(&self) -> Result<Vec<Id>, Error> {
        let profile_ids: BTreeSet<Id> = self
            .customers
            .lock()
            .await
            .values()
            .map(|model| model.profile_id)
            .collect();
        Ok(profile_ids.into_iter().collect())
    }
}

/// Records every delivery; fails every call while `fail` is set.
#[derive(Default)]
pub(crate) struct RecordingSender {
    pub(crate) deliveries: Mutex<Vec<(Id, String)>>,
    pub(crate) fail: AtomicBool,
}

impl RecordingSender {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn delivered(&self) -> Vec<(Id, String)> {
        self.deliveries.lock().await.clone()
    }

    async fn record(&self, customer: &Customer, reference: &str) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error {
                source: None,
                error_kind: DomainErrorKind::External(ExternalErrorKind::Other(
                    "provider rejected the request".to_owned(),
                )),
            });
        }
        // Yield so that concurrent sweeps interleave around the send.
        tokio::task::yield_now().await;
        self.deliveries
            .lock()
            .await
            .push((customer.id, reference.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send_templated_email(&self, customer: &Customer, template_id: &str) -> Result<(), Error> {
        self.record(customer, template_id).await
    }
}

#[async_trait]
impl CouponIssuer for RecordingSender {
    async fn issue_coupon(&self, customer: &Customer, coupon_id: &str) -> Result<(), Error> {
        self.record(customer, coupon_id).await
    }
}
