//! Persistence seams of the engine.
//!
//! Every state change that races with another worker is expressed as a conditional write
//! that reports whether it won: insert-if-absent on `trigger_key`, claim guarded by
//! `version`, membership replacement guarded by `membership_version`.

use crate::automation_action::{AutoActions, AutomationAction};
use crate::criteria::MemberIds;
use crate::error::Error;
use crate::execution_status::ExecutionStatus;
use crate::trigger_type::TriggerType;
use crate::{automation_rules, scheduled_executions, segments, Id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use entity_api::scheduled_execution::ExecutionFilter;

pub mod database;
#[cfg(test)]
pub(crate) mod memory;

pub use database::DatabaseStore;

#[async_trait]
pub trait SegmentRepository: Send + Sync {
    async fn insert(&self, segment: segments::Model) -> Result<segments::Model, Error>;

    async fn find(&self, id: Id) -> Result<Option<segments::Model>, Error>;

    async fn list(&self, profile_id: Id) -> Result<Vec<segments::Model>, Error>;

    async fn list_all(&self) -> Result<Vec<segments::Model>, Error>;

    /// Compare-and-swap on `membership_version`. Returns `false` when the segment was
    /// refreshed by someone else since `expected_version` was read.
    async fn replace_membership(
        &self,
        id: Id,
        expected_version: i64,
        member_ids: MemberIds,
        refreshed_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn set_active(&self, id: Id, is_active: bool) -> Result<segments::Model, Error>;

    async fn set_auto_actions(
        &self,
        id: Id,
        auto_actions: AutoActions,
    ) -> Result<segments::Model, Error>;

    async fn delete(&self, id: Id) -> Result<(), Error>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn insert(&self, rule: automation_rules::Model) -> Result<automation_rules::Model, Error>;

    async fn update(
        &self,
        id: Id,
        name: String,
        trigger: TriggerType,
        action: AutomationAction,
    ) -> Result<automation_rules::Model, Error>;

    async fn set_active(&self, id: Id, is_active: bool) -> Result<automation_rules::Model, Error>;

    async fn delete(&self, id: Id) -> Result<(), Error>;

    async fn find(&self, id: Id) -> Result<Option<automation_rules::Model>, Error>;

    async fn list(&self, profile_id: Id) -> Result<Vec<automation_rules::Model>, Error>;

    async fn list_active_by_trigger(
        &self,
        profile_id: Id,
        trigger: TriggerType,
    ) -> Result<Vec<automation_rules::Model>, Error>;

    async fn list_all_active(&self) -> Result<Vec<automation_rules::Model>, Error>;

    async fn increment_sent_count(&self, id: Id) -> Result<(), Error>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Returns `false` when a row with the same `trigger_key` already exists. Inserting a
    /// rule-owned row counts it on the rule's `scheduled_count` atomically with the insert.
    async fn insert_if_absent(&self, execution: scheduled_executions::Model) -> Result<bool, Error>;

    async fn find(&self, id: Id) -> Result<Option<scheduled_executions::Model>, Error>;

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<scheduled_executions::Model>, Error>;

    async fn claim(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error>;

    async fn resolve(
        &self,
        id: Id,
        expected_version: i32,
        status: ExecutionStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn release(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error>;

    async fn requeue_failed(
        &self,
        id: Id,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn expire_claims(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error>;

    async fn list(&self, filter: ExecutionFilter) -> Result<Vec<scheduled_executions::Model>, Error>;
}
