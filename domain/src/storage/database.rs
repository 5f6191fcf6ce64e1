use super::{ExecutionFilter, ExecutionRepository, RuleRepository, SegmentRepository};
use crate::automation_action::{AutoActions, AutomationAction};
use crate::criteria::MemberIds;
use crate::error::Error;
use crate::execution_status::ExecutionStatus;
use crate::trigger_type::TriggerType;
use crate::{automation_rules, scheduled_executions, segments, Id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity_api::{automation_rule, scheduled_execution, segment};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Repositories backed by the `lifecycle_engine` Postgres schema.
#[derive(Clone)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SegmentRepository for DatabaseStore {
    async fn insert(&self, model: segments::Model) -> Result<segments::Model, Error> {
        Ok(segment::create(&self.db, model).await?)
    }

    async fn find(&self, id: Id) -> Result<Option<segments::Model>, Error> {
        Ok(segment::find_by_id(&self.db, id).await?)
    }

    async fn list(&self, profile_id: Id) -> Result<Vec<segments::Model>, Error> {
        Ok(segment::find_by_profile_id(&self.db, profile_id).await?)
    }

    async fn list_all(&self) -> Result<Vec<segments::Model>, Error> {
        Ok(segment::find_all(&self.db).await?)
    }

    async fn replace_membership(
        &self,
        id: Id,
        expected_version: i64,
        member_ids: MemberIds,
        refreshed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        Ok(segment::replace_membership(
            &self.db,
            id,
            expected_version,
            member_ids,
            refreshed_at.into(),
        )
        .await?)
    }

    async fn set_active(&self, id: Id, is_active: bool) -> Result<segments::Model, Error> {
        Ok(segment::update_active(&self.db, id, is_active).await?)
    }

    async fn set_auto_actions(
        &self,
        id: Id,
        auto_actions: AutoActions,
    ) -> Result<segments::Model, Error> {
        Ok(segment::update_auto_actions(&self.db, id, auto_actions).await?)
    }

    async fn delete(&self, id: Id) -> Result<(), Error> {
        Ok(segment::delete_by_id(&self.db, id).await?)
    }
}

#[async_trait]
impl RuleRepository for DatabaseStore {
    async fn insert(&self, model: automation_rules::Model) -> Result<automation_rules::Model, Error> {
        Ok(automation_rule::create(&self.db, model).await?)
    }

    async fn update(
        &self,
        id: Id,
        name: String,
        trigger: TriggerType,
        action: AutomationAction,
    ) -> Result<automation_rules::Model, Error> {
        let existing = automation_rule::find_by_id(&self.db, id)
            .await?
            .ok_or_else(Error::not_found)?;

        Ok(automation_rule::update(
            &self.db,
            id,
            automation_rules::Model {
                name,
                trigger,
                action,
                ..existing
            },
        )
        .await?)
    }

    async fn set_active(&self, id: Id, is_active: bool) -> Result<automation_rules::Model, Error> {
        Ok(automation_rule::update_active(&self.db, id, is_active).await?)
    }

    async fn delete(&self, id: Id) -> Result<(), Error> {
        Ok(automation_rule::delete_by_id(&self.db, id).await?)
    }

    async fn find(&self, id: Id) -> Result<Option<automation_rules::Model>, Error> {
        Ok(automation_rule::find_by_id(&self.db, id).await?)
    }

    async fn list(&self, profile_id: Id) -> Result<Vec<automation_rules::Model>, Error> {
        Ok(automation_rule::find_by_profile_id(&self.db, profile_id).await?)
    }

    async fn list_active_by_trigger(
        &self,
        profile_id: Id,
        trigger: TriggerType,
    ) -> Result<Vec<automation_rules::Model>, Error> {
        Ok(automation_rule::find_active_by_trigger(&self.db, profile_id, trigger).await?)
    }

    async fn list_all_active(&self) -> Result<Vec<automation_rules::Model>, Error> {
        Ok(automation_rule::find_all_active(&self.db).await?)
    }

    async fn increment_sent_count(&self, id: Id) -> Result<(), Error> {
        Ok(automation_rule::increment_sent_count(&self.db, id).await?)
    }
}

#[async_trait]
impl ExecutionRepository for DatabaseStore {
    async fn insert_if_absent(&self, execution: scheduled_executions::Model) -> Result<bool, Error> {
        Ok(scheduled_execution::insert_if_absent(&self.db, execution).await?)
    }

    async fn find(&self, id: Id) -> Result<Option<scheduled_executions::Model>, Error> {
        Ok(scheduled_execution::find_by_id(&self.db, id).await?)
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<scheduled_executions::Model>, Error> {
        Ok(scheduled_execution::find_due(&self.db, now.into(), limit).await?)
    }

    async fn claim(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error> {
        Ok(scheduled_execution::claim(&self.db, id, expected_version, now.into()).await?)
    }

    async fn resolve(
        &self,
        id: Id,
        expected_version: i32,
        status: ExecutionStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        Ok(scheduled_execution::resolve(
            &self.db,
            id,
            expected_version,
            status,
            reason,
            now.into(),
        )
        .await?)
    }

    async fn release(&self, id: Id, expected_version: i32, now: DateTime<Utc>) -> Result<bool, Error> {
        Ok(scheduled_execution::release(&self.db, id, expected_version, now.into()).await?)
    }

    async fn requeue_failed(
        &self,
        id: Id,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        Ok(scheduled_execution::requeue_failed(&self.db, id, expected_version, now.into()).await?)
    }

    async fn expire_claims(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        Ok(
            scheduled_execution::expire_claims(&self.db, claimed_before.into(), reason, now.into())
                .await?,
        )
    }

    async fn list(&self, filter: ExecutionFilter) -> Result<Vec<scheduled_executions::Model>, Error> {
        Ok(scheduled_execution::find_by(&self.db, filter).await?)
    }
}
