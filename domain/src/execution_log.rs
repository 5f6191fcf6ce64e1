//! Read access to scheduled executions, plus operator retry of failed ones.

use crate::clock::Clock;
use crate::error::{Error, RejectionKind};
use crate::execution_status::ExecutionStatus;
use crate::storage::{ExecutionFilter, ExecutionRepository};
use crate::{scheduled_executions, Id};
use log::*;
use std::sync::Arc;

pub const DEFAULT_LIMIT: u64 = 100;

#[derive(Clone)]
pub struct ExecutionLog {
    executions: Arc<dyn ExecutionRepository>,
    clock: Arc<dyn Clock>,
}

impl ExecutionLog {
    pub fn new(executions: Arc<dyn ExecutionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { executions, clock }
    }

    /// Newest first, at most [`DEFAULT_LIMIT`] rows unless the filter says otherwise.
    pub async fn list(
        &self,
        mut filter: ExecutionFilter,
    ) -> Result<Vec<scheduled_executions::Model>, Error> {
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIMIT));
        self.executions.list(filter).await
    }

    pub async fn find(&self, id: Id) -> Result<scheduled_executions::Model, Error> {
        self.executions.find(id).await?.ok_or_else(Error::not_found)
    }

    /// Puts a failed execution back to `scheduled`, due immediately. Only failed rows can
    /// be retried; sent and skipped rows are final.
    pub async fn retry(&self, id: Id) -> Result<scheduled_executions::Model, Error> {
        let execution = self.find(id).await?;
        if execution.status != ExecutionStatus::Failed {
            warn!(
                "Execution {id} is {} and cannot be retried",
                execution.status
            );
            return Err(Error::rejected(RejectionKind::ExecutionNotRetryable));
        }

        let requeued = self
            .executions
            .requeue_failed(id, execution.version, self.clock.now())
            .await?;
        if !requeued {
            return Err(Error::rejected(RejectionKind::ExecutionNotRetryable));
        }

        info!("Execution {id} requeued by operator");
        self.find(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation_action::AutomationAction;
    use crate::clock::ManualClock;
    use crate::error::DomainErrorKind;
    use crate::storage::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn row(profile_id: Id, key: &str, minutes: i64) -> scheduled_executions::Model {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        scheduled_executions::Model {
            id: Id::new_v4(),
            profile_id,
            rule_id: None,
            segment_id: None,
            customer_id: Id::new_v4(),
            action: AutomationAction::add_tag("vip", 0),
            trigger_key: key.to_string(),
            due_at: at.into(),
            status: ExecutionStatus::Scheduled,
            version: 0,
            reason: None,
            claimed_at: None,
            created_at: at.into(),
            resolved_at: None,
            updated_at: at.into(),
        }
    }

    fn log_over(store: Arc<InMemoryStore>) -> ExecutionLog {
        ExecutionLog::new(store, Arc::new(ManualClock::new(Utc::now())))
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded() -> Result<(), Error> {
        let store = InMemoryStore::new();
        let profile_id = Id::new_v4();
        for minute in 0..105 {
            store
                .insert_if_absent(row(profile_id, &format!("k{minute}"), minute))
                .await?;
        }
        store.insert_if_absent(row(Id::new_v4(), "other", 200)).await?;
        let log = log_over(store);

        let rows = log
            .list(ExecutionFilter {
                profile_id: Some(profile_id),
                ..Default::default()
            })
            .await?;

        assert_eq!(rows.len(), DEFAULT_LIMIT as usize);
        assert_eq!(rows[0].trigger_key, "k104");

        Ok(())
    }

    #[tokio::test]
    async fn only_failed_executions_can_be_retried() -> Result<(), Error> {
        let store = InMemoryStore::new();
        let execution = row(Id::new_v4(), "k", 0);
        store.insert_if_absent(execution.clone()).await?;
        let log = log_over(store.clone());

        let err = log.retry(execution.id).await.unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Rejected(RejectionKind::ExecutionNotRetryable)
        );

        let now = Utc::now();
        store.claim(execution.id, 0, now).await?;
        store
            .resolve(execution.id, 1, ExecutionStatus::Failed, Some("bounced".to_string()), now)
            .await?;

        let retried = log.retry(execution.id).await?;

        assert_eq!(retried.status, ExecutionStatus::Scheduled);
        assert_eq!(retried.reason, None);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_executions_are_not_found() {
        let log = log_over(InMemoryStore::new());

        assert!(log.find(Id::new_v4()).await.unwrap_err().is_not_found());
    }
}
