//! Executes due scheduled executions.
//!
//! A sweep claims each due row with a versioned conditional update before touching any
//! collaborator, so concurrent sweeps (in this process or another) never send the same row
//! twice. Rows are resolved exactly once: `sent`, `failed` or `skipped`. A storage error
//! before the collaborator call hands the row back to `scheduled` for the next sweep.

use crate::automation_action::{ActionType, AutomationAction};
use crate::clock::Clock;
use crate::customer::{Customer, CustomerDirectory};
use crate::error::Error;
use crate::execution_status::ExecutionStatus;
use crate::gateway::{CouponIssuer, EmailSender};
use crate::storage::{ExecutionRepository, RuleRepository, SegmentRepository};
use crate::scheduled_executions;
use chrono::Duration;
use events::{EngineEvent, EventPublisher};
use log::*;
use service::config::Config;
use std::fmt;
use std::sync::Arc;

/// Reason recorded on rows whose claim outlived the lease.
pub const CLAIM_EXPIRED: &str = "claim_expired";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: u64,
    pub claim_lease: Duration,
    /// Skip rows whose rule or segment was deactivated after scheduling.
    pub skip_inactive_owners: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.dispatch_batch_size,
            claim_lease: i64::try_from(config.claim_lease_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Self::default().claim_lease),
            skip_inactive_owners: config.skip_inactive_owners,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            claim_lease: Duration::minutes(15),
            skip_inactive_owners: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    OwnerDeleted,
    OwnerInactive,
    CustomerNotFound,
    NoEmail,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::OwnerDeleted => "owner_deleted",
            SkipReason::OwnerInactive => "owner_inactive",
            SkipReason::CustomerNotFound => "customer_not_found",
            SkipReason::NoEmail => "no_email",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.code())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub released: u64,
    /// Rows another worker claimed first.
    pub lost_races: u64,
    pub expired_claims: u64,
    pub errors: u64,
}

enum Verdict {
    Resolve(ExecutionStatus, Option<String>),
    /// Hand the row back to `scheduled`; nothing was sent.
    Release(Error),
}

impl Verdict {
    fn sent() -> Self {
        Verdict::Resolve(ExecutionStatus::Sent, None)
    }

    fn failed(reason: String) -> Self {
        Verdict::Resolve(ExecutionStatus::Failed, Some(reason))
    }

    fn skipped(reason: SkipReason) -> Self {
        Verdict::Resolve(ExecutionStatus::Skipped, Some(reason.code().to_string()))
    }
}

/// Collaborators the dispatcher delivers actions through.
#[derive(Clone)]
pub struct Collaborators {
    pub customers: Arc<dyn CustomerDirectory>,
    pub email: Arc<dyn EmailSender>,
    pub coupons: Arc<dyn CouponIssuer>,
}

#[derive(Clone)]
pub struct Dispatcher {
    executions: Arc<dyn ExecutionRepository>,
    rules: Arc<dyn RuleRepository>,
    segments: Arc<dyn SegmentRepository>,
    collaborators: Collaborators,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        rules: Arc<dyn RuleRepository>,
        segments: Arc<dyn SegmentRepository>,
        collaborators: Collaborators,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            executions,
            rules,
            segments,
            collaborators,
            publisher,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn run_sweep(&self) -> Result<SweepReport, Error> {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        match self
            .executions
            .expire_claims(now - self.settings.claim_lease, CLAIM_EXPIRED, now)
            .await
        {
            Ok(0) => {}
            Ok(expired) => {
                warn!("Expired {expired} stale claim(s) older than {}", now - self.settings.claim_lease);
                report.expired_claims = expired;
            }
            Err(err) => {
                error!("Expiring stale claims failed: {err}");
                report.errors += 1;
            }
        }

        let due = self
            .executions
            .find_due(now, self.settings.batch_size)
            .await?;
        debug!("{} execution(s) due at {now}", due.len());

        for execution in due {
            self.dispatch(execution, &mut report).await;
        }

        if report.claimed > 0 || report.errors > 0 {
            info!(
                "Dispatch sweep: claimed={} sent={} failed={} skipped={} released={} lost_races={} errors={}",
                report.claimed,
                report.sent,
                report.failed,
                report.skipped,
                report.released,
                report.lost_races,
                report.errors
            );
        }

        Ok(report)
    }

    async fn dispatch(&self, execution: scheduled_executions::Model, report: &mut SweepReport) {
        match self
            .executions
            .claim(execution.id, execution.version, self.clock.now())
            .await
        {
            Ok(true) => report.claimed += 1,
            Ok(false) => {
                debug!("Execution {} was claimed by another worker", execution.id);
                report.lost_races += 1;
                return;
            }
            Err(err) => {
                error!("Claiming execution {} failed: {err}", execution.id);
                report.errors += 1;
                return;
            }
        }
        let version = execution.version + 1;

        let (status, reason) = match self.execute(&execution).await {
            Verdict::Resolve(status, reason) => (status, reason),
            Verdict::Release(err) => {
                warn!(
                    "Releasing execution {} after storage error: {err}",
                    execution.id
                );
                match self
                    .executions
                    .release(execution.id, version, self.clock.now())
                    .await
                {
                    Ok(_) => report.released += 1,
                    Err(err) => {
                        error!("Releasing execution {} failed: {err}", execution.id);
                        report.errors += 1;
                    }
                }
                return;
            }
        };

        match self
            .executions
            .resolve(execution.id, version, status, reason.clone(), self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "Execution {} changed while in flight; {status} outcome discarded",
                    execution.id
                );
                report.errors += 1;
                return;
            }
            Err(err) => {
                error!("Resolving execution {} as {status} failed: {err}", execution.id);
                report.errors += 1;
                return;
            }
        }

        match status {
            ExecutionStatus::Sent => {
                report.sent += 1;
                if let Some(rule_id) = execution.rule_id {
                    if let Err(err) = self.rules.increment_sent_count(rule_id).await {
                        error!("Incrementing sent count of rule {rule_id} failed: {err}");
                    }
                }
            }
            ExecutionStatus::Failed => report.failed += 1,
            _ => report.skipped += 1,
        }

        info!(
            "Execution {} ({} for customer {}) resolved {status}{}",
            execution.id,
            execution.action.action_type,
            execution.customer_id,
            reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
        );

        self.publisher
            .publish(EngineEvent::ExecutionResolved {
                profile_id: execution.profile_id,
                execution_id: execution.id,
                status: status.to_string(),
                reason,
            })
            .await;
    }

    async fn execute(&self, execution: &scheduled_executions::Model) -> Verdict {
        match self.owner_skip_reason(execution).await {
            Ok(Some(reason)) => return Verdict::skipped(reason),
            Ok(None) => {}
            Err(err) => return Verdict::Release(err),
        }

        let customer = match self
            .collaborators
            .customers
            .get_customer(execution.customer_id)
            .await
        {
            Ok(Some(customer)) => customer,
            Ok(None) => return Verdict::skipped(SkipReason::CustomerNotFound),
            Err(err) => return Verdict::Release(err),
        };

        if execution.action.needs_email() && !customer.has_email() {
            return Verdict::skipped(SkipReason::NoEmail);
        }

        self.perform(&customer, &execution.action).await
    }

    async fn owner_skip_reason(
        &self,
        execution: &scheduled_executions::Model,
    ) -> Result<Option<SkipReason>, Error> {
        let owner_active = if let Some(rule_id) = execution.rule_id {
            self.rules.find(rule_id).await?.map(|rule| rule.is_active)
        } else if let Some(segment_id) = execution.segment_id {
            self.segments
                .find(segment_id)
                .await?
                .map(|segment| segment.is_active)
        } else {
            None
        };

        Ok(match owner_active {
            None => Some(SkipReason::OwnerDeleted),
            Some(false) if self.settings.skip_inactive_owners => Some(SkipReason::OwnerInactive),
            Some(_) => None,
        })
    }

    async fn perform(&self, customer: &Customer, action: &AutomationAction) -> Verdict {
        match action.action_type {
            ActionType::SendEmail => {
                let Some(template_id) = action.template_id.as_deref() else {
                    return Verdict::failed("missing template_id".to_string());
                };
                match self
                    .collaborators
                    .email
                    .send_templated_email(customer, template_id)
                    .await
                {
                    Ok(()) => Verdict::sent(),
                    Err(err) => Verdict::failed(err.to_string()),
                }
            }
            ActionType::SendCoupon => {
                let Some(coupon_id) = action.coupon_id.as_deref() else {
                    return Verdict::failed("missing coupon_id".to_string());
                };
                match self
                    .collaborators
                    .coupons
                    .issue_coupon(customer, coupon_id)
                    .await
                {
                    Ok(()) => Verdict::sent(),
                    Err(err) => Verdict::failed(err.to_string()),
                }
            }
            ActionType::AddTag => {
                let Some(tag) = action.tag.as_deref() else {
                    return Verdict::failed("missing tag".to_string());
                };
                match self.collaborators.customers.add_tag(customer.id, tag).await {
                    Ok(added) => {
                        if !added {
                            debug!("Customer {} already tagged {tag}", customer.id);
                        }
                        Verdict::sent()
                    }
                    Err(err) => Verdict::Release(err),
                }
            }
        }
    }
}
