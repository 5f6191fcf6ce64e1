//! The engine's public surface: one facade over segments, automation rules, trigger
//! handling, dispatch and the execution log.

use crate::automation_action::AutomationAction;
use crate::automation_rule::{AutomationRuleUpdate, NewAutomationRule, RuleStore};
use crate::clock::{Clock, SystemClock};
use crate::criteria::CriteriaSpec;
use crate::customer::{CustomerDirectory, DbCustomerDirectory};
use crate::dispatcher::{Collaborators, DispatchSettings, Dispatcher, SweepReport};
use crate::error::Error;
use crate::execution_log::ExecutionLog;
use crate::field::{self, FieldDescriptor};
use crate::gateway::coupon::{CouponApiClient, UnconfiguredCouponIssuer};
use crate::gateway::mailersend::{MailerSendClient, UnconfiguredEmailSender};
use crate::gateway::{CouponIssuer, EmailSender};
use crate::scheduler::{ScheduleOutcome, Scheduler};
use crate::segment::{NewSegment, RefreshReport, RefreshScope, SeedOutcome, SegmentStore};
use crate::storage::{
    DatabaseStore, ExecutionFilter, ExecutionRepository, RuleRepository, SegmentRepository,
};
use crate::trigger::{self, LifecycleEvent};
use crate::trigger_type::TriggerType;
use crate::{automation_rules, scheduled_executions, segments, Id};
use events::EventPublisher;
use log::*;
use sea_orm::DatabaseConnection;
use service::config::Config;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Storage the engine persists its own state in.
#[derive(Clone)]
pub struct Repositories {
    pub segments: Arc<dyn SegmentRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerSweepReport {
    pub profiles: usize,
    pub customers: usize,
    pub scheduled: ScheduleOutcome,
    pub errors: usize,
}

#[derive(Clone)]
pub struct Engine {
    segments: SegmentStore,
    rules: RuleStore,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    execution_log: ExecutionLog,
    customers: Arc<dyn CustomerDirectory>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        repositories: Repositories,
        collaborators: Collaborators,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        let scheduler = Scheduler::new(
            repositories.rules.clone(),
            repositories.executions.clone(),
            publisher.clone(),
            clock.clone(),
        );

        Self {
            segments: SegmentStore::new(
                repositories.segments.clone(),
                collaborators.customers.clone(),
                scheduler.clone(),
                publisher.clone(),
                clock.clone(),
            ),
            rules: RuleStore::new(repositories.rules.clone(), clock.clone()),
            dispatcher: Dispatcher::new(
                repositories.executions.clone(),
                repositories.rules,
                repositories.segments,
                collaborators.clone(),
                publisher,
                clock.clone(),
                settings,
            ),
            execution_log: ExecutionLog::new(repositories.executions, clock.clone()),
            customers: collaborators.customers,
            scheduler,
            clock,
        }
    }

    /// Wires the engine to Postgres and the HTTP collaborators described by `config`.
    /// A collaborator without settings fails each of its actions at dispatch time.
    pub fn from_database(
        db: Arc<DatabaseConnection>,
        config: &Config,
        publisher: EventPublisher,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(DatabaseStore::new(db.clone()));

        let email: Arc<dyn EmailSender> = match MailerSendClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                warn!("Email actions are disabled: {err}");
                Arc::new(UnconfiguredEmailSender)
            }
        };

        let coupons: Arc<dyn CouponIssuer> = match CouponApiClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                warn!("Coupon actions are disabled: {err}");
                Arc::new(UnconfiguredCouponIssuer)
            }
        };

        Self::new(
            Repositories {
                segments: store.clone(),
                rules: store.clone(),
                executions: store,
            },
            Collaborators {
                customers: Arc::new(DbCustomerDirectory::new(db, clock.clone())),
                email,
                coupons,
            },
            publisher,
            clock,
            DispatchSettings::from_config(config),
        )
    }

    pub async fn create_segment(
        &self,
        profile_id: Id,
        new_segment: NewSegment,
    ) -> Result<segments::Model, Error> {
        self.segments.create(profile_id, new_segment).await
    }

    pub async fn refresh_segments(
        &self,
        profile_id: Id,
        scope: RefreshScope,
    ) -> Result<Vec<RefreshReport>, Error> {
        self.segments.refresh(profile_id, scope).await
    }

    pub async fn refresh_all_profiles(&self) -> Result<Vec<RefreshReport>, Error> {
        self.segments.refresh_all_profiles().await
    }

    pub async fn delete_segment(&self, id: Id) -> Result<(), Error> {
        self.segments.delete(id).await
    }

    pub async fn preview_criteria(
        &self,
        profile_id: Id,
        criteria: &CriteriaSpec,
    ) -> Result<usize, Error> {
        self.segments.preview(profile_id, criteria).await
    }

    pub async fn seed_system_segments(&self, profile_id: Id) -> Result<SeedOutcome, Error> {
        self.segments.seed_system_segments(profile_id).await
    }

    /// Seeds every profile that owns customers. Failures are logged per profile.
    pub async fn seed_all_profiles(&self) -> Result<Vec<(Id, SeedOutcome)>, Error> {
        let mut outcomes = Vec::new();
        for profile_id in self.customers.list_profile_ids().await? {
            match self.segments.seed_system_segments(profile_id).await {
                Ok(outcome) => outcomes.push((profile_id, outcome)),
                Err(err) => error!("Seeding system segments for profile {profile_id} failed: {err}"),
            }
        }
        Ok(outcomes)
    }

    pub async fn list_segments(&self, profile_id: Id) -> Result<Vec<segments::Model>, Error> {
        self.segments.list(profile_id).await
    }

    pub async fn set_segment_active(
        &self,
        id: Id,
        is_active: bool,
    ) -> Result<segments::Model, Error> {
        self.segments.set_active(id, is_active).await
    }

    pub async fn set_segment_auto_actions(
        &self,
        id: Id,
        auto_actions: Vec<AutomationAction>,
    ) -> Result<segments::Model, Error> {
        self.segments.set_auto_actions(id, auto_actions).await
    }

    pub async fn create_automation_rule(
        &self,
        profile_id: Id,
        new_rule: NewAutomationRule,
    ) -> Result<automation_rules::Model, Error> {
        self.rules.create(profile_id, new_rule).await
    }

    pub async fn update_automation_rule(
        &self,
        id: Id,
        update: AutomationRuleUpdate,
    ) -> Result<automation_rules::Model, Error> {
        self.rules.update(id, update).await
    }

    pub async fn toggle_automation_rule(
        &self,
        id: Id,
        is_active: bool,
    ) -> Result<automation_rules::Model, Error> {
        self.rules.toggle(id, is_active).await
    }

    pub async fn delete_automation_rule(&self, id: Id) -> Result<(), Error> {
        self.rules.delete(id).await
    }

    pub async fn list_automation_rules(
        &self,
        profile_id: Id,
    ) -> Result<Vec<automation_rules::Model>, Error> {
        self.rules.list(profile_id).await
    }

    pub async fn handle_lifecycle_event(
        &self,
        event: &LifecycleEvent,
    ) -> Result<ScheduleOutcome, Error> {
        let occurrence = event.occurrence();
        debug!(
            "Lifecycle event {} for customer {}",
            occurrence.occurrence_key, occurrence.customer_id
        );
        self.scheduler.schedule_occurrence(&occurrence).await
    }

    /// Offers the no-visit and birthday occurrences of every customer of every profile that
    /// has an active time-derived rule. Safe to run as often as wanted.
    pub async fn run_time_trigger_sweep(&self) -> Result<TriggerSweepReport, Error> {
        let mut by_profile: HashMap<Id, Vec<automation_rules::Model>> = HashMap::new();
        for rule in self.rules.list_all_active().await? {
            if rule.trigger.is_time_derived() {
                by_profile.entry(rule.profile_id).or_default().push(rule);
            }
        }

        let now = self.clock.now();
        let mut report = TriggerSweepReport::default();

        for (profile_id, rules) in by_profile {
            let triggers: Vec<TriggerType> = rules
                .iter()
                .map(|rule| rule.trigger)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            let customers = match self.customers.list_customers(profile_id).await {
                Ok(customers) => customers,
                Err(err) => {
                    error!("Loading customers of profile {profile_id} failed: {err}");
                    report.errors += 1;
                    continue;
                }
            };
            report.profiles += 1;
            report.customers += customers.len();

            for customer in &customers {
                for occurrence in trigger::time_derived_occurrences(customer, &triggers, now) {
                    match self.scheduler.schedule_for_rules(&occurrence, &rules).await {
                        Ok(outcome) => report.scheduled.merge(outcome),
                        Err(err) => {
                            error!(
                                "Scheduling {} for customer {} failed: {err}",
                                occurrence.occurrence_key, customer.id
                            );
                            report.errors += 1;
                        }
                    }
                }
            }
        }

        if report.scheduled.created > 0 {
            info!(
                "Time trigger sweep scheduled {} execution(s) over {} profile(s)",
                report.scheduled.created, report.profiles
            );
        }
        Ok(report)
    }

    pub async fn run_dispatch_sweep(&self) -> Result<SweepReport, Error> {
        self.dispatcher.run_sweep().await
    }

    pub async fn retry_execution(&self, id: Id) -> Result<scheduled_executions::Model, Error> {
        self.execution_log.retry(id).await
    }

    pub async fn list_execution_log(
        &self,
        filter: ExecutionFilter,
    ) -> Result<Vec<scheduled_executions::Model>, Error> {
        self.execution_log.list(filter).await
    }

    pub async fn find_execution(&self, id: Id) -> Result<scheduled_executions::Model, Error> {
        self.execution_log.find(id).await
    }

    pub fn available_fields(&self) -> Vec<FieldDescriptor> {
        field::available_fields()
    }
}
