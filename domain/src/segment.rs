//! Segments: named, criteria-defined customer groups with a cached member set.
//!
//! Membership is only ever written by [`SegmentStore::refresh`] (and once at creation). A
//! refresh diffs the freshly computed set against the stored one; customers that appear in
//! the new set are joins and feed the segment's auto-actions into the scheduler.

use crate::action;
use crate::automation_action::{AutoActions, AutomationAction};
use crate::clock::Clock;
use crate::criteria::{Criteria, CriteriaSpec, MatchPolicy, RuleSpec};
use crate::customer::{Customer, CustomerDirectory};
use crate::error::{Error, RejectionKind};
use crate::scheduler::{ScheduleOutcome, Scheduler};
use crate::segment_kind::SegmentKind;
use crate::storage::SegmentRepository;
use crate::{segments, Id};
use events::{EngineEvent, EventPublisher};
use log::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DEFAULT_COLOR: &str = "#6b7280";

#[derive(Clone, Debug, PartialEq)]
pub struct NewSegment {
    pub name: String,
    pub color: Option<String>,
    pub criteria: CriteriaSpec,
    pub auto_actions: Vec<AutomationAction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshScope {
    One(Id),
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced,
    /// Another refresh replaced the member set first. Nothing is written or published; any
    /// join rows this refresh scheduled carry the keys the winning refresh uses.
    LostRace,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefreshReport {
    pub segment_id: Id,
    pub outcome: RefreshOutcome,
    pub member_count: usize,
    pub joined: Vec<Id>,
    pub left: Vec<Id>,
    pub membership_version: i64,
    pub scheduled: ScheduleOutcome,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SeedOutcome {
    Seeded(Vec<segments::Model>),
    /// The profile already has segments; nothing was created.
    AlreadyInitialized,
}

/// The segments every profile starts with.
pub fn system_segment_catalog() -> Vec<NewSegment> {
    let all = |rules: Vec<RuleSpec>| CriteriaSpec {
        match_policy: MatchPolicy::All,
        rules,
    };

    vec![
        NewSegment {
            name: "New customers".to_string(),
            color: Some("#22c55e".to_string()),
            criteria: all(vec![RuleSpec::new("total_bookings", "eq", json!(0))]),
            auto_actions: vec![],
        },
        NewSegment {
            name: "Repeat customers".to_string(),
            color: Some("#3b82f6".to_string()),
            criteria: all(vec![RuleSpec::new("total_bookings", "gte", json!(2))]),
            auto_actions: vec![],
        },
        NewSegment {
            name: "VIP".to_string(),
            color: Some("#eab308".to_string()),
            criteria: all(vec![RuleSpec::new("total_bookings", "gte", json!(10))]),
            auto_actions: vec![],
        },
        NewSegment {
            name: "At risk".to_string(),
            color: Some("#ef4444".to_string()),
            criteria: all(vec![
                RuleSpec::new("total_bookings", "gte", json!(1)),
                RuleSpec::new("days_since_last_seen", "gte", json!(60)),
            ]),
            auto_actions: vec![],
        },
        NewSegment {
            name: "Subscribers".to_string(),
            color: Some("#a855f7".to_string()),
            criteria: all(vec![RuleSpec::new("is_subscriber", "eq", json!(true))]),
            auto_actions: vec![],
        },
        NewSegment {
            name: "Email reachable".to_string(),
            color: Some("#14b8a6".to_string()),
            criteria: all(vec![RuleSpec::new("has_email", "eq", json!(true))]),
            auto_actions: vec![],
        },
    ]
}

#[derive(Clone)]
pub struct SegmentStore {
    segments: Arc<dyn SegmentRepository>,
    customers: Arc<dyn CustomerDirectory>,
    scheduler: Scheduler,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl SegmentStore {
    pub fn new(
        segments: Arc<dyn SegmentRepository>,
        customers: Arc<dyn CustomerDirectory>,
        scheduler: Scheduler,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            segments,
            customers,
            scheduler,
            publisher,
            clock,
        }
    }

    /// Validates, computes the baseline membership and persists a custom segment.
    /// The baseline produces no joins.
    pub async fn create(&self, profile_id: Id, new_segment: NewSegment) -> Result<segments::Model, Error> {
        self.insert(profile_id, SegmentKind::Custom, new_segment, None)
            .await
    }

    /// Counts the profile's customers matching `criteria` without persisting anything.
    pub async fn preview(&self, profile_id: Id, criteria: &CriteriaSpec) -> Result<usize, Error> {
        let criteria = Criteria::compile(criteria)?;
        let customers = self.customers.list_customers(profile_id).await?;
        Ok(criteria.count_matches(&customers))
    }

    pub async fn refresh(&self, profile_id: Id, scope: RefreshScope) -> Result<Vec<RefreshReport>, Error> {
        let segments = match scope {
            RefreshScope::One(id) => {
                let segment = self
                    .segments
                    .find(id)
                    .await?
                    .filter(|segment| segment.profile_id == profile_id)
                    .ok_or_else(Error::not_found)?;
                vec![segment]
            }
            RefreshScope::All => self.segments.list(profile_id).await?,
        };

        if segments.is_empty() {
            return Ok(vec![]);
        }

        // One snapshot for every segment of the profile.
        let customers = self.customers.list_customers(profile_id).await?;

        let mut reports = Vec::with_capacity(segments.len());
        for segment in &segments {
            match self.refresh_segment(segment, &customers).await {
                Ok(report) => reports.push(report),
                Err(err) if scope == RefreshScope::All => {
                    error!("Refreshing segment {} failed: {err}", segment.id);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(reports)
    }

    /// Refreshes every segment of every profile.
    pub async fn refresh_all_profiles(&self) -> Result<Vec<RefreshReport>, Error> {
        let profile_ids: BTreeSet<Id> = self
            .segments
            .list_all()
            .await?
            .into_iter()
            .map(|segment| segment.profile_id)
            .collect();

        let mut reports = Vec::new();
        for profile_id in profile_ids {
            match self.refresh(profile_id, RefreshScope::All).await {
                Ok(mut profile_reports) => reports.append(&mut profile_reports),
                Err(err) => error!("Refreshing segments of profile {profile_id} failed: {err}"),
            }
        }
        Ok(reports)
    }

    pub async fn delete(&self, id: Id) -> Result<(), Error> {
        let segment = self.segments.find(id).await?.ok_or_else(Error::not_found)?;

        if segment.kind == SegmentKind::System {
            warn!("Refusing to delete system segment {} ({})", segment.name, id);
            return Err(Error::rejected(RejectionKind::SystemSegmentImmutable));
        }

        self.segments.delete(id).await?;
        info!("Deleted segment {} ({})", segment.name, id);
        Ok(())
    }

    /// Seeds the system catalog unless the profile already has segments.
    pub async fn seed_system_segments(&self, profile_id: Id) -> Result<SeedOutcome, Error> {
        if !self.segments.list(profile_id).await?.is_empty() {
            debug!("Profile {profile_id} already has segments");
            return Ok(SeedOutcome::AlreadyInitialized);
        }

        let customers = self.customers.list_customers(profile_id).await?;
        let mut seeded = Vec::new();
        for new_segment in system_segment_catalog() {
            seeded.push(
                self.insert(profile_id, SegmentKind::System, new_segment, Some(&customers))
                    .await?,
            );
        }

        info!("Seeded {} system segments for profile {profile_id}", seeded.len());
        Ok(SeedOutcome::Seeded(seeded))
    }

    pub async fn list(&self, profile_id: Id) -> Result<Vec<segments::Model>, Error> {
        self.segments.list(profile_id).await
    }

    pub async fn find(&self, id: Id) -> Result<segments::Model, Error> {
        self.segments.find(id).await?.ok_or_else(Error::not_found)
    }

    /// Inactive segments keep refreshing their membership but schedule no auto-actions.
    pub async fn set_active(&self, id: Id, is_active: bool) -> Result<segments::Model, Error> {
        self.segments.set_active(id, is_active).await
    }

    /// Applies to future joins only; already scheduled executions keep their snapshot.
    pub async fn set_auto_actions(
        &self,
        id: Id,
        auto_actions: Vec<AutomationAction>,
    ) -> Result<segments::Model, Error> {
        action::validate_all(&auto_actions)?;
        self.segments
            .set_auto_actions(id, AutoActions(auto_actions))
            .await
    }

    async fn insert(
        &self,
        profile_id: Id,
        kind: SegmentKind,
        new_segment: NewSegment,
        customers: Option<&[Customer]>,
    ) -> Result<segments::Model, Error> {
        let name = action::validate_name(&new_segment.name)?;
        let criteria = Criteria::compile(&new_segment.criteria)?;
        action::validate_all(&new_segment.auto_actions)?;

        let member_ids = match customers {
            Some(customers) => criteria.member_ids(customers),
            None => criteria.member_ids(&self.customers.list_customers(profile_id).await?),
        };

        let now = self.clock.now();
        let color = new_segment
            .color
            .map(|color| color.trim().to_string())
            .filter(|color| !color.is_empty())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());

        let segment = self
            .segments
            .insert(segments::Model {
                id: Id::new_v4(),
                profile_id,
                kind,
                name,
                color,
                criteria: new_segment.criteria,
                auto_actions: AutoActions(new_segment.auto_actions),
                member_count: i32::try_from(member_ids.len()).unwrap_or(i32::MAX),
                member_ids,
                membership_version: 1,
                refreshed_at: Some(now.into()),
                is_active: true,
                created_at: now.into(),
                updated_at: now.into(),
            })
            .await?;

        debug!(
            "Created {} segment {} with {} member(s)",
            segment.kind, segment.name, segment.member_count
        );
        Ok(segment)
    }

    async fn refresh_segment(
        &self,
        segment: &segments::Model,
        customers: &[Customer],
    ) -> Result<RefreshReport, Error> {
        let criteria = Criteria::compile(&segment.criteria)?;
        let new_members = criteria.member_ids(customers);

        let joined: Vec<Id> = new_members.0.difference(&segment.member_ids.0).copied().collect();
        let left: Vec<Id> = segment.member_ids.0.difference(&new_members.0).copied().collect();
        let member_count = new_members.len();

        let now = self.clock.now();
        let expected_version = segment.membership_version;
        let membership_version = expected_version + 1;

        // Join rows go in before the member set moves. A failure leaves the old set in place
        // so the next refresh sees the same joins again.
        let mut scheduled = ScheduleOutcome::default();
        if segment.is_active && !segment.auto_actions.0.is_empty() {
            for customer_id in &joined {
                let outcome = self
                    .scheduler
                    .schedule_segment_join(segment, *customer_id, membership_version, now)
                    .await?;
                scheduled.merge(outcome);
            }
        }

        let replaced = self
            .segments
            .replace_membership(segment.id, expected_version, new_members, now)
            .await?;

        if !replaced {
            warn!(
                "Segment {} was refreshed concurrently; discarding this refresh",
                segment.id
            );
            return Ok(RefreshReport {
                segment_id: segment.id,
                outcome: RefreshOutcome::LostRace,
                member_count: segment.member_ids.len(),
                joined: vec![],
                left: vec![],
                membership_version: expected_version,
                scheduled,
            });
        }

        info!(
            "Refreshed segment {} ({}): {} member(s), {} joined, {} left",
            segment.name,
            segment.id,
            member_count,
            joined.len(),
            left.len()
        );

        self.publisher
            .publish(EngineEvent::SegmentRefreshed {
                profile_id: segment.profile_id,
                segment_id: segment.id,
                membership_version,
                joined: joined.clone(),
                left: left.clone(),
            })
            .await;

        Ok(RefreshReport {
            segment_id: segment.id,
            outcome: RefreshOutcome::Replaced,
            member_count,
            joined,
            left,
            membership_version,
            scheduled,
        })
    }
}
