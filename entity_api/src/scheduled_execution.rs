//! Entity API for scheduled_executions.
//!
//! Every state change is a conditional update on `(status, version)` so that any number of
//! sweep workers can operate on the table concurrently without locking rows.

use super::automation_rule;
use super::error::Error;
use entity::execution_status::ExecutionStatus;
use entity::scheduled_executions::{ActiveModel, Column, Entity, Model};
use entity::Id;
use sea_orm::{
    entity::prelude::*, sea_query::Expr, sea_query::OnConflict, ActiveValue::Set, Condition,
    DatabaseConnection, QueryOrder, QuerySelect, TransactionTrait,
};

use log::*;

/// Filter for listing executions. Every field is optional; set fields are combined with AND.
#[derive(Clone, Debug, Default)]
pub struct ExecutionFilter {
    pub profile_id: Option<Id>,
    pub rule_id: Option<Id>,
    pub segment_id: Option<Id>,
    pub customer_id: Option<Id>,
    pub status: Option<ExecutionStatus>,
    pub created_after: Option<DateTimeWithTimeZone>,
    pub created_before: Option<DateTimeWithTimeZone>,
    pub limit: Option<u64>,
}

/// Inserts the execution unless a row with the same `trigger_key` already exists.
///
/// Returns `true` when the row was inserted, `false` when it was a duplicate. A new row owned
/// by a rule bumps that rule's `scheduled_count` in the same transaction.
pub async fn insert_if_absent(db: &DatabaseConnection, model: Model) -> Result<bool, Error> {
    let trigger_key = model.trigger_key.clone();
    let rule_id = model.rule_id;

    let active_model = ActiveModel {
        id: Set(model.id),
        profile_id: Set(model.profile_id),
        rule_id: Set(model.rule_id),
        segment_id: Set(model.segment_id),
        customer_id: Set(model.customer_id),
        action: Set(model.action),
        trigger_key: Set(model.trigger_key),
        due_at: Set(model.due_at),
        status: Set(model.status),
        version: Set(model.version),
        reason: Set(model.reason),
        claimed_at: Set(model.claimed_at),
        created_at: Set(model.created_at),
        resolved_at: Set(model.resolved_at),
        updated_at: Set(model.updated_at),
    };

    let txn = db.begin().await?;

    let inserted = Entity::insert(active_model)
        .on_conflict(
            OnConflict::column(Column::TriggerKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    if inserted == 0 {
        debug!("Execution with trigger key {trigger_key} already exists");
    } else if let Some(rule_id) = rule_id {
        automation_rule::increment_scheduled_count(&txn, rule_id).await?;
    }

    txn.commit().await?;
    Ok(inserted == 1)
}

pub async fn find_by_id(db: &DatabaseConnection, id: Id) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

/// Scheduled rows whose due time has passed, oldest first.
pub async fn find_due(
    db: &DatabaseConnection,
    now: DateTimeWithTimeZone,
    limit: u64,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::Status.eq(ExecutionStatus::Scheduled))
        .filter(Column::DueAt.lte(now))
        .order_by_asc(Column::DueAt)
        .limit(limit)
        .all(db)
        .await?)
}

/// `scheduled -> in_flight`, only if nobody else moved the row since `expected_version`.
pub async fn claim(
    db: &DatabaseConnection,
    id: Id,
    expected_version: i32,
    now: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    transition(
        db,
        id,
        ExecutionStatus::Scheduled,
        expected_version,
        ActiveModel {
            status: Set(ExecutionStatus::InFlight),
            version: Set(expected_version + 1),
            claimed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await
}

/// `in_flight -> sent | failed | skipped`.
pub async fn resolve(
    db: &DatabaseConnection,
    id: Id,
    expected_version: i32,
    status: ExecutionStatus,
    reason: Option<String>,
    now: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    transition(
        db,
        id,
        ExecutionStatus::InFlight,
        expected_version,
        ActiveModel {
            status: Set(status),
            version: Set(expected_version + 1),
            reason: Set(reason),
            resolved_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await
}

/// `in_flight -> scheduled`; hands a claimed row back to the next sweep.
pub async fn release(
    db: &DatabaseConnection,
    id: Id,
    expected_version: i32,
    now: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    transition(
        db,
        id,
        ExecutionStatus::InFlight,
        expected_version,
        ActiveModel {
            status: Set(ExecutionStatus::Scheduled),
            version: Set(expected_version + 1),
            claimed_at: Set(None),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await
}

/// `failed -> scheduled`, due immediately. Operator-triggered only.
pub async fn requeue_failed(
    db: &DatabaseConnection,
    id: Id,
    expected_version: i32,
    now: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    transition(
        db,
        id,
        ExecutionStatus::Failed,
        expected_version,
        ActiveModel {
            status: Set(ExecutionStatus::Scheduled),
            version: Set(expected_version + 1),
            due_at: Set(now),
            reason: Set(None),
            claimed_at: Set(None),
            resolved_at: Set(None),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await
}

/// Fails every row that has been `in_flight` since before `claimed_before`.
/// These belong to workers that died mid-send; they are never re-sent automatically.
pub async fn expire_claims(
    db: &DatabaseConnection,
    claimed_before: DateTimeWithTimeZone,
    reason: &str,
    now: DateTimeWithTimeZone,
) -> Result<u64, Error> {
    let result = Entity::update_many()
        .set(ActiveModel {
            status: Set(ExecutionStatus::Failed),
            reason: Set(Some(reason.to_owned())),
            resolved_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .col_expr(Column::Version, Expr::col(Column::Version).add(1))
        .filter(Column::Status.eq(ExecutionStatus::InFlight))
        .filter(Column::ClaimedAt.lt(claimed_before))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        warn!("Expired {} stale execution claim(s)", result.rows_affected);
    }

    Ok(result.rows_affected)
}

pub async fn find_by(db: &DatabaseConnection, filter: ExecutionFilter) -> Result<Vec<Model>, Error> {
    let mut condition = Condition::all();

    if let Some(profile_id) = filter.profile_id {
        condition = condition.add(Column::ProfileId.eq(profile_id));
    }
    if let Some(rule_id) = filter.rule_id {
        condition = condition.add(Column::RuleId.eq(rule_id));
    }
    if let Some(segment_id) = filter.segment_id {
        condition = condition.add(Column::SegmentId.eq(segment_id));
    }
    if let Some(customer_id) = filter.customer_id {
        condition = condition.add(Column::CustomerId.eq(customer_id));
    }
    if let Some(status) = filter.status {
        condition = condition.add(Column::Status.eq(status));
    }
    if let Some(after) = filter.created_after {
        condition = condition.add(Column::CreatedAt.gte(after));
    }
    if let Some(before) = filter.created_before {
        condition = condition.add(Column::CreatedAt.lt(before));
    }

    let mut query = Entity::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt);

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    Ok(query.all(db).await?)
}

async fn transition(
    db: &DatabaseConnection,
    id: Id,
    from: ExecutionStatus,
    expected_version: i32,
    changes: ActiveModel,
) -> Result<bool, Error> {
    let result = Entity::update_many()
        .set(changes)
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(from))
        .filter(Column::Version.eq(expected_version))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}
