use super::error::Error;
use entity::automation_action::AutoActions;
use entity::criteria::MemberIds;
use entity::segments::{ActiveModel, Column, Entity, Model};
use entity::Id;
use sea_orm::{
    entity::prelude::*, ActiveValue::Set, DatabaseConnection, QueryOrder, TryIntoModel,
};

use log::*;

pub async fn create(db: &DatabaseConnection, segment_model: Model) -> Result<Model, Error> {
    debug!(
        "New Segment Model to be inserted: {} ({} members)",
        segment_model.name, segment_model.member_count
    );

    let active_model = ActiveModel {
        id: Set(segment_model.id),
        profile_id: Set(segment_model.profile_id),
        kind: Set(segment_model.kind),
        name: Set(segment_model.name),
        color: Set(segment_model.color),
        criteria: Set(segment_model.criteria),
        auto_actions: Set(segment_model.auto_actions),
        member_ids: Set(segment_model.member_ids),
        member_count: Set(segment_model.member_count),
        membership_version: Set(segment_model.membership_version),
        refreshed_at: Set(segment_model.refreshed_at),
        is_active: Set(segment_model.is_active),
        created_at: Set(segment_model.created_at),
        updated_at: Set(segment_model.updated_at),
    };

    Ok(active_model.insert(db).await?.try_into_model()?)
}

pub async fn find_by_id(db: &DatabaseConnection, id: Id) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

pub async fn find_by_profile_id(
    db: &DatabaseConnection,
    profile_id: Id,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ProfileId.eq(profile_id))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn find_all(db: &DatabaseConnection) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .order_by_asc(Column::ProfileId)
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

/// Replaces the member set of a segment if nobody refreshed it since `expected_version`
/// was read. The whole set is written in one statement so readers never see a partial set.
///
/// Returns `false` when another refresh won the race.
pub async fn replace_membership(
    db: &DatabaseConnection,
    id: Id,
    expected_version: i64,
    member_ids: MemberIds,
    refreshed_at: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    let member_count = i32::try_from(member_ids.len()).unwrap_or(i32::MAX);

    let result = Entity::update_many()
        .set(ActiveModel {
            member_ids: Set(member_ids),
            member_count: Set(member_count),
            membership_version: Set(expected_version + 1),
            refreshed_at: Set(Some(refreshed_at)),
            updated_at: Set(refreshed_at),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::MembershipVersion.eq(expected_version))
        .exec(db)
        .await?;

    debug!(
        "Membership replace for segment {id} at version {expected_version}: {} row(s)",
        result.rows_affected
    );

    Ok(result.rows_affected == 1)
}

pub async fn update_active(db: &DatabaseConnection, id: Id, is_active: bool) -> Result<Model, Error> {
    let segment = find_by_id(db, id).await?.ok_or_else(Error::not_found)?;

    let active_model = ActiveModel {
        id: Set(segment.id),
        is_active: Set(is_active),
        updated_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    };

    Ok(active_model.update(db).await?.try_into_model()?)
}

pub async fn update_auto_actions(
    db: &DatabaseConnection,
    id: Id,
    auto_actions: AutoActions,
) -> Result<Model, Error> {
    let segment = find_by_id(db, id).await?.ok_or_else(Error::not_found)?;

    let active_model = ActiveModel {
        id: Set(segment.id),
        auto_actions: Set(auto_actions),
        updated_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    };

    Ok(active_model.update(db).await?.try_into_model()?)
}

pub async fn delete_by_id(db: &DatabaseConnection, id: Id) -> Result<(), Error> {
    let result = Entity::delete_by_id(id).exec(db).await?;

    if result.rows_affected == 0 {
        return Err(Error::not_found());
    }
    Ok(())
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use entity::criteria::{CriteriaSpec, MatchPolicy, RuleSpec};
    use entity::segment_kind::SegmentKind;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn segment_model() -> Model {
        let now = chrono::Utc::now();
        Model {
            id: Id::new_v4(),
            profile_id: Id::new_v4(),
            kind: SegmentKind::Custom,
            name: "Regulars".to_owned(),
            color: "#3366ff".to_owned(),
            criteria: CriteriaSpec {
                match_policy: MatchPolicy::All,
                rules: vec![RuleSpec::new("total_bookings", "gte", serde_json::json!(3))],
            },
            auto_actions: AutoActions::default(),
            member_ids: MemberIds::default(),
            member_count: 0,
            membership_version: 1,
            refreshed_at: Some(now.into()),
            is_active: true,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn create_returns_a_new_segment_model() -> Result<(), Error> {
        let segment = segment_model();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![segment.clone()]])
            .into_connection();

        let created = create(&db, segment.clone()).await?;

        assert_eq!(created.id, segment.id);
        assert_eq!(created.criteria, segment.criteria);

        Ok(())
    }

    #[tokio::test]
    async fn replace_membership_reports_a_lost_race() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let replaced = replace_membership(
            &db,
            Id::new_v4(),
            4,
            MemberIds::default(),
            chrono::Utc::now().into(),
        )
        .await?;

        assert!(!replaced);

        Ok(())
    }

    #[tokio::test]
    async fn delete_by_id_fails_for_unknown_segment() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let result = delete_by_id(&db, Id::new_v4()).await;

        assert_eq!(
            result.unwrap_err().error_kind,
            crate::error::EntityApiErrorKind::RecordNotFound
        );
    }
}
