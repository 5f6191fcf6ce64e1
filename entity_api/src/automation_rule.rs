use super::error::Error;
use entity::automation_rules::{ActiveModel, Column, Entity, Model};
use entity::trigger_type::TriggerType;
use entity::Id;
use sea_orm::{
    entity::prelude::*,
    sea_query::Expr,
    ActiveValue::{Set, Unchanged},
    DatabaseConnection, QueryOrder, TryIntoModel,
};

use log::*;

pub async fn create(db: &DatabaseConnection, rule_model: Model) -> Result<Model, Error> {
    debug!("New AutomationRule Model to be inserted: {:?}", rule_model);

    let now = chrono::Utc::now();

    let active_model = ActiveModel {
        id: Set(rule_model.id),
        profile_id: Set(rule_model.profile_id),
        name: Set(rule_model.name),
        trigger: Set(rule_model.trigger),
        action: Set(rule_model.action),
        is_active: Set(rule_model.is_active),
        sent_count: Set(0),
        scheduled_count: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?.try_into_model()?)
}

/// Updates the operator-editable fields. Counters are left untouched.
pub async fn update(db: &DatabaseConnection, id: Id, model: Model) -> Result<Model, Error> {
    let result = Entity::find_by_id(id).one(db).await?;

    match result {
        Some(rule) => {
            debug!("Existing AutomationRule model to be Updated: {:?}", rule);

            let active_model = ActiveModel {
                id: Unchanged(rule.id),
                profile_id: Unchanged(rule.profile_id),
                name: Set(model.name),
                trigger: Set(model.trigger),
                action: Set(model.action),
                is_active: Unchanged(rule.is_active),
                sent_count: Unchanged(rule.sent_count),
                scheduled_count: Unchanged(rule.scheduled_count),
                created_at: Unchanged(rule.created_at),
                updated_at: Set(chrono::Utc::now().into()),
            };

            Ok(active_model.update(db).await?.try_into_model()?)
        }
        None => {
            debug!("AutomationRule with id {} not found", id);

            Err(Error::not_found())
        }
    }
}

pub async fn update_active(db: &DatabaseConnection, id: Id, is_active: bool) -> Result<Model, Error> {
    let rule = find_by_id(db, id).await?.ok_or_else(Error::not_found)?;

    let active_model = ActiveModel {
        id: Unchanged(rule.id),
        is_active: Set(is_active),
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

pub async fn find_active_by_trigger(
    db: &DatabaseConnection,
    profile_id: Id,
    trigger: TriggerType,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ProfileId.eq(profile_id))
        .filter(Column::Trigger.eq(trigger))
        .filter(Column::IsActive.eq(true))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

/// Every active rule across all profiles.
pub async fn find_all_active(db: &DatabaseConnection) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::IsActive.eq(true))
        .order_by_asc(Column::ProfileId)
        .all(db)
        .await?)
}

pub async fn increment_scheduled_count(db: &impl ConnectionTrait, id: Id) -> Result<(), Error> {
    increment(db, id, Column::ScheduledCount).await
}

pub async fn increment_sent_count(db: &DatabaseConnection, id: Id) -> Result<(), Error> {
    increment(db, id, Column::SentCount).await
}

// A deleted rule leaves nothing to count; zero affected rows is not an error.
async fn increment(db: &impl ConnectionTrait, id: Id, column: Column) -> Result<(), Error> {
    Entity::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(())
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use entity::automation_action::AutomationAction;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn rule_model() -> Model {
        let now = chrono::Utc::now();
        Model {
            id: Id::new_v4(),
            profile_id: Id::new_v4(),
            name: "Thank you after booking".to_owned(),
            trigger: TriggerType::AfterBooking,
            action: AutomationAction::send_email("thanks", 24),
            is_active: true,
            sent_count: 0,
            scheduled_count: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn create_returns_a_new_rule_model_with_zeroed_counters() -> Result<(), Error> {
        let rule = rule_model();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![rule.clone()]])
            .into_connection();

        let created = create(&db, rule.clone()).await?;

        assert_eq!(created.id, rule.id);
        assert_eq!(created.sent_count, 0);
        assert_eq!(created.scheduled_count, 0);

        Ok(())
    }

    #[tokio::test]
    async fn update_returns_an_updated_rule_model() -> Result<(), Error> {
        let rule = rule_model();
        let mut edited = rule.clone();
        edited.name = "Thanks, two days later".to_owned();
        edited.action = AutomationAction::send_email("thanks", 48);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![rule.clone()], vec![edited.clone()]])
            .into_connection();

        let updated = update(&db, rule.id, edited.clone()).await?;

        assert_eq!(updated.action.delay_hours, 48);

        Ok(())
    }

    #[tokio::test]
    async fn increment_sent_count_issues_a_single_relative_update() -> Result<(), Error> {
        let id = Id::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        increment_sent_count(&db, id).await?;

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        assert!(format!("{:?}", log[0]).contains("sent_count"));

        Ok(())
    }
}
