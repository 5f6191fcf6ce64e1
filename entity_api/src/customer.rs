//! Read access to the product's customers plus the one write the engine is allowed: tags.

use super::error::Error;
use entity::customers::{ActiveModel, Column, CustomerTags, Entity, Model};
use entity::Id;
use sea_orm::{
    entity::prelude::*, ActiveValue::Set, DatabaseConnection, QueryOrder, QuerySelect,
    TransactionTrait,
};

use log::*;

pub async fn find_by_id(db: &DatabaseConnection, id: Id) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

pub async fn find_by_profile_id(
    db: &DatabaseConnection,
    profile_id: Id,
) -> Result<Vec<Model>, Error> {
    debug!("Loading customers for profile {profile_id}");

    Ok(Entity::find()
        .filter(Column::ProfileId.eq(profile_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

/// Distinct profile ids that own at least one customer.
pub async fn find_profile_ids(db: &DatabaseConnection) -> Result<Vec<Id>, Error> {
    Ok(Entity::find()
        .select_only()
        .column(Column::ProfileId)
        .distinct()
        .into_tuple::<Id>()
        .all(db)
        .await?)
}

/// Adds `tag` to the customer's tag set. Tags are a set, so adding an existing tag
/// leaves the row untouched. The row is locked for the read-modify-write.
///
/// Returns `true` when the tag was newly added.
pub async fn add_tag(db: &DatabaseConnection, id: Id, tag: &str) -> Result<bool, Error> {
    let txn = db.begin().await?;

    let customer = Entity::find_by_id(id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(Error::not_found)?;

    let mut tags = customer.tags.0.clone();
    if !tags.insert(tag.to_owned()) {
        debug!("Customer {id} already tagged with {tag}");
        txn.commit().await?;
        return Ok(false);
    }

    let active_model = ActiveModel {
        id: Set(customer.id),
        tags: Set(CustomerTags(tags)),
        updated_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    };
    active_model.update(&txn).await?;

    txn.commit().await?;
    Ok(true)
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::BTreeSet;

    fn customer(tags: &[&str]) -> Model {
        let now = chrono::Utc::now();
        Model {
            id: Id::new_v4(),
            profile_id: Id::new_v4(),
            display_name: Some("Aiko".to_owned()),
            email: Some("aiko@example.com".to_owned()),
            tags: CustomerTags(tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>()),
            source: Some("booking".to_owned()),
            total_bookings: 3,
            total_messages: 1,
            is_subscriber: false,
            birthday: None,
            last_seen_at: Some(now.into()),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn find_by_id_returns_none_when_missing() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        assert_eq!(find_by_id(&db, Id::new_v4()).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn add_tag_is_a_no_op_for_an_existing_tag() -> Result<(), Error> {
        let existing = customer(&["vip"]);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![existing.clone()]])
            .into_connection();

        let added = add_tag(&db, existing.id, "vip").await?;

        assert!(!added);

        Ok(())
    }

    #[tokio::test]
    async fn add_tag_writes_the_union_of_tags() -> Result<(), Error> {
        let existing = customer(&["vip"]);
        let mut updated = existing.clone();
        updated.tags.0.insert("birthday-2026".to_owned());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![existing.clone()], vec![updated]])
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let added = add_tag(&db, existing.id, "birthday-2026").await?;

        assert!(added);

        Ok(())
    }
}
