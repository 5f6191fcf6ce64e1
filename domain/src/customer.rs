//! The engine's read-only view of a customer plus the directory it is loaded from.

use crate::clock::Clock;
use crate::error::Error;
use crate::gateway::mailersend::is_valid_email;
use crate::{customers, Id};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A customer as seen at one evaluation instant.
#[derive(Clone, Debug, PartialEq)]
pub struct Customer {
    pub id: Id,
    pub profile_id: Id,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub tags: BTreeSet<String>,
    pub source: Option<String>,
    pub total_bookings: i64,
    pub total_messages: i64,
    pub is_subscriber: bool,
    pub birthday: Option<NaiveDate>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Whole days between the last visit (or signup when never seen) and the evaluation instant.
    pub days_since_last_seen: i64,
}

impl Customer {
    pub fn from_model(model: customers::Model, now: DateTime<Utc>) -> Self {
        let last_seen_at = model.last_seen_at.map(|at| at.with_timezone(&Utc));
        let created_at = model.created_at.with_timezone(&Utc);
        let reference = last_seen_at.unwrap_or(created_at);
        let days_since_last_seen = (now - reference).num_days().max(0);

        Self {
            id: model.id,
            profile_id: model.profile_id,
            display_name: model.display_name,
            email: model.email,
            tags: model.tags.0,
            source: model.source,
            total_bookings: i64::from(model.total_bookings),
            total_messages: i64::from(model.total_messages),
            is_subscriber: model.is_subscriber,
            birthday: model.birthday,
            last_seen_at,
            created_at,
            days_since_last_seen,
        }
    }

    /// The address an email or coupon can be delivered to, if any.
    pub fn usable_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| is_valid_email(email))
    }

    pub fn has_email(&self) -> bool {
        self.usable_email().is_some()
    }
}

/// Where customers come from. The engine never creates or deletes customers; tags are the
/// only attribute it writes.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: Id) -> Result<Option<Customer>, Error>;

    async fn list_customers(&self, profile_id: Id) -> Result<Vec<Customer>, Error>;

    /// Set union; returns `true` when the tag was not present yet.
    async fn add_tag(&self, id: Id, tag: &str) -> Result<bool, Error>;

    /// Every profile that owns at least one customer.
    async fn list_profile_ids(&self) -> Result<Vec<Id>, Error>;
}

/// Reads the product's `customers` table.
pub struct DbCustomerDirectory {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
}

impl DbCustomerDirectory {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl CustomerDirectory for DbCustomerDirectory {
    async fn get_customer(&self, id: Id) -> Result<Option<Customer>, Error> {
        let now = self.clock.now();
        Ok(entity_api::customer::find_by_id(&self.db, id)
            .await?
            .map(|model| Customer::from_model(model, now)))
    }

    async fn list_customers(&self, profile_id: Id) -> Result<Vec<Customer>, Error> {
        let now = self.clock.now();
        Ok(entity_api::customer::find_by_profile_id(&self.db, profile_id)
            .await?
            .into_iter()
            .map(|model| Customer::from_model(model, now))
            .collect())
    }

    async fn add_tag(&self, id: Id, tag: &str) -> Result<bool, Error> {
        Ok(entity_api::customer::add_tag(&self.db, id, tag).await?)
    }

    async fn list_profile_ids(&self) -> Result<Vec<Id>, Error> {
        Ok(entity_api::customer::find_profile_ids(&self.db).await?)
    }
}
