//! Turns inbound lifecycle events and time-derived conditions into trigger occurrences.
//!
//! Each occurrence carries an `occurrence_key` naming the thing that happened (a booking id,
//! an inactivity episode, a birthday year). The scheduler folds it into the execution's
//! `trigger_key`, so the same occurrence can be offered any number of times and still only
//! schedules once.

use crate::customer::Customer;
use crate::trigger_type::TriggerType;
use crate::Id;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Product events the engine reacts to. The ids are the product's own event ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    BookingCreated {
        profile_id: Id,
        customer_id: Id,
        booking_id: String,
        occurred_at: DateTime<Utc>,
    },
    ContactReceived {
        profile_id: Id,
        customer_id: Id,
        contact_id: String,
        occurred_at: DateTime<Utc>,
    },
    SubscriptionCreated {
        profile_id: Id,
        customer_id: Id,
        subscription_id: String,
        occurred_at: DateTime<Utc>,
    },
    StampCardCompleted {
        profile_id: Id,
        customer_id: Id,
        stamp_card_id: String,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerOccurrence {
    pub profile_id: Id,
    pub customer_id: Id,
    pub trigger: TriggerType,
    pub occurrence_key: String,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn occurrence(&self) -> TriggerOccurrence {
        let (profile_id, customer_id, trigger, occurrence_key, occurred_at) = match self {
            LifecycleEvent::BookingCreated {
                profile_id,
                customer_id,
                booking_id,
                occurred_at,
            } => (
                profile_id,
                customer_id,
                TriggerType::AfterBooking,
                format!("booking:{booking_id}"),
                occurred_at,
            ),
            LifecycleEvent::ContactReceived {
                profile_id,
                customer_id,
                contact_id,
                occurred_at,
            } => (
                profile_id,
                customer_id,
                TriggerType::AfterContact,
                format!("contact:{contact_id}"),
                occurred_at,
            ),
            LifecycleEvent::SubscriptionCreated {
                profile_id,
                customer_id,
                subscription_id,
                occurred_at,
            } => (
                profile_id,
                customer_id,
                TriggerType::AfterSubscribe,
                format!("subscription:{subscription_id}"),
                occurred_at,
            ),
            LifecycleEvent::StampCardCompleted {
                profile_id,
                customer_id,
                stamp_card_id,
                occurred_at,
            } => (
                profile_id,
                customer_id,
                TriggerType::AfterStampComplete,
                format!("stamp_card:{stamp_card_id}"),
                occurred_at,
            ),
        };

        TriggerOccurrence {
            profile_id: *profile_id,
            customer_id: *customer_id,
            trigger,
            occurrence_key,
            occurred_at: *occurred_at,
        }
    }
}

/// Fires once per inactivity episode. The episode is identified by the last visit's date,
/// so a customer who stays away is not re-triggered, while a visit starts a new episode.
pub fn no_visit_occurrence(
    customer: &Customer,
    trigger: TriggerType,
    now: DateTime<Utc>,
) -> Option<TriggerOccurrence> {
    let threshold = trigger.no_visit_threshold_days()?;
    if customer.days_since_last_seen < threshold {
        return None;
    }

    let episode = customer
        .last_seen_at
        .map(|at| at.date_naive().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "never".to_string());

    Some(TriggerOccurrence {
        profile_id: customer.profile_id,
        customer_id: customer.id,
        trigger,
        occurrence_key: format!("{trigger}:{episode}"),
        occurred_at: now,
    })
}

/// Fires on the UTC calendar day of the birthday, once per year.
pub fn birthday_occurrence(customer: &Customer, now: DateTime<Utc>) -> Option<TriggerOccurrence> {
    let birthday = customer.birthday?;
    let today = now.date_naive();
    if !is_birthday(birthday, today) {
        return None;
    }

    Some(TriggerOccurrence {
        profile_id: customer.profile_id,
        customer_id: customer.id,
        trigger: TriggerType::Birthday,
        occurrence_key: format!("birthday:{}", today.year()),
        occurred_at: now,
    })
}

/// 29 February birthdays are celebrated on 28 February outside leap years.
pub fn is_birthday(birthday: NaiveDate, today: NaiveDate) -> bool {
    if birthday.month() == today.month() && birthday.day() == today.day() {
        return true;
    }
    let leap_day = birthday.month() == 2 && birthday.day() == 29;
    let leap_year = NaiveDate::from_ymd_opt(today.year(), 2, 29).is_some();
    leap_day && !leap_year && today.month() == 2 && today.day() == 28
}

/// Every time-derived occurrence `customer` is due for among `triggers`.
pub fn time_derived_occurrences(
    customer: &Customer,
    triggers: &[TriggerType],
    now: DateTime<Utc>,
) -> Vec<TriggerOccurrence> {
    triggers
        .iter()
        .filter_map(|trigger| match trigger {
            TriggerType::Birthday => birthday_occurrence(customer, now),
            other => no_visit_occurrence(customer, *other, now),
        })
        .collect()
}
