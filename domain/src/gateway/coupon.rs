//! Client for the coupon-issuance API.
//!
//! A grant is `POST {base_url}/coupons/{coupon_id}/grants`. The API treats a repeated grant
//! of the same coupon to the same customer as a no-op, so the customer id doubles as the
//! idempotency key.

use super::CouponIssuer;
use crate::customer::Customer;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use crate::Id;
use async_trait::async_trait;
use log::*;
use serde::Serialize;
use service::config::Config;

pub struct CouponApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
pub struct GrantCouponRequest {
    pub customer_id: Id,
    pub profile_id: Id,
    pub email: String,
}

impl CouponApiClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let base_url = config.coupon_api_base_url().ok_or_else(|| {
            warn!("Coupon API base URL is not configured");
            config_error()
        })?;
        let api_key = config.coupon_api_key().ok_or_else(|| {
            warn!("Coupon API key is not configured");
            config_error()
        })?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .default_headers(super::bearer_headers(&api_key)?)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CouponIssuer for CouponApiClient {
    async fn issue_coupon(&self, customer: &Customer, coupon_id: &str) -> Result<(), Error> {
        let email = customer.usable_email().ok_or_else(|| Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(format!(
                "Customer {} has no valid email address",
                customer.id
            ))),
        })?;

        // Percent-encoding leaves dot segments alone.
        if matches!(coupon_id, "." | "..") {
            return Err(Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(format!(
                    "Invalid coupon id {coupon_id:?}"
                ))),
            });
        }

        let url = format!(
            "{}/coupons/{}/grants",
            self.base_url,
            urlencoding::encode(coupon_id)
        );
        let request = GrantCouponRequest {
            customer_id: customer.id,
            profile_id: customer.profile_id,
            email: email.to_string(),
        };

        debug!("Granting coupon {coupon_id} to customer {}", customer.id);

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status.is_success() {
            info!("Coupon {coupon_id} granted to customer {}", customer.id);
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Failed to grant coupon: {} - {}", status, error_text);
            Err(Error {
                source: None,
                error_kind: DomainErrorKind::External(ExternalErrorKind::Other(format!(
                    "Coupon API responded {status}: {error_text}"
                ))),
            })
        }
    }
}

/// Stands in when no coupon API is configured; every grant fails and is recorded as such.
pub struct UnconfiguredCouponIssuer;

#[async_trait]
impl CouponIssuer for UnconfiguredCouponIssuer {
    async fn issue_coupon(&self, _customer: &Customer, coupon_id: &str) -> Result<(), Error> {
        warn!("Cannot grant coupon {coupon_id}: coupon API is not configured");
        Err(config_error())
    }
}

fn config_error() -> Error {
    Error {
        source: None,
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
    }
}
