//! Outbound collaborators the dispatcher delegates sends to.

use crate::customer::Customer;
use crate::error::{DomainErrorKind, Error, InternalErrorKind};
use async_trait::async_trait;
use log::*;

pub mod coupon;
pub mod mailersend;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_templated_email(&self, customer: &Customer, template_id: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait CouponIssuer: Send + Sync {
    async fn issue_coupon(&self, customer: &Customer, coupon_id: &str) -> Result<(), Error>;
}

/// Default headers for a JSON API authenticated with a bearer token.
pub(crate) fn bearer_headers(api_key: &str) -> Result<reqwest::header::HeaderMap, Error> {
    let mut headers = reqwest::header::HeaderMap::new();
    let auth_value = format!("Bearer {}", api_key);
    let mut auth_header = reqwest::header::HeaderValue::from_str(&auth_value).map_err(|err| {
        warn!("Failed to create authorization header value: {err:?}");
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to create authorization header value".to_string(),
            )),
        }
    })?;
    auth_header.set_sensitive(true);
    headers.insert(reqwest::header::AUTHORIZATION, auth_header);

    headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    Ok(headers)
}
