use super::EmailSender;
use crate::customer::Customer;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use async_trait::async_trait;
use email_address::EmailAddress;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service::config::Config;

/// MailerSend API client for sending templated automation emails
pub struct MailerSendClient {
    client: reqwest::Client,
    base_url: String,
    from: Sender,
}

/// Email recipient with name and email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub email: String,
    pub name: Option<String>,
}

/// Email sender with name and email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub email: String,
    pub name: Option<String>,
}

/// Template variables for one recipient
#[derive(Debug, Clone, Serialize)]
pub struct Personalization {
    pub email: String,
    pub data: Map<String, Value>,
}

/// Request payload for sending a templated email via MailerSend.
/// Subject and body come from the template.
#[derive(Debug, Serialize)]
pub struct SendEmailRequest {
    pub from: Sender,
    pub to: Vec<EmailRecipient>,
    pub template_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub personalization: Vec<Personalization>,
}

/// Response from MailerSend API
#[derive(Debug, Deserialize)]
pub struct SendEmailResponse {
    pub message_id: Option<String>,
}

impl MailerSendClient {
    /// Create a new MailerSend client with authentication
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = build_client(config)?;
        let base_url = config.mailersend_base_url().trim_end_matches('/').to_string();
        let from = Sender {
            email: config.email_from_address().to_string(),
            name: None,
        };

        Ok(Self {
            client,
            base_url,
            from,
        })
    }

    /// Builds the request that sends `template_id` to `customer`.
    pub fn templated_request(&self, customer: &Customer, template_id: &str) -> Result<SendEmailRequest, Error> {
        let email = customer.usable_email().ok_or_else(|| Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(format!(
                "Customer {} has no valid email address",
                customer.id
            ))),
        })?;

        let mut data = Map::new();
        if let Some(name) = &customer.display_name {
            data.insert("name".to_string(), Value::String(name.clone()));
        }

        Ok(SendEmailRequest {
            from: self.from.clone(),
            to: vec![EmailRecipient {
                email: email.to_string(),
                name: customer.display_name.clone(),
            }],
            template_id: template_id.to_string(),
            personalization: vec![Personalization {
                email: email.to_string(),
                data,
            }],
        })
    }

    /// Send an email using MailerSend API
    pub async fn send_email(&self, request: SendEmailRequest) -> Result<SendEmailResponse, Error> {
        // Validate email addresses before sending
        if !is_valid_email(&request.from.email) {
            warn!("Invalid sender email: {}", request.from.email);
            return Err(Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
            });
        }

        for recipient in &request.to {
            if !is_valid_email(&recipient.email) {
                warn!("Invalid recipient email: {}", recipient.email);
                return Err(Error {
                    source: None,
                    error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(format!(
                        "Invalid recipient email address: {}",
                        recipient.email
                    ))),
                });
            }
        }

        let url = format!("{}/email", self.base_url);

        debug!(
            "Sending template {} to {} recipient(s)",
            request.template_id,
            request.to.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to send email request: {e:?}");
                Error {
                    source: Some(Box::new(e)),
                    error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            info!("Email sent successfully, message_id: {:?}", message_id);

            Ok(SendEmailResponse { message_id })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Failed to send email: {} - {}", status, error_text);
            Err(Error {
                source: None,
                error_kind: DomainErrorKind::External(ExternalErrorKind::Other(format!(
                    "MailerSend responded {status}: {error_text}"
                ))),
            })
        }
    }
}

#[async_trait]
impl EmailSender for MailerSendClient {
    async fn send_templated_email(&self, customer: &Customer, template_id: &str) -> Result<(), Error> {
        let request = self.templated_request(customer, template_id)?;
        self.send_email(request).await.map(|_| ())
    }
}

/// Build HTTP client with MailerSend authentication
/// Stands in when no MailerSend API key is configured; every send fails and is recorded as such.
pub struct UnconfiguredEmailSender;

#[async_trait]
impl EmailSender for UnconfiguredEmailSender {
    async fn send_templated_email(&self, _customer: &Customer, template_id: &str) -> Result<(), Error> {
        warn!("Cannot send template {template_id}: MailerSend is not configured");
        Err(Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
        })
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Error> {
    let headers = build_auth_headers(config)?;

    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .default_headers(headers)
        .build()?)
}

/// Build authentication headers for MailerSend API
fn build_auth_headers(config: &Config) -> Result<reqwest::header::HeaderMap, Error> {
    let api_key = config.mailersend_api_key().ok_or_else(|| {
        warn!("Failed to get MailerSend API key from config");
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
        }
    })?;

    super::bearer_headers(&api_key)
}

/// Validate email address format using email_address crate
pub fn is_valid_email(email: &str) -> bool {
    EmailAddress::is_valid(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::customer_model;
    use crate::Id;
    use mockito::Server;

    fn config(base_url: &str, api_key: Option<&str>) -> Config {
        let mut args = vec![
            "lifecycle_engine".to_string(),
            "--mailersend-base-url".to_string(),
            base_url.to_string(),
            "--email-from-address".to_string(),
            "hello@example.com".to_string(),
        ];
        if let Some(api_key) = api_key {
            args.push("--mailersend-api-key".to_string());
            args.push(api_key.to_string());
        }
        Config::from_args(args)
    }

    fn customer() -> Customer {
        Customer::from_model(customer_model(Id::new_v4()), chrono::Utc::now())
    }

    #[test]
    fn client_creation_fails_without_api_key() {
        let result = MailerSendClient::new(&config("http://localhost", None));

        assert_eq!(
            result.err().map(|e| e.error_kind),
            Some(DomainErrorKind::Internal(InternalErrorKind::Config))
        );
    }

    #[tokio::test]
    async fn unconfigured_sender_fails_with_a_config_error() {
        let result = UnconfiguredEmailSender
            .send_templated_email(&customer(), "welcome")
            .await;

        assert_eq!(
            result.err().map(|e| e.error_kind),
            Some(DomainErrorKind::Internal(InternalErrorKind::Config))
        );
    }

    #[tokio::test]
    async fn send_templated_email_posts_template_and_personalization() {
        let mut server = Server::new_async().await;
        let client = MailerSendClient::new(&config(&server.url(), Some("test_api_key_123"))).unwrap();

        let mock = server
            .mock("POST", "/email")
            .match_header("authorization", "Bearer test_api_key_123")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "from": { "email": "hello@example.com", "name": null },
                "to": [{ "email": "aiko@example.com", "name": "Aiko Tanaka" }],
                "template_id": "thanks",
                "personalization": [{
                    "email": "aiko@example.com",
                    "data": { "name": "Aiko Tanaka" }
                }]
            })))
            .with_status(202)
            .with_header("x-message-id", "msg_123456789")
            .create_async()
            .await;

        let result = client.send_templated_email(&customer(), "thanks").await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_requests_carry_the_provider_response() {
        let mut server = Server::new_async().await;
        let client = MailerSendClient::new(&config(&server.url(), Some("key"))).unwrap();

        let _mock = server
            .mock("POST", "/email")
            .with_status(422)
            .with_body(r#"{"message":"The template_id is invalid."}"#)
            .create_async()
            .await;

        let err = client
            .send_templated_email(&customer(), "missing")
            .await
            .unwrap_err();

        match err.error_kind {
            DomainErrorKind::External(ExternalErrorKind::Other(message)) => {
                assert!(message.contains("422"));
                assert!(message.contains("template_id is invalid"));
            }
            other => panic!("Expected an external error, got: {other:?}"),
        }
    }

    #[test]
    fn customers_without_an_address_cannot_be_emailed() {
        let client = MailerSendClient::new(&config("http://localhost", Some("key"))).unwrap();
        let mut model = customer_model(Id::new_v4());
        model.email = None;

        let result = client.templated_request(&Customer::from_model(model, chrono::Utc::now()), "thanks");

        assert!(result.is_err());
    }

    #[test]
    fn test_email_validation() {
        let invalid_emails = vec!["", "invalid-email", "@example.com", "test@"];

        for email in invalid_emails {
            assert!(!is_valid_email(email), "Email '{}' should be invalid", email);
        }

        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("user.name@domain.co.uk"));
    }
}
