//! Mail transport abstraction.
//!
//! This module defines the `Mailer` trait used by
//! [`crate::notify::email::EmailNotifier`] to hand composed messages to a
//! delivery service, enabling testability with mock implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::person::Person;
use crate::error::Result;

/// A composed email, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<Person>,
    pub cc: Vec<Person>,
    pub subject: String,
    pub body: String,
}

/// Trait for delivering email messages.
///
/// # Example
/// ```ignore
/// let mailer = ReqwestMailer::new(MailerConfig::default());
/// mailer.send(&message).await?;
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message.
    ///
    /// # Errors
    /// Returns an error if the relay cannot be reached, times out or rejects
    /// the message.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Configuration for [`ReqwestMailer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// URL of the mail relay endpoint that accepts JSON messages
    pub endpoint: String,

    /// Timeout for each delivery attempt in milliseconds
    pub timeout_ms: u64,

    /// Address messages are sent from. `None` lets the relay decide.
    pub sender: Option<String>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8025/api/v1/send".to_string(),
            timeout_ms: 10_000,
            sender: None,
        }
    }
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

#[derive(Serialize)]
struct RelayPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    to: Vec<&'a str>,
    cc: Vec<&'a str>,
    subject: &'a str,
    html_body: &'a str,
}

/// Mailer that posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct ReqwestMailer {
    client: reqwest::Client,
    config: MailerConfig,
}

impl ReqwestMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for ReqwestMailer {
    #[tracing::instrument(skip(self, message), fields(subject = %message.subject, recipients = message.to.len() + message.cc.len()))]
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = RelayPayload {
            from: self.config.sender.as_deref(),
            to: message.to.iter().map(|p| p.email.as_str()).collect(),
            cc: message.cc.iter().map(|p| p.email.as_str()).collect(),
            subject: &message.subject,
            html_body: &message.body,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %self.config.endpoint, error = %e, "Mail relay request failed");
                e
            })?;

        let status = response.status();
        response.error_for_status()?;

        tracing::info!(status = status.as_u16(), "Mail relay accepted message");
        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::sync::Arc;

/// Mock mailer for testing.
///
/// Records every message it is asked to send and can be configured to fail.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent send with the given message.
    pub fn fail_with(&self, error: &str) {
        *self.failing.lock() = Some(error.to_string());
    }

    /// All messages delivered so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if let Some(error) = self.failing.lock().clone() {
            return Err(crate::error::ReqtrackError::Notification(error));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: vec![Person::new(1, "Jeremy Clark", "jeremyclark@example.com")],
            cc: vec![],
            subject: "Request 0001 Submitted".to_string(),
            body: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_mailer_records_messages() {
        let mailer = MockMailer::new();
        mailer.send(&message()).await.unwrap();
        mailer.send(&message()).await.unwrap();

        assert_eq!(mailer.sent_count(), 2);
        assert_eq!(mailer.sent()[0].subject, "Request 0001 Submitted");
    }

    #[tokio::test]
    async fn test_mock_mailer_failure() {
        let mailer = MockMailer::new();
        mailer.fail_with("relay down");

        let err = mailer.send(&message()).await.unwrap_err();
        assert_eq!(err.code(), "notification");
        assert_eq!(mailer.sent_count(), 0);
    }

    #[test]
    fn test_relay_payload_shape() {
        let message = message();
        let payload = RelayPayload {
            from: None,
            to: message.to.iter().map(|p| p.email.as_str()).collect(),
            cc: vec![],
            subject: &message.subject,
            html_body: &message.body,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["to"][0], "jeremyclark@example.com");
        assert!(json.get("from").is_none());
    }

    #[test]
    fn test_mailer_config_defaults_fill_missing_fields() {
        let config: MailerConfig =
            serde_json::from_str(r#"{"endpoint":"https://relay.example.com/send"}"#).unwrap();
        assert_eq!(config.endpoint, "https://relay.example.com/send");
        assert_eq!(config.timeout_ms, 10_000);
        assert!(config.sender.is_none());
    }
}
