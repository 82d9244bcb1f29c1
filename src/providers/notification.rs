//! Outbound notification provider.
//!
//! Serves `send_expense_notification` and `send_email`. The actual
//! transport sits behind the `Notifier` trait; the binary wires in SMTP
//! when configured and falls back to a log-only notifier otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::context::CallerContext;
use crate::error::{Error, NotifyError, ProtocolError};
use crate::protocol::{Capability, CapabilityRequest, Provider, ProviderCard};

/// Transport for outbound messages. Returns a message id on success.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, NotifyError>;
}

/// SMTP transport backed by lettre. The blocking send runs on the
/// blocking thread pool.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, NotifyError> {
        let message = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| NotifyError::Build(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError::Build(format!("invalid recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        let credentials = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        let mailer = SmtpTransport::relay(&self.config.host)
            .map_err(|e| NotifyError::Send {
                to: to.to_string(),
                reason: e.to_string(),
            })?
            .port(self.config.port)
            .credentials(credentials)
            .build();

        let to_owned = to.to_string();
        let response = tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Send {
                to: to_owned.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| NotifyError::Send {
                to: to_owned,
                reason: e.to_string(),
            })?;

        Ok(response
            .message()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

/// Notifier used when no SMTP transport is configured. Logs the message
/// and reports success so the review flow is unaffected.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, NotifyError> {
        info!(to, subject, body_len = body.len(), "Notification (log-only transport)");
        Ok(format!("log-{}", Uuid::new_v4()))
    }
}

/// Subject line for an expense decision notification.
pub fn expense_subject(expense_id: &str, status: &str) -> String {
    format!("Expense Request #{expense_id} - {}", status.to_uppercase())
}

/// Plain-text body for an expense decision notification.
pub fn expense_body(status: &str, amount: &str, category: &str, reason: &str) -> String {
    format!(
        "Your expense request has been updated.\n\n\
         Status: {status}\n\
         Amount: ${amount}\n\
         Category: {category}\n\
         Reason: {reason}\n"
    )
}

pub struct NotificationProvider {
    notifier: Arc<dyn Notifier>,
}

impl NotificationProvider {
    pub const ID: &'static str = "notification";

    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    async fn send_expense_notification(
        &self,
        request: &CapabilityRequest,
    ) -> Result<Value, Error> {
        let to = request.require_str("to").map_err(Error::from)?;
        let expense_id = request.require_str("expense_id").map_err(Error::from)?;
        let status = request.require_str("status").map_err(Error::from)?;
        let amount = request.str_param("amount").unwrap_or("0.00");
        let category = request.str_param("category").unwrap_or("");
        let reason = request.str_param("decision_reason").unwrap_or("");

        let subject = expense_subject(expense_id, status);
        let body = expense_body(status, amount, category, reason);
        let message_id = self.notifier.send(to, &subject, &body).await?;

        Ok(json!({
            "to": to,
            "subject": subject,
            "message_id": message_id,
        }))
    }

    async fn send_email(&self, request: &CapabilityRequest) -> Result<Value, Error> {
        let to = request.require_str("to").map_err(Error::from)?;
        let subject = request.require_str("subject").map_err(Error::from)?;
        let body = request.str_param("body").unwrap_or("");

        let message_id = self.notifier.send(to, subject, body).await?;
        Ok(json!({
            "to": to,
            "subject": subject,
            "message_id": message_id,
        }))
    }
}

#[async_trait]
impl Provider for NotificationProvider {
    fn card(&self) -> ProviderCard {
        ProviderCard {
            provider_id: Self::ID.to_string(),
            name: "Notification".to_string(),
            description: "Sends expense decision notifications and plain emails".to_string(),
            version: "1.0.0".to_string(),
            capabilities: vec![
                Capability::new(
                    "send_expense_notification",
                    "Notify an employee about an expense decision",
                    json!({
                        "type": "object",
                        "properties": {
                            "to": { "type": "string" },
                            "expense_id": { "type": "string" },
                            "status": { "type": "string" },
                            "amount": { "type": "string" },
                            "category": { "type": "string" },
                            "decision_reason": { "type": "string" }
                        },
                        "required": ["to", "expense_id", "status"]
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "to": { "type": "string" },
                            "subject": { "type": "string" },
                            "message_id": { "type": "string" }
                        }
                    }),
                ),
                Capability::new(
                    "send_email",
                    "Send a plain-text email",
                    json!({
                        "type": "object",
                        "properties": {
                            "to": { "type": "string" },
                            "subject": { "type": "string" },
                            "body": { "type": "string" }
                        },
                        "required": ["to", "subject"]
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "to": { "type": "string" },
                            "subject": { "type": "string" },
                            "message_id": { "type": "string" }
                        }
                    }),
                ),
            ],
            metadata: json!({}),
        }
    }

    async fn handle(
        &self,
        request: CapabilityRequest,
        _ctx: &CallerContext,
    ) -> Result<Value, Error> {
        match request.capability.as_str() {
            "send_expense_notification" => self.send_expense_notification(&request).await,
            "send_email" => self.send_email(&request).await,
            other => Err(ProtocolError::UnknownCapability(other.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use tokio::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<String, NotifyError> {
            if self.fail {
                return Err(NotifyError::Send {
                    to: to.to_string(),
                    reason: "transport down".to_string(),
                });
            }
            self.sent
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok("msg-1".to_string())
        }
    }

    fn ctx() -> CallerContext {
        CallerContext::new("emp_1", Role::Employee)
    }

    #[test]
    fn subject_uses_request_id_and_uppercased_status() {
        assert_eq!(
            expense_subject("exp_42", "approved"),
            "Expense Request #exp_42 - APPROVED"
        );
        assert_eq!(
            expense_subject("exp_42", "admin_review"),
            "Expense Request #exp_42 - ADMIN_REVIEW"
        );
    }

    #[tokio::test]
    async fn expense_notification_builds_subject_and_body() {
        let notifier = RecordingNotifier::new(false);
        let provider = NotificationProvider::new(notifier.clone());

        let request = CapabilityRequest::new(
            "send_expense_notification",
            json!({
                "to": "alice@corp.test",
                "expense_id": "exp_7",
                "status": "rejected",
                "amount": "88.00",
                "category": "Travel",
                "decision_reason": "No receipt document was attached",
            }),
        )
        .unwrap();

        let result = provider.handle(request, &ctx()).await.unwrap();
        assert_eq!(result["subject"], "Expense Request #exp_7 - REJECTED");
        assert_eq!(result["message_id"], "msg-1");

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("No receipt document was attached"));
        assert!(sent[0].2.contains("$88.00"));
    }

    #[tokio::test]
    async fn transport_failure_is_a_provider_fault() {
        let provider = NotificationProvider::new(RecordingNotifier::new(true));
        let request = CapabilityRequest::new(
            "send_expense_notification",
            json!({
                "to": "alice@corp.test",
                "expense_id": "exp_7",
                "status": "approved",
            }),
        )
        .unwrap();

        let err = provider.handle(request, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("transport down"));
    }

    #[tokio::test]
    async fn plain_email_round_trip() {
        let notifier = RecordingNotifier::new(false);
        let provider = NotificationProvider::new(notifier.clone());

        let request = CapabilityRequest::new(
            "send_email",
            json!({ "to": "bob@corp.test", "subject": "Hello", "body": "Hi Bob" }),
        )
        .unwrap();

        provider.handle(request, &ctx()).await.unwrap();
        let sent = notifier.sent.lock().await;
        assert_eq!(sent[0].1, "Hello");
    }
}
