//! Envelope protocol between providers.
//!
//! Providers exchange typed envelopes rather than calling each other
//! directly. A request envelope names a capability and carries a JSON
//! parameter map; delivery always produces exactly one response or error
//! envelope correlated back to the request. The `deliver` boundary is
//! total: a provider fault becomes an error envelope, never a panic or a
//! propagated `Err`.

pub mod registry;

pub use registry::{Capability, ProviderCard, ProviderRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::CallerContext;
use crate::error::{Error, ProtocolError};

/// Envelope kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
    Error,
}

/// A single protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub recipient: String,
    pub kind: EnvelopeKind,
    /// Set on request envelopes; responses and errors leave it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    pub payload: Value,
    /// Links a response or error back to the request it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl Envelope {
    pub fn request(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        capability: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: sender.into(),
            recipient: recipient.into(),
            kind: EnvelopeKind::Request,
            capability: Some(capability.into()),
            payload: params,
            correlation_id: None,
        }
    }

    pub fn response(request: &Envelope, result: Value) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: request.recipient.clone(),
            recipient: request.sender.clone(),
            kind: EnvelopeKind::Response,
            capability: None,
            payload: result,
            correlation_id: Some(request.correlation_root()),
        }
    }

    pub fn error(request: &Envelope, message: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender: request.recipient.clone(),
            recipient: request.sender.clone(),
            kind: EnvelopeKind::Error,
            capability: None,
            payload: json!({ "error": message.into() }),
            correlation_id: Some(request.correlation_root()),
        }
    }

    /// The id a reply should correlate to: the request's own correlation id
    /// when it is itself part of a chain, otherwise its message id.
    pub fn correlation_root(&self) -> Uuid {
        self.correlation_id.unwrap_or(self.message_id)
    }
}

/// Validated body of a request envelope.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub capability: String,
    pub params: Map<String, Value>,
}

impl CapabilityRequest {
    pub fn new(capability: &str, params: Value) -> Result<Self, ProtocolError> {
        if capability.trim().is_empty() {
            return Err(ProtocolError::EmptyCapability);
        }
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ProtocolError::InvalidParameters(format!(
                    "expected a parameter object, got {other}"
                )))
            }
        };
        Ok(Self {
            capability: capability.to_string(),
            params,
        })
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ProtocolError> {
        self.str_param(key)
            .ok_or_else(|| ProtocolError::InvalidParameters(format!("missing parameter: {key}")))
    }
}

/// A component that serves capabilities over the envelope protocol.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The card this provider registers under.
    fn card(&self) -> ProviderCard;

    /// Serve one capability request. An `Err` here is a provider fault and
    /// becomes an error envelope at the delivery boundary.
    async fn handle(&self, request: CapabilityRequest, ctx: &CallerContext)
        -> Result<Value, Error>;

    fn id(&self) -> String {
        self.card().provider_id
    }
}

/// Deliver an envelope to a provider and produce the reply envelope.
///
/// This function is total. Malformed envelopes, unknown capabilities and
/// handler faults all come back as error envelopes correlated to the
/// request.
pub async fn deliver(provider: &dyn Provider, envelope: &Envelope, ctx: &CallerContext) -> Envelope {
    if envelope.kind != EnvelopeKind::Request {
        let kind = format!("{:?}", envelope.kind).to_lowercase();
        return Envelope::error(envelope, ProtocolError::WrongEnvelopeKind(kind).to_string());
    }

    let capability = envelope.capability.as_deref().unwrap_or("");
    let request = match CapabilityRequest::new(capability, envelope.payload.clone()) {
        Ok(req) => req,
        Err(e) => return Envelope::error(envelope, e.to_string()),
    };

    let card = provider.card();
    if !card.has_capability(&request.capability) {
        return Envelope::error(
            envelope,
            ProtocolError::UnknownCapability(request.capability).to_string(),
        );
    }

    debug!(
        provider_id = %card.provider_id,
        capability = %request.capability,
        message_id = %envelope.message_id,
        "Delivering capability request"
    );

    match provider.handle(request, ctx).await {
        Ok(result) => Envelope::response(envelope, result),
        Err(e) => {
            warn!(
                provider_id = %card.provider_id,
                error = %e,
                "Provider fault during capability handling"
            );
            Envelope::error(envelope, e.to_string())
        }
    }
}
