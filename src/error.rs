//! Error types for the expense orchestration service.

use rust_decimal::Decimal;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Envelope/capability protocol errors. These are converted to error-type
/// envelopes at the `deliver` boundary and never surface as faults.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Capability name must not be empty")]
    EmptyCapability,

    #[error("Invalid request parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Only request envelopes are accepted (got {0})")]
    WrongEnvelopeKind(String),

    #[error("Malformed envelope payload: {0}")]
    MalformedPayload(String),
}

/// Role gate failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(
        "Access denied: this operation requires one of the following roles: {}",
        required.join(", ")
    )]
    Denied {
        required: Vec<String>,
        user_role: String,
    },
}

/// Review pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Expense {expense_id} is not awaiting manual review (status: {status})")]
    InvalidState { expense_id: String, status: String },

    #[error("Expense {expense_id} is not approved (status: {status})")]
    NotApproved { expense_id: String, status: String },

    #[error("Receipt extraction failed: {0}")]
    Extraction(String),

    #[error("Employee {employee_id} does not have a linked ledger account")]
    MissingAccount { employee_id: String },

    #[error("Invalid expense amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Outbound notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to send to {to}: {reason}")]
    Send { to: String, reason: String },

    #[error("Notification transport is not configured")]
    NotConfigured,
}

/// Reasoning service errors.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Reasoning service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid reasoning response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
