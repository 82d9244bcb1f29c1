//! Append-only audit trail.
//!
//! Every component writes its audit entry synchronously at the point of the
//! event, so entries causally precede or coincide with the state change
//! they describe. Entries are never updated or deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::model::Actor;
use crate::store::Storage;

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    StatusChange,
    InterAgentMessage,
    UnauthorizedAccess,
    Payment,
    Notification,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: Actor,
    pub event: AuditEvent,
    /// Human-readable log line.
    pub log: String,
    /// Event-specific structured fields.
    pub fields: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: Actor, event: AuditEvent, log: String, fields: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            event,
            log,
            fields,
            timestamp: Utc::now(),
        }
    }
}

/// Handle for appending audit entries.
///
/// Append failures are logged and swallowed: audit must never abort the
/// flow it describes.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Storage>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    pub async fn append(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(error = %e, event = ?entry.event, "Failed to append audit entry");
        }
    }

    /// Expense moved between review states.
    pub async fn status_change(
        &self,
        actor: Actor,
        expense_id: &str,
        old_status: &str,
        new_status: &str,
        reason: &str,
    ) {
        self.append(AuditEntry::new(
            actor,
            AuditEvent::StatusChange,
            format!(
                "Expense {expense_id} status changed: {old_status} -> {new_status}. Reason: {reason}"
            ),
            json!({
                "expense_id": expense_id,
                "old_status": old_status,
                "new_status": new_status,
                "reason": reason,
            }),
        ))
        .await;
    }

    /// One provider invoked another's capability.
    pub async fn provider_message(
        &self,
        from: &str,
        to: &str,
        capability: &str,
        success: bool,
        error: Option<&str>,
    ) {
        let mut log = format!("Provider message: {from} -> {to}.{capability}");
        if !success {
            log.push_str(&format!(" [FAILED: {}]", error.unwrap_or("unknown error")));
        }
        self.append(AuditEntry::new(
            Actor::Ai,
            AuditEvent::InterAgentMessage,
            log,
            json!({
                "from": from,
                "to": to,
                "capability": capability,
                "success": success,
                "error": error,
            }),
        ))
        .await;
    }

    /// A caller tried an operation their role does not permit.
    pub async fn unauthorized_access(
        &self,
        user_id: &str,
        resource: &str,
        action: &str,
        reason: &str,
    ) {
        self.append(AuditEntry::new(
            Actor::Human,
            AuditEvent::UnauthorizedAccess,
            format!(
                "Unauthorized access attempt: {user_id} tried to {action} {resource}. Reason: {reason}"
            ),
            json!({
                "user_id": user_id,
                "resource": resource,
                "action": action,
                "reason": reason,
            }),
        ))
        .await;
    }

    /// An approved expense was credited to a ledger account.
    #[allow(clippy::too_many_arguments)]
    pub async fn payment(
        &self,
        expense_id: &str,
        employee_id: &str,
        account_id: &str,
        amount: Decimal,
        old_balance: Decimal,
        new_balance: Decimal,
    ) {
        self.append(AuditEntry::new(
            Actor::Ai,
            AuditEvent::Payment,
            format!(
                "Payment processed: ${amount} for expense {expense_id} to account {account_id}. \
                 Balance: ${old_balance} -> ${new_balance}"
            ),
            json!({
                "expense_id": expense_id,
                "employee_id": employee_id,
                "account_id": account_id,
                "amount": amount,
                "old_balance": old_balance,
                "new_balance": new_balance,
            }),
        ))
        .await;
    }

    /// A notification was dispatched (or failed to).
    pub async fn notification(&self, to: &str, subject: &str, triggered_by: &str, success: bool) {
        let status = if success { "sent" } else { "failed" };
        self.append(AuditEntry::new(
            Actor::Ai,
            AuditEvent::Notification,
            format!("Notification {status}: to={to}, subject={subject}, triggered_by={triggered_by}"),
            json!({
                "to": to,
                "subject": subject,
                "triggered_by": triggered_by,
                "success": success,
            }),
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn entries_append_in_order() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        trail
            .status_change(Actor::Ai, "exp_1", "pending", "approved", "within policy")
            .await;
        trail
            .payment("exp_1", "emp_1", "acct_1", dec!(50.00), dec!(0.00), dec!(50.00))
            .await;

        let entries = store.list_audit().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, AuditEvent::StatusChange);
        assert_eq!(entries[1].event, AuditEvent::Payment);
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[tokio::test]
    async fn unauthorized_entries_carry_actor_human() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        trail
            .unauthorized_access("emp_1", "list_employees", "invoke_operation", "role mismatch")
            .await;

        let entries = store.list_audit().await.unwrap();
        assert_eq!(entries[0].actor, Actor::Human);
        assert_eq!(entries[0].event, AuditEvent::UnauthorizedAccess);
        assert_eq!(entries[0].fields["resource"], "list_employees");
    }

    #[tokio::test]
    async fn failed_provider_message_is_marked() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        trail
            .provider_message("orchestrator", "extraction", "extract_receipt_info", false, Some("boom"))
            .await;

        let entries = store.list_audit().await.unwrap();
        assert!(entries[0].log.contains("FAILED"));
        assert_eq!(entries[0].fields["success"], false);
    }

    #[test]
    fn event_serializes_snake_case() {
        let json = serde_json::to_string(&AuditEvent::InterAgentMessage).unwrap();
        assert_eq!(json, "\"inter_agent_message\"");
    }
}
