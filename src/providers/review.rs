//! Advisory review provider.
//!
//! Evaluates policy rules for an expense without mutating anything. The
//! pipeline owns the actual state transition; this provider exists so
//! other agents can ask "what would policy say" over the protocol.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::CallerContext;
use crate::error::{Error, ProtocolError};
use crate::model::parse_amount;
use crate::pipeline::rules::{DocumentCheck, PolicyEngine};
use crate::protocol::{Capability, CapabilityRequest, Provider, ProviderCard};
use crate::store::Storage;

pub struct ReviewProvider {
    store: Arc<dyn Storage>,
    engine: Arc<PolicyEngine>,
}

impl ReviewProvider {
    pub const ID: &'static str = "expense_review";

    pub fn new(store: Arc<dyn Storage>, engine: Arc<PolicyEngine>) -> Self {
        Self { store, engine }
    }

    async fn review_expense(&self, request: &CapabilityRequest) -> Result<Value, Error> {
        let expense_id = request.require_str("expense_id").map_err(Error::from)?;
        let expense = self
            .store
            .get_expense(expense_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| {
                Error::from(ProtocolError::InvalidParameters(format!(
                    "unknown expense: {expense_id}"
                )))
            })?;

        // Advisory only: receipt presence stands in for the full document
        // check, which the pipeline runs through the extraction provider.
        let document = if expense.receipt_path.is_some() {
            DocumentCheck::Valid
        } else {
            DocumentCheck::Missing
        };
        let prior = self
            .store
            .count_expenses_on(
                &expense.employee_id,
                expense.submitted_at.date_naive(),
                &expense.id,
            )
            .await
            .map_err(Error::from)?;

        let limit = self.engine.auto_approve_limit().await;
        let decision = self.engine.evaluate(expense.amount, &document, prior, limit);

        Ok(json!({
            "expense_id": expense.id,
            "recommended_status": decision.status,
            "reason": decision.reason,
            "auto_approve_limit": limit,
        }))
    }

    async fn apply_policy_rules(&self, request: &CapabilityRequest) -> Result<Value, Error> {
        let amount = request
            .param("amount")
            .and_then(parse_amount)
            .ok_or_else(|| {
                Error::from(ProtocolError::InvalidParameters(
                    "missing or invalid parameter: amount".to_string(),
                ))
            })?;
        let receipt_attached = request
            .param("receipt_attached")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let prior_same_day = request
            .param("prior_same_day")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let document = if receipt_attached {
            DocumentCheck::Valid
        } else {
            DocumentCheck::Missing
        };
        let limit = self.engine.auto_approve_limit().await;
        let decision = self.engine.evaluate(amount, &document, prior_same_day, limit);

        Ok(json!({
            "recommended_status": decision.status,
            "reason": decision.reason,
            "auto_approve_limit": limit,
        }))
    }
}

#[async_trait]
impl Provider for ReviewProvider {
    fn card(&self) -> ProviderCard {
        ProviderCard {
            provider_id: Self::ID.to_string(),
            name: "Expense Review".to_string(),
            description: "Evaluates reimbursement policy for expense requests".to_string(),
            version: "1.0.0".to_string(),
            capabilities: vec![
                Capability::new(
                    "review_expense",
                    "Evaluate policy for a stored expense",
                    json!({
                        "type": "object",
                        "properties": { "expense_id": { "type": "string" } },
                        "required": ["expense_id"]
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "expense_id": { "type": "string" },
                            "recommended_status": { "type": "string" },
                            "reason": { "type": "string" },
                            "auto_approve_limit": { "type": "string" }
                        }
                    }),
                ),
                Capability::new(
                    "apply_policy_rules",
                    "Evaluate policy for raw expense facts",
                    json!({
                        "type": "object",
                        "properties": {
                            "amount": {},
                            "receipt_attached": { "type": "boolean" },
                            "prior_same_day": { "type": "integer" }
                        },
                        "required": ["amount"]
                    }),
                    json!({
                        "type": "object",
                        "properties": {
                            "recommended_status": { "type": "string" },
                            "reason": { "type": "string" },
                            "auto_approve_limit": { "type": "string" }
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
            "review_expense" => self.review_expense(&request).await,
            "apply_policy_rules" => self.apply_policy_rules(&request).await,
            other => Err(ProtocolError::UnknownCapability(other.to_string()).into()),
        }
    }
}
