//! Natural-language query interpretation.
//!
//! The dispatcher hands free-form queries to a `ReasoningService`, which
//! either picks an operation from the catalog with arguments or answers
//! in plain text. The default binding is a keyword heuristic; tests use a
//! scripted implementation.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use crate::dispatch::catalog::OperationDescriptor;
use crate::error::ReasoningError;

/// What the reasoner made of a query.
#[derive(Debug, Clone)]
pub enum ReasoningOutcome {
    /// Invoke a catalog operation with these arguments.
    Operation { name: String, arguments: Value },
    /// Answer directly with text.
    Text(String),
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn interpret(
        &self,
        query: &str,
        operations: &[OperationDescriptor],
    ) -> Result<ReasoningOutcome, ReasoningError>;
}

/// Pull receipt attachment paths out of a query. The scanning frontend
/// appends lines of the form `uploaded at: <path>`.
pub fn extract_attachment_paths(query: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re =
        RE.get_or_init(|| Regex::new(r"(?im)uploaded at:\s*(.+?)\s*$").expect("static regex"));
    re.captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?(\d+(?:\.\d{1,2})?)").expect("static regex"))
}

fn expense_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"exp_[0-9a-fA-F-]+").expect("static regex"))
}

/// Keyword-driven reasoner used by the binary. Deliberately conservative:
/// when a query does not clearly map to an operation it answers with text
/// instead of guessing.
pub struct HeuristicReasoner;

#[async_trait]
impl ReasoningService for HeuristicReasoner {
    async fn interpret(
        &self,
        query: &str,
        _operations: &[OperationDescriptor],
    ) -> Result<ReasoningOutcome, ReasoningError> {
        let lower = query.to_lowercase();

        if lower.contains("approve") || lower.contains("reject") {
            if let Some(m) = expense_id_regex().find(query) {
                return Ok(ReasoningOutcome::Operation {
                    name: "review_expense".to_string(),
                    arguments: json!({
                        "expense_id": m.as_str(),
                        "approve": lower.contains("approve"),
                        "reason": query,
                    }),
                });
            }
        }

        if lower.contains("policy") || lower.contains("limit") {
            return Ok(ReasoningOutcome::Operation {
                name: "query_policies".to_string(),
                arguments: json!({}),
            });
        }

        if lower.contains("audit") {
            return Ok(ReasoningOutcome::Operation {
                name: "list_audit_logs".to_string(),
                arguments: json!({}),
            });
        }

        if lower.contains("my expenses") || lower.contains("list expenses") {
            return Ok(ReasoningOutcome::Operation {
                name: "list_expenses".to_string(),
                arguments: json!({}),
            });
        }

        if lower.contains("submit") || lower.contains("reimburse") || lower.contains("expense") {
            if let Some(caps) = amount_regex().captures(query) {
                let amount = caps.get(1).map(|m| m.as_str()).unwrap_or("0");
                let category = if lower.contains("travel") || lower.contains("flight") {
                    "Travel"
                } else if lower.contains("lunch") || lower.contains("dinner") || lower.contains("meal")
                {
                    "Meals"
                } else if lower.contains("software") || lower.contains("license") {
                    "Software"
                } else {
                    "Other"
                };
                return Ok(ReasoningOutcome::Operation {
                    name: "create_expense".to_string(),
                    arguments: json!({
                        "amount": amount,
                        "category": category,
                        "business_justification": query,
                        "date_of_expense": Utc::now().date_naive().to_string(),
                    }),
                });
            }
        }

        Ok(ReasoningOutcome::Text(
            "I can submit expenses, look up their status, review pending requests, \
             and answer policy questions. Try: 'Submit a $42 lunch expense'."
                .to_string(),
        ))
    }
}

/// Test reasoner that replays scripted outcomes in order.
pub struct ScriptedReasoner {
    outcomes: tokio::sync::Mutex<std::collections::VecDeque<ReasoningOutcome>>,
}

impl ScriptedReasoner {
    pub fn new(outcomes: Vec<ReasoningOutcome>) -> Self {
        Self {
            outcomes: tokio::sync::Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn interpret(
        &self,
        _query: &str,
        _operations: &[OperationDescriptor],
    ) -> Result<ReasoningOutcome, ReasoningError> {
        self.outcomes
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ReasoningError::Unavailable("no scripted outcome left".to_string()))
    }
}
