//! Domain records: expenses, ledger accounts, employees, policies.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review state of an expense.
///
/// `Approved` and `Rejected` are terminal; `AdminReview` is resolved only by
/// a human decision. The automatic pipeline never touches a record that has
/// left `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    AdminReview,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExpenseStatus::Approved | ExpenseStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::AdminReview => "admin_review",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made a decision or emitted an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    #[serde(rename = "AI")]
    Ai,
    Human,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Actor::Ai => "AI",
            Actor::Human => "Human",
        })
    }
}

/// A submitted expense reimbursement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub employee_id: String,
    pub amount: Decimal,
    pub category: String,
    pub business_justification: String,
    pub date_of_expense: NaiveDate,
    /// Reference to the scanned receipt, if one was attached.
    pub receipt_path: Option<String>,
    pub status: ExpenseStatus,
    pub decision_actor: Option<Actor>,
    pub decision_reason: String,
    /// Set when the ledger credit for this expense has been applied.
    /// This is the durable exactly-once marker for payment.
    pub reimbursed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Build a freshly submitted expense in `Pending` with no decision.
    pub fn new(
        employee_id: impl Into<String>,
        amount: Decimal,
        category: impl Into<String>,
        business_justification: impl Into<String>,
        date_of_expense: NaiveDate,
        receipt_path: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("exp_{}", Uuid::new_v4()),
            employee_id: employee_id.into(),
            amount: round_cents(amount),
            category: category.into(),
            business_justification: business_justification.into(),
            date_of_expense,
            receipt_path,
            status: ExpenseStatus::Pending,
            decision_actor: None,
            decision_reason: String::new(),
            reimbursed_at: None,
            submitted_at: now,
            updated_at: now,
        }
    }
}

/// A reimbursement ledger account. Balance only ever increases, by
/// crediting approved expenses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: String,
    pub employee_id: String,
    pub holder_name: String,
    pub email: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl LedgerAccount {
    pub fn new(
        employee_id: impl Into<String>,
        holder_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("acct_{}", Uuid::new_v4()),
            employee_id: employee_id.into(),
            holder_name: holder_name.into(),
            email: email.into(),
            balance: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}

/// An employee record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: crate::context::Role,
    pub account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        department: impl Into<String>,
        role: crate::context::Role,
    ) -> Self {
        Self {
            id: format!("emp_{}", Uuid::new_v4()),
            name: name.into(),
            email: email.into(),
            department: department.into(),
            role,
            account_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Structured fields extracted from a scanned receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    pub vendor: String,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub category: String,
    pub description: String,
}

/// A reimbursement policy document. Policy is data looked up from the
/// store; the approval threshold is never hardcoded in the rules engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReimbursementPolicy {
    pub id: String,
    /// Expenses at or under this amount are eligible for auto-approval.
    pub auto_approve_limit: Decimal,
    pub description: String,
}

impl ReimbursementPolicy {
    /// Reference policy seeded when the store has none.
    pub fn default_policy() -> Self {
        Self {
            id: "policy_default".to_string(),
            auto_approve_limit: dec!(500.00),
            description: "Auto-approve first same-day submission up to the limit \
                          when a valid receipt is attached; larger or repeated \
                          submissions go to manual review."
                .to_string(),
        }
    }
}

/// Round a currency amount to whole cents.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// Parse a currency amount from a JSON value that may be a number or a
/// string (reasoning-service callers send both).
pub fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    }
}
