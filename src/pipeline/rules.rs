//! Reimbursement policy rules.
//!
//! Pure decision logic over facts the pipeline has already gathered: the
//! document check verdict, the amount, and how many expenses the employee
//! already submitted today. Checks run in a fixed order; the first rule
//! that fires decides the outcome:
//!
//! 1. invalid or missing receipt rejects outright,
//! 2. amounts over the auto-approval limit go to manual review,
//! 3. a repeated same-day submission goes to manual review,
//! 4. otherwise the expense is auto-approved.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::warn;

use crate::model::ExpenseStatus;
use crate::store::Storage;

/// Verdict of checking the attached receipt document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentCheck {
    /// Receipt was present and its contents were extracted.
    Valid,
    /// No receipt was attached to the submission.
    Missing,
    /// A receipt was attached but could not be read.
    Unreadable(String),
}

/// Outcome of a rule evaluation. The status is one of `Approved`,
/// `Rejected`, or `AdminReview`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecision {
    pub status: ExpenseStatus,
    pub reason: String,
}

impl RuleDecision {
    fn approved(reason: impl Into<String>) -> Self {
        Self {
            status: ExpenseStatus::Approved,
            reason: reason.into(),
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: ExpenseStatus::Rejected,
            reason: reason.into(),
        }
    }

    fn admin_review(reason: impl Into<String>) -> Self {
        Self {
            status: ExpenseStatus::AdminReview,
            reason: reason.into(),
        }
    }
}

/// Applies reimbursement policy. The auto-approval threshold is looked up
/// from the policy document in the store on every evaluation, so policy
/// changes take effect without a restart.
pub struct PolicyEngine {
    store: Arc<dyn Storage>,
    fallback_limit: Decimal,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn Storage>, fallback_limit: Decimal) -> Self {
        Self {
            store,
            fallback_limit,
        }
    }

    /// Current auto-approval limit. Falls back to the configured default
    /// when no policy document is stored or the lookup fails.
    pub async fn auto_approve_limit(&self) -> Decimal {
        match self.store.get_policy().await {
            Ok(Some(policy)) => policy.auto_approve_limit,
            Ok(None) => self.fallback_limit,
            Err(e) => {
                warn!(error = %e, "Policy lookup failed, using fallback limit");
                self.fallback_limit
            }
        }
    }

    /// Evaluate the rules for one expense.
    ///
    /// `prior_same_day` counts the employee's other expenses submitted the
    /// same day, excluding this one.
    pub fn evaluate(
        &self,
        amount: Decimal,
        document: &DocumentCheck,
        prior_same_day: usize,
        limit: Decimal,
    ) -> RuleDecision {
        match document {
            DocumentCheck::Missing => {
                return RuleDecision::rejected("No receipt document was attached");
            }
            DocumentCheck::Unreadable(detail) => {
                return RuleDecision::rejected(format!("Receipt could not be read: {detail}"));
            }
            DocumentCheck::Valid => {}
        }

        if amount > limit {
            return RuleDecision::admin_review(format!(
                "Amount ${amount} exceeds the auto-approval limit of ${limit}"
            ));
        }

        if prior_same_day > 0 {
            return RuleDecision::admin_review(
                "Repeated submission on the same day requires manual review",
            );
        }

        RuleDecision::approved("Receipt valid, within policy limits")
    }
}
