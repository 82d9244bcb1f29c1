//! Asynchronous expense review pipeline.
//!
//! Drives a submitted expense from `Pending` to a decision: run the
//! document check through the extraction provider, apply policy rules,
//! persist the decision in a single write, credit the ledger on approval,
//! and notify the employee on a detached task. Manual decisions for
//! expenses parked in `AdminReview` come through `human_decision`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::audit::AuditTrail;
use crate::config::OrchestratorConfig;
use crate::context::{CallerContext, Role};
use crate::error::PipelineError;
use crate::ledger::LedgerService;
use crate::model::{Actor, Expense, ExpenseStatus};
use crate::pipeline::rules::{DocumentCheck, PolicyEngine};
use crate::protocol::{deliver, Envelope, EnvelopeKind, Provider};
use crate::providers::notification::expense_subject;
use crate::store::Storage;

pub const ORCHESTRATOR_ID: &str = "orchestrator";

pub struct ReviewPipeline {
    store: Arc<dyn Storage>,
    audit: AuditTrail,
    ledger: Arc<LedgerService>,
    engine: Arc<PolicyEngine>,
    extraction: Arc<dyn Provider>,
    notification: Arc<dyn Provider>,
    config: OrchestratorConfig,
}

impl ReviewPipeline {
    pub fn new(
        store: Arc<dyn Storage>,
        audit: AuditTrail,
        ledger: Arc<LedgerService>,
        engine: Arc<PolicyEngine>,
        extraction: Arc<dyn Provider>,
        notification: Arc<dyn Provider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            audit,
            ledger,
            engine,
            extraction,
            notification,
            config,
        }
    }

    fn system_ctx() -> CallerContext {
        CallerContext::new(ORCHESTRATOR_ID, Role::Admin)
    }

    /// Kick off the automatic review on its own task.
    pub fn schedule(self: &Arc<Self>, expense_id: String) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run(&expense_id).await {
                warn!(expense_id, error = %e, "Automatic review did not complete");
            }
        });
    }

    /// Run the automatic review for one expense.
    ///
    /// Does nothing unless the expense is still `Pending`; the pipeline
    /// never revisits a record that has already moved on.
    pub async fn run(&self, expense_id: &str) -> Result<(), PipelineError> {
        let expense = self
            .store
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: "missing".to_string(),
            })?;

        if expense.status != ExpenseStatus::Pending {
            info!(
                expense_id,
                status = %expense.status,
                "Skipping automatic review, expense is no longer pending"
            );
            return Ok(());
        }

        let document = self.check_document(&expense).await?;

        let prior = self
            .store
            .count_expenses_on(
                &expense.employee_id,
                expense.submitted_at.date_naive(),
                &expense.id,
            )
            .await?;

        let limit = self.engine.auto_approve_limit().await;
        let decision = self.engine.evaluate(expense.amount, &document, prior, limit);

        let mut updated = expense.clone();
        updated.status = decision.status;
        updated.decision_actor = Some(Actor::Ai);
        updated.decision_reason = decision.reason.clone();
        updated.updated_at = Utc::now();
        // Conditional write: if another task decided this expense while we
        // were evaluating, drop our decision on the floor.
        if !self
            .store
            .update_expense_if(&updated, ExpenseStatus::Pending)
            .await?
        {
            info!(
                expense_id = %updated.id,
                "Expense was decided concurrently, discarding duplicate review"
            );
            return Ok(());
        }

        info!(
            expense_id = %updated.id,
            old_status = %expense.status,
            new_status = %updated.status,
            reason = %decision.reason,
            "Automatic review decision"
        );
        self.audit
            .status_change(
                Actor::Ai,
                &updated.id,
                expense.status.as_str(),
                updated.status.as_str(),
                &decision.reason,
            )
            .await;

        if updated.status == ExpenseStatus::Approved {
            if let Err(e) = self.ledger.credit_expense(&updated.id).await {
                error!(expense_id = %updated.id, error = %e, "Ledger credit failed");
                // Leave the failure visible on the record, not just in the
                // logs of a detached task.
                updated.decision_reason =
                    format!("{}; ledger credit failed: {e}", decision.reason);
                updated.updated_at = Utc::now();
                self.store.update_expense(&updated).await?;
                return Err(e);
            }
        }

        self.notify_decision(updated);
        Ok(())
    }

    /// Run the document check. A receipt that cannot be understood yields
    /// a negative verdict for the rules; an extraction provider fault
    /// aborts the review, leaving the expense `Pending` with the fault
    /// recorded on it.
    async fn check_document(&self, expense: &Expense) -> Result<DocumentCheck, PipelineError> {
        let Some(receipt_path) = expense.receipt_path.as_deref() else {
            return Ok(DocumentCheck::Missing);
        };

        let request = Envelope::request(
            ORCHESTRATOR_ID,
            self.extraction.id(),
            "extract_receipt_info",
            json!({ "receipt_path": receipt_path }),
        );
        let reply = deliver(self.extraction.as_ref(), &request, &Self::system_ctx()).await;

        if reply.kind == EnvelopeKind::Error {
            let detail = reply.payload["error"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            self.audit
                .provider_message(
                    ORCHESTRATOR_ID,
                    &self.extraction.id(),
                    "extract_receipt_info",
                    false,
                    Some(&detail),
                )
                .await;

            let mut parked = expense.clone();
            parked.decision_reason = format!("Receipt extraction unavailable: {detail}");
            parked.updated_at = Utc::now();
            self.store
                .update_expense_if(&parked, ExpenseStatus::Pending)
                .await?;
            return Err(PipelineError::Extraction(detail));
        }

        self.audit
            .provider_message(
                ORCHESTRATOR_ID,
                &self.extraction.id(),
                "extract_receipt_info",
                true,
                None,
            )
            .await;

        if reply.payload["success"] == json!(true) {
            Ok(DocumentCheck::Valid)
        } else {
            let detail = reply.payload["error"]
                .as_str()
                .unwrap_or("receipt could not be processed")
                .to_string();
            Ok(DocumentCheck::Unreadable(detail))
        }
    }

    /// Apply a human decision to an expense parked in `AdminReview`.
    pub async fn human_decision(
        &self,
        expense_id: &str,
        approve: bool,
        reason: &str,
    ) -> Result<Expense, PipelineError> {
        let expense = self
            .store
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: "missing".to_string(),
            })?;

        if expense.status != ExpenseStatus::AdminReview {
            return Err(PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: expense.status.to_string(),
            });
        }

        let mut updated = expense.clone();
        updated.status = if approve {
            ExpenseStatus::Approved
        } else {
            ExpenseStatus::Rejected
        };
        updated.decision_actor = Some(Actor::Human);
        updated.decision_reason = if reason.trim().is_empty() {
            "Manual review decision".to_string()
        } else {
            reason.trim().to_string()
        };
        updated.updated_at = Utc::now();
        if !self
            .store
            .update_expense_if(&updated, ExpenseStatus::AdminReview)
            .await?
        {
            let current = self
                .store
                .get_expense(expense_id)
                .await?
                .map(|e| e.status.to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: current,
            });
        }

        self.audit
            .status_change(
                Actor::Human,
                &updated.id,
                expense.status.as_str(),
                updated.status.as_str(),
                &updated.decision_reason,
            )
            .await;

        if updated.status == ExpenseStatus::Approved {
            self.ledger.credit_expense(&updated.id).await?;
        }

        self.notify_decision(updated.clone());
        Ok(updated)
    }

    /// Poll until the expense leaves `Pending` or the wait ceiling passes.
    /// Always returns the latest observed state.
    pub async fn wait_for_decision(&self, expense_id: &str) -> Result<Expense, PipelineError> {
        let deadline = Instant::now() + self.config.poll_ceiling;
        loop {
            let expense = self
                .store
                .get_expense(expense_id)
                .await?
                .ok_or_else(|| PipelineError::InvalidState {
                    expense_id: expense_id.to_string(),
                    status: "missing".to_string(),
                })?;

            if expense.status != ExpenseStatus::Pending || Instant::now() >= deadline {
                return Ok(expense);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Fire-and-forget decision notification. Failures are audited and
    /// logged, never propagated back into the review flow.
    fn notify_decision(&self, expense: Expense) {
        let store = self.store.clone();
        let audit = self.audit.clone();
        let notification = self.notification.clone();

        tokio::spawn(async move {
            let email = match store.get_employee(&expense.employee_id).await {
                Ok(Some(employee)) => Some(employee.email),
                _ => match store.get_account_by_employee(&expense.employee_id).await {
                    Ok(Some(account)) => Some(account.email),
                    _ => None,
                },
            };
            let subject = expense_subject(&expense.id, expense.status.as_str());
            let Some(email) = email else {
                warn!(
                    expense_id = %expense.id,
                    employee_id = %expense.employee_id,
                    "No email on file, decision notification not sent"
                );
                // The skipped send still lands on the audit trail.
                audit
                    .notification(&expense.employee_id, &subject, &expense.id, false)
                    .await;
                return;
            };

            let request = Envelope::request(
                ORCHESTRATOR_ID,
                notification.id(),
                "send_expense_notification",
                json!({
                    "to": email,
                    "expense_id": expense.id,
                    "status": expense.status.as_str(),
                    "amount": expense.amount.to_string(),
                    "category": expense.category,
                    "decision_reason": expense.decision_reason,
                }),
            );
            let reply = deliver(notification.as_ref(), &request, &Self::system_ctx()).await;

            let success = reply.kind == EnvelopeKind::Response;
            let subject = reply.payload["subject"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(subject);
            if !success {
                warn!(
                    expense_id = %expense.id,
                    error = %reply.payload["error"],
                    "Decision notification failed"
                );
            }
            audit
                .provider_message(
                    ORCHESTRATOR_ID,
                    &notification.id(),
                    "send_expense_notification",
                    success,
                    reply.payload["error"].as_str(),
                )
                .await;
            audit.notification(&email, &subject, &expense.id, success).await;
        });
    }
}
