//! Ledger credits for approved expenses.
//!
//! Crediting is serialized per account and keyed on the expense's
//! `reimbursed_at` marker, so concurrent approval paths apply each credit
//! exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use crate::audit::AuditTrail;
use crate::error::PipelineError;
use crate::model::{round_cents, ExpenseStatus};
use crate::store::Storage;

/// Result of a credit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited {
        account_id: String,
        previous_balance: Decimal,
        new_balance: Decimal,
    },
    /// The expense already carried a `reimbursed_at` marker.
    AlreadyCredited,
}

pub struct LedgerService {
    store: Arc<dyn Storage>,
    audit: AuditTrail,
    /// One lock per account id. Credits to the same account never interleave.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Storage>, audit: AuditTrail) -> Self {
        Self {
            store,
            audit,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Credit an approved expense to its employee's ledger account.
    ///
    /// Re-reads the expense inside the per-account critical section and
    /// returns `AlreadyCredited` if the marker is present, so retries and
    /// racing callers cannot double-pay.
    pub async fn credit_expense(&self, expense_id: &str) -> Result<CreditOutcome, PipelineError> {
        let expense = self
            .store
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: "missing".to_string(),
            })?;

        if expense.status != ExpenseStatus::Approved {
            return Err(PipelineError::NotApproved {
                expense_id: expense_id.to_string(),
                status: expense.status.to_string(),
            });
        }
        if expense.amount <= Decimal::ZERO {
            return Err(PipelineError::InvalidAmount(expense.amount));
        }

        let account = self
            .store
            .get_account_by_employee(&expense.employee_id)
            .await?
            .ok_or_else(|| PipelineError::MissingAccount {
                employee_id: expense.employee_id.clone(),
            })?;

        let lock = self.account_lock(&account.id).await;
        let _guard = lock.lock().await;

        // Re-read both documents under the lock. Another task may have
        // completed the credit while we waited.
        let mut expense = self
            .store
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidState {
                expense_id: expense_id.to_string(),
                status: "missing".to_string(),
            })?;
        if expense.reimbursed_at.is_some() {
            return Ok(CreditOutcome::AlreadyCredited);
        }

        let mut account = self
            .store
            .get_account(&account.id)
            .await?
            .ok_or_else(|| PipelineError::MissingAccount {
                employee_id: expense.employee_id.clone(),
            })?;

        let previous_balance = account.balance;
        account.balance = round_cents(account.balance + expense.amount);
        account.updated_at = Utc::now();
        self.store.update_account(&account).await?;

        expense.reimbursed_at = Some(Utc::now());
        expense.updated_at = Utc::now();
        self.store.update_expense(&expense).await?;

        info!(
            expense_id = %expense.id,
            account_id = %account.id,
            amount = %expense.amount,
            new_balance = %account.balance,
            "Ledger credit applied"
        );
        self.audit
            .payment(
                &expense.id,
                &expense.employee_id,
                &account.id,
                expense.amount,
                previous_balance,
                account.balance,
            )
            .await;

        Ok(CreditOutcome::Credited {
            account_id: account.id,
            previous_balance,
            new_balance: account.balance,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Actor, Expense, LedgerAccount};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn approved_expense(employee_id: &str, amount: Decimal) -> Expense {
        let mut exp = Expense::new(
            employee_id,
            amount,
            "Travel",
            "Client visit",
            NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            Some("receipts/r1.json".to_string()),
        );
        exp.status = ExpenseStatus::Approved;
        exp.decision_actor = Some(Actor::Ai);
        exp.decision_reason = "Receipt valid, within policy limits".to_string();
        exp
    }

    async fn seeded(
        amount: Decimal,
    ) -> (Arc<MemoryStore>, LedgerService, Expense, LedgerAccount) {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditTrail::new(store.clone());
        let ledger = LedgerService::new(store.clone(), audit);

        let account = LedgerAccount::new("emp_1", "Alice", "alice@corp.test");
        store.create_account(&account).await.unwrap();
        let expense = approved_expense("emp_1", amount);
        store.create_expense(&expense).await.unwrap();
        (store, ledger, expense, account)
    }

    #[tokio::test]
    async fn credit_updates_balance_and_marks_expense() {
        let (store, ledger, expense, account) = seeded(dec!(120.00)).await;

        let outcome = ledger.credit_expense(&expense.id).await.unwrap();
        assert_eq!(
            outcome,
            CreditOutcome::Credited {
                account_id: account.id.clone(),
                previous_balance: dec!(0.00),
                new_balance: dec!(120.00),
            }
        );

        let stored = store.get_expense(&expense.id).await.unwrap().unwrap();
        assert!(stored.reimbursed_at.is_some());

        let acct = store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(acct.balance, dec!(120.00));
    }

    #[tokio::test]
    async fn second_credit_is_a_noop() {
        let (store, ledger, expense, account) = seeded(dec!(75.50)).await;

        ledger.credit_expense(&expense.id).await.unwrap();
        let again = ledger.credit_expense(&expense.id).await.unwrap();
        assert_eq!(again, CreditOutcome::AlreadyCredited);

        let acct = store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(acct.balance, dec!(75.50));
    }

    #[tokio::test]
    async fn concurrent_credits_apply_once() {
        let (store, _, expense, account) = seeded(dec!(33.00)).await;
        let audit = AuditTrail::new(store.clone());
        let ledger = Arc::new(LedgerService::new(store.clone(), audit));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let id = expense.id.clone();
            handles.push(tokio::spawn(async move { ledger.credit_expense(&id).await }));
        }
        let mut credited = 0;
        for h in handles {
            if let Ok(Ok(CreditOutcome::Credited { .. })) = h.await {
                credited += 1;
            }
        }
        assert_eq!(credited, 1);

        let acct = store.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(acct.balance, dec!(33.00));
    }

    #[tokio::test]
    async fn non_approved_expense_is_rejected() {
        let (store, ledger, _, _) = seeded(dec!(10.00)).await;

        let mut pending = approved_expense("emp_1", dec!(10.00));
        pending.status = ExpenseStatus::Pending;
        store.create_expense(&pending).await.unwrap();

        let err = ledger.credit_expense(&pending.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotApproved { .. }));
    }

    #[tokio::test]
    async fn missing_account_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditTrail::new(store.clone());
        let ledger = LedgerService::new(store.clone(), audit);

        let expense = approved_expense("emp_orphan", dec!(10.00));
        store.create_expense(&expense).await.unwrap();

        let err = ledger.credit_expense(&expense.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingAccount { .. }));
    }
}
