//! Backend-agnostic `Storage` trait — single async interface for all
//! persistence.
//!
//! The orchestration core treats storage as an external document store with
//! keyed collections for expenses, ledger accounts, employees, audit
//! entries, and policy documents. Anything beyond get/create/update/delete
//! and a few scoped queries belongs to the backend.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::audit::AuditEntry;
use crate::error::StorageError;
use crate::model::{Employee, Expense, ExpenseStatus, LedgerAccount, ReimbursementPolicy};

#[async_trait]
pub trait Storage: Send + Sync {
    // ── Expenses ────────────────────────────────────────────────────

    /// Insert a new expense. Returns its id.
    async fn create_expense(&self, expense: &Expense) -> Result<String, StorageError>;

    async fn get_expense(&self, id: &str) -> Result<Option<Expense>, StorageError>;

    /// Replace the stored expense document in one write. Status, actor and
    /// reason always travel together; readers never see a partial decision.
    async fn update_expense(&self, expense: &Expense) -> Result<(), StorageError>;

    /// Replace the stored expense only if its current status still equals
    /// `expected`. Returns `false` when another writer decided the expense
    /// first. Decision writes go through this so two concurrent reviews
    /// cannot both land.
    async fn update_expense_if(
        &self,
        expense: &Expense,
        expected: ExpenseStatus,
    ) -> Result<bool, StorageError>;

    async fn delete_expense(&self, id: &str) -> Result<(), StorageError>;

    async fn list_expenses(&self) -> Result<Vec<Expense>, StorageError>;

    /// Count expenses submitted by `employee_id` on `day`, excluding
    /// `exclude_id`. Used for the first-submission-of-the-day rule.
    async fn count_expenses_on(
        &self,
        employee_id: &str,
        day: NaiveDate,
        exclude_id: &str,
    ) -> Result<usize, StorageError>;

    // ── Ledger accounts ─────────────────────────────────────────────

    async fn create_account(&self, account: &LedgerAccount) -> Result<String, StorageError>;

    async fn get_account(&self, id: &str) -> Result<Option<LedgerAccount>, StorageError>;

    async fn get_account_by_employee(
        &self,
        employee_id: &str,
    ) -> Result<Option<LedgerAccount>, StorageError>;

    async fn update_account(&self, account: &LedgerAccount) -> Result<(), StorageError>;

    // ── Employees ───────────────────────────────────────────────────

    async fn create_employee(&self, employee: &Employee) -> Result<String, StorageError>;

    async fn get_employee(&self, id: &str) -> Result<Option<Employee>, StorageError>;

    async fn update_employee(&self, employee: &Employee) -> Result<(), StorageError>;

    async fn delete_employee(&self, id: &str) -> Result<(), StorageError>;

    async fn list_employees(&self) -> Result<Vec<Employee>, StorageError>;

    // ── Audit trail ─────────────────────────────────────────────────

    /// Append an audit entry. Entries are never updated or removed.
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    async fn list_audit(&self) -> Result<Vec<AuditEntry>, StorageError>;

    // ── Policy documents ────────────────────────────────────────────

    async fn get_policy(&self) -> Result<Option<ReimbursementPolicy>, StorageError>;

    async fn put_policy(&self, policy: &ReimbursementPolicy) -> Result<(), StorageError>;
}
