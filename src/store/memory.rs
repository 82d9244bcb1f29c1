//! In-memory document store.
//!
//! Serves as the default backend for the binary and as the test double.
//! Each collection sits behind its own `RwLock`; every write replaces a
//! whole document, so readers never observe a partially updated record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::audit::AuditEntry;
use crate::error::StorageError;
use crate::model::{Employee, Expense, ExpenseStatus, LedgerAccount, ReimbursementPolicy};
use crate::store::traits::Storage;

#[derive(Default)]
pub struct MemoryStore {
    expenses: RwLock<HashMap<String, Expense>>,
    accounts: RwLock<HashMap<String, LedgerAccount>>,
    employees: RwLock<HashMap<String, Employee>>,
    audit: RwLock<Vec<AuditEntry>>,
    policy: RwLock<Option<ReimbursementPolicy>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity: &str, id: &str) -> StorageError {
    StorageError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_expense(&self, expense: &Expense) -> Result<String, StorageError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.clone(), expense.clone());
        Ok(expense.id.clone())
    }

    async fn get_expense(&self, id: &str) -> Result<Option<Expense>, StorageError> {
        Ok(self.expenses.read().await.get(id).cloned())
    }

    async fn update_expense(&self, expense: &Expense) -> Result<(), StorageError> {
        let mut expenses = self.expenses.write().await;
        if !expenses.contains_key(&expense.id) {
            return Err(not_found("expense", &expense.id));
        }
        expenses.insert(expense.id.clone(), expense.clone());
        Ok(())
    }

    async fn update_expense_if(
        &self,
        expense: &Expense,
        expected: ExpenseStatus,
    ) -> Result<bool, StorageError> {
        let mut expenses = self.expenses.write().await;
        let current = expenses
            .get(&expense.id)
            .ok_or_else(|| not_found("expense", &expense.id))?;
        if current.status != expected {
            return Ok(false);
        }
        expenses.insert(expense.id.clone(), expense.clone());
        Ok(true)
    }

    async fn delete_expense(&self, id: &str) -> Result<(), StorageError> {
        self.expenses
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("expense", id))
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, StorageError> {
        let mut all: Vec<Expense> = self.expenses.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(all)
    }

    async fn count_expenses_on(
        &self,
        employee_id: &str,
        day: NaiveDate,
        exclude_id: &str,
    ) -> Result<usize, StorageError> {
        Ok(self
            .expenses
            .read()
            .await
            .values()
            .filter(|e| {
                e.employee_id == employee_id
                    && e.submitted_at.date_naive() == day
                    && e.id != exclude_id
            })
            .count())
    }

    async fn create_account(&self, account: &LedgerAccount) -> Result<String, StorageError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account.clone());
        Ok(account.id.clone())
    }

    async fn get_account(&self, id: &str) -> Result<Option<LedgerAccount>, StorageError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn get_account_by_employee(
        &self,
        employee_id: &str,
    ) -> Result<Option<LedgerAccount>, StorageError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.employee_id == employee_id)
            .cloned())
    }

    async fn update_account(&self, account: &LedgerAccount) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.id) {
            return Err(not_found("account", &account.id));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn create_employee(&self, employee: &Employee) -> Result<String, StorageError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.clone(), employee.clone());
        Ok(employee.id.clone())
    }

    async fn get_employee(&self, id: &str) -> Result<Option<Employee>, StorageError> {
        Ok(self.employees.read().await.get(id).cloned())
    }

    async fn update_employee(&self, employee: &Employee) -> Result<(), StorageError> {
        let mut employees = self.employees.write().await;
        if !employees.contains_key(&employee.id) {
            return Err(not_found("employee", &employee.id));
        }
        employees.insert(employee.id.clone(), employee.clone());
        Ok(())
    }

    async fn delete_employee(&self, id: &str) -> Result<(), StorageError> {
        self.employees
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("employee", id))
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, StorageError> {
        let mut all: Vec<Employee> = self.employees.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self.audit.read().await.clone())
    }

    async fn get_policy(&self) -> Result<Option<ReimbursementPolicy>, StorageError> {
        Ok(self.policy.read().await.clone())
    }

    async fn put_policy(&self, policy: &ReimbursementPolicy) -> Result<(), StorageError> {
        *self.policy.write().await = Some(policy.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use rust_decimal_macros::dec;

    fn sample_expense(employee_id: &str) -> Expense {
        Expense::new(
            employee_id,
            dec!(25.00),
            "Meals",
            "Team lunch",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            None,
        )
    }

    #[tokio::test]
    async fn expense_round_trip() {
        let store = MemoryStore::new();
        let exp = sample_expense("emp_a");
        let id = store.create_expense(&exp).await.unwrap();

        let loaded = store.get_expense(&id).await.unwrap().unwrap();
        assert_eq!(loaded.employee_id, "emp_a");
        assert_eq!(loaded.amount, dec!(25.00));

        assert!(store.get_expense("exp_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_expense_fails() {
        let store = MemoryStore::new();
        let exp = sample_expense("emp_a");
        let err = store.update_expense(&exp).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn conditional_update_respects_current_status() {
        let store = MemoryStore::new();
        let mut exp = sample_expense("emp_a");
        store.create_expense(&exp).await.unwrap();

        exp.status = ExpenseStatus::Approved;
        assert!(store
            .update_expense_if(&exp, ExpenseStatus::Pending)
            .await
            .unwrap());

        // Second writer with a stale view loses.
        exp.status = ExpenseStatus::Rejected;
        assert!(!store
            .update_expense_if(&exp, ExpenseStatus::Pending)
            .await
            .unwrap());
        let stored = store.get_expense(&exp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpenseStatus::Approved);
    }

    #[tokio::test]
    async fn same_day_count_excludes_given_id() {
        let store = MemoryStore::new();
        let first = sample_expense("emp_a");
        let second = sample_expense("emp_a");
        let other = sample_expense("emp_b");
        store.create_expense(&first).await.unwrap();
        store.create_expense(&second).await.unwrap();
        store.create_expense(&other).await.unwrap();

        let today = first.submitted_at.date_naive();
        let count = store
            .count_expenses_on("emp_a", today, &second.id)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn account_lookup_by_employee() {
        let store = MemoryStore::new();
        let account = LedgerAccount::new("emp_a", "Alice", "alice@corp.test");
        store.create_account(&account).await.unwrap();

        let found = store.get_account_by_employee("emp_a").await.unwrap();
        assert_eq!(found.unwrap().id, account.id);
        assert!(store
            .get_account_by_employee("emp_zzz")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn employees_listed_in_creation_order() {
        let store = MemoryStore::new();
        let a = Employee::new("Alice", "alice@corp.test", "Eng", Role::Employee);
        let b = Employee::new("Bob", "bob@corp.test", "Sales", Role::Admin);
        store.create_employee(&a).await.unwrap();
        store.create_employee(&b).await.unwrap();

        let all = store.list_employees().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Alice");
    }
}
