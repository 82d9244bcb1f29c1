//! The closed catalog of dispatchable operations.
//!
//! Every operation a caller can invoke is listed here with its required
//! roles and parameter schema. The dispatcher refuses anything else.

use serde::Serialize;
use serde_json::{json, Value};

use crate::context::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateExpense,
    GetExpense,
    ListExpenses,
    ReviewExpense,
    EvaluateExpense,
    ProcessExpensePayment,
    ExtractReceipt,
    SendExpenseNotification,
    QueryPolicies,
    ListProviders,
    ListEmployees,
    GetEmployee,
    CreateEmployee,
    UpdateEmployee,
    DeleteEmployee,
    ListAuditLogs,
}

/// Serializable description of one operation, for discovery endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub required_roles: Vec<&'static str>,
    pub parameters: Value,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::CreateExpense,
        Operation::GetExpense,
        Operation::ListExpenses,
        Operation::ReviewExpense,
        Operation::EvaluateExpense,
        Operation::ProcessExpensePayment,
        Operation::ExtractReceipt,
        Operation::SendExpenseNotification,
        Operation::QueryPolicies,
        Operation::ListProviders,
        Operation::ListEmployees,
        Operation::GetEmployee,
        Operation::CreateEmployee,
        Operation::UpdateEmployee,
        Operation::DeleteEmployee,
        Operation::ListAuditLogs,
    ];

    pub fn parse(name: &str) -> Option<Operation> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::CreateExpense => "create_expense",
            Operation::GetExpense => "get_expense",
            Operation::ListExpenses => "list_expenses",
            Operation::ReviewExpense => "review_expense",
            Operation::EvaluateExpense => "evaluate_expense",
            Operation::ProcessExpensePayment => "process_expense_payment",
            Operation::ExtractReceipt => "extract_receipt",
            Operation::SendExpenseNotification => "send_expense_notification",
            Operation::QueryPolicies => "query_policies",
            Operation::ListProviders => "list_providers",
            Operation::ListEmployees => "list_employees",
            Operation::GetEmployee => "get_employee",
            Operation::CreateEmployee => "create_employee",
            Operation::UpdateEmployee => "update_employee",
            Operation::DeleteEmployee => "delete_employee",
            Operation::ListAuditLogs => "list_audit_logs",
        }
    }

    /// Roles allowed to invoke this operation. Admin-only operations list
    /// just `Admin`; everything else is open to any authenticated caller.
    pub fn required_roles(self) -> &'static [Role] {
        match self {
            Operation::ReviewExpense
            | Operation::EvaluateExpense
            | Operation::ProcessExpensePayment
            | Operation::ListEmployees
            | Operation::GetEmployee
            | Operation::CreateEmployee
            | Operation::UpdateEmployee
            | Operation::DeleteEmployee
            | Operation::ListAuditLogs => &[Role::Admin],
            _ => &[Role::Employee, Role::Admin],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Operation::CreateExpense => {
                "Submit an expense for reimbursement and start the automatic review"
            }
            Operation::GetExpense => "Fetch one expense by id",
            Operation::ListExpenses => "List expenses visible to the caller",
            Operation::ReviewExpense => "Approve or reject an expense awaiting manual review",
            Operation::EvaluateExpense => {
                "Ask the review provider what policy would recommend for an expense"
            }
            Operation::ProcessExpensePayment => "Credit an approved expense to the ledger",
            Operation::ExtractReceipt => "Extract structured fields from a receipt file",
            Operation::SendExpenseNotification => "Send an expense decision notification",
            Operation::QueryPolicies => "Look up the current reimbursement policy",
            Operation::ListProviders => "List registered capability providers",
            Operation::ListEmployees => "List all employee records",
            Operation::GetEmployee => "Fetch one employee record",
            Operation::CreateEmployee => "Create an employee and their ledger account",
            Operation::UpdateEmployee => "Update an employee record",
            Operation::DeleteEmployee => "Delete an employee record",
            Operation::ListAuditLogs => "List the audit trail",
        }
    }

    pub fn parameters(self) -> Value {
        match self {
            Operation::CreateExpense => json!({
                "type": "object",
                "properties": {
                    "employee_id": { "type": "string" },
                    "amount": {},
                    "category": { "type": "string" },
                    "business_justification": { "type": "string" },
                    "date_of_expense": { "type": "string", "format": "date" },
                    "receipt_path": { "type": "string" }
                },
                "required": ["amount", "category", "business_justification", "date_of_expense"]
            }),
            Operation::GetExpense => json!({
                "type": "object",
                "properties": { "expense_id": { "type": "string" } },
                "required": ["expense_id"]
            }),
            Operation::ListExpenses => json!({ "type": "object", "properties": {} }),
            Operation::ReviewExpense => json!({
                "type": "object",
                "properties": {
                    "expense_id": { "type": "string" },
                    "approve": { "type": "boolean" },
                    "reason": { "type": "string" }
                },
                "required": ["expense_id", "approve"]
            }),
            Operation::EvaluateExpense => json!({
                "type": "object",
                "properties": { "expense_id": { "type": "string" } },
                "required": ["expense_id"]
            }),
            Operation::ProcessExpensePayment => json!({
                "type": "object",
                "properties": { "expense_id": { "type": "string" } },
                "required": ["expense_id"]
            }),
            Operation::ExtractReceipt => json!({
                "type": "object",
                "properties": { "receipt_path": { "type": "string" } },
                "required": ["receipt_path"]
            }),
            Operation::SendExpenseNotification => json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string" },
                    "expense_id": { "type": "string" },
                    "status": { "type": "string" },
                    "amount": { "type": "string" },
                    "category": { "type": "string" },
                    "decision_reason": { "type": "string" }
                },
                "required": ["to", "expense_id", "status"]
            }),
            Operation::QueryPolicies => json!({ "type": "object", "properties": {} }),
            Operation::ListProviders => json!({ "type": "object", "properties": {} }),
            Operation::ListEmployees => json!({ "type": "object", "properties": {} }),
            Operation::GetEmployee => json!({
                "type": "object",
                "properties": { "employee_id": { "type": "string" } },
                "required": ["employee_id"]
            }),
            Operation::CreateEmployee => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "email": { "type": "string" },
                    "department": { "type": "string" },
                    "role": { "type": "string", "enum": ["employee", "admin"] }
                },
                "required": ["name", "email"]
            }),
            Operation::UpdateEmployee => json!({
                "type": "object",
                "properties": {
                    "employee_id": { "type": "string" },
                    "name": { "type": "string" },
                    "email": { "type": "string" },
                    "department": { "type": "string" },
                    "role": { "type": "string", "enum": ["employee", "admin"] }
                },
                "required": ["employee_id"]
            }),
            Operation::DeleteEmployee => json!({
                "type": "object",
                "properties": { "employee_id": { "type": "string" } },
                "required": ["employee_id"]
            }),
            Operation::ListAuditLogs => json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn descriptor(self) -> OperationDescriptor {
        OperationDescriptor {
            name: self.name(),
            description: self.description(),
            required_roles: self.required_roles().iter().map(|r| r.as_str()).collect(),
            parameters: self.parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_operation() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.name()), Some(op));
        }
        assert_eq!(Operation::parse("drop_tables"), None);
    }

    #[test]
    fn admin_only_operations_are_gated() {
        assert_eq!(Operation::ReviewExpense.required_roles(), &[Role::Admin]);
        assert_eq!(Operation::ListAuditLogs.required_roles(), &[Role::Admin]);
        assert!(Operation::CreateExpense
            .required_roles()
            .contains(&Role::Employee));
    }

    #[test]
    fn descriptors_serialize() {
        let descriptor = Operation::ReviewExpense.descriptor();
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["name"], "review_expense");
        assert_eq!(value["required_roles"][0], "admin");
    }
}
