//! Operation dispatcher.
//!
//! Single entry point for everything a caller can do. Resolves the
//! operation from the catalog, applies the role gate, runs the handler,
//! and always returns a JSON object with a `success` flag. Faults never
//! escape `invoke`; they come back as `success: false` with an error
//! message.

pub mod catalog;
pub mod rbac;

pub use catalog::{Operation, OperationDescriptor};

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::audit::AuditTrail;
use crate::context::CallerContext;
use crate::error::{AuthError, Error, ProtocolError, StorageError};
use crate::ledger::{CreditOutcome, LedgerService};
use crate::model::{parse_amount, Employee, Expense, LedgerAccount, ReimbursementPolicy};
use crate::pipeline::{ReviewPipeline, ORCHESTRATOR_ID};
use crate::protocol::{deliver, Envelope, EnvelopeKind, Provider, ProviderRegistry};
use crate::reasoning::{extract_attachment_paths, ReasoningOutcome, ReasoningService};
use crate::store::Storage;

pub struct Dispatcher {
    store: Arc<dyn Storage>,
    audit: AuditTrail,
    ledger: Arc<LedgerService>,
    pipeline: Arc<ReviewPipeline>,
    registry: Arc<ProviderRegistry>,
    extraction: Arc<dyn Provider>,
    notification: Arc<dyn Provider>,
    review: Arc<dyn Provider>,
    reasoner: Arc<dyn ReasoningService>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Storage>,
        audit: AuditTrail,
        ledger: Arc<LedgerService>,
        pipeline: Arc<ReviewPipeline>,
        registry: Arc<ProviderRegistry>,
        extraction: Arc<dyn Provider>,
        notification: Arc<dyn Provider>,
        review: Arc<dyn Provider>,
        reasoner: Arc<dyn ReasoningService>,
    ) -> Self {
        Self {
            store,
            audit,
            ledger,
            pipeline,
            registry,
            extraction,
            notification,
            review,
            reasoner,
        }
    }

    /// Descriptors for every dispatchable operation.
    pub fn operations(&self) -> Vec<OperationDescriptor> {
        Operation::ALL.iter().map(|op| op.descriptor()).collect()
    }

    /// Invoke one operation on behalf of a caller.
    ///
    /// Always returns a JSON object with a `success` flag; handler faults
    /// and authorization failures are reported in-band.
    pub async fn invoke(&self, ctx: &CallerContext, name: &str, args: Value) -> Value {
        let Some(op) = Operation::parse(name) else {
            return json!({
                "success": false,
                "error": format!("Unknown operation: {name}"),
            });
        };

        if let Err(denied) = rbac::guard(ctx, op.required_roles()) {
            let AuthError::Denied { required, user_role } = &denied;
            self.audit
                .unauthorized_access(&ctx.user_id, op.name(), "invoke", &denied.to_string())
                .await;
            return json!({
                "success": false,
                "error": denied.to_string(),
                "required_roles": required,
                "user_role": user_role,
            });
        }

        info!(operation = op.name(), user_id = %ctx.user_id, "Dispatching operation");
        match self.run(ctx, op, args).await {
            Ok(Value::Object(mut map)) => {
                // Handlers may set `success: false` themselves (negative
                // verdicts from forwarded capabilities).
                map.entry("success").or_insert(json!(true));
                Value::Object(map)
            }
            Ok(other) => json!({ "success": true, "result": other }),
            Err(e) => {
                warn!(operation = op.name(), error = %e, "Operation failed");
                json!({ "success": false, "error": e.to_string() })
            }
        }
    }

    /// Interpret a free-form query and run the operation it maps to.
    pub async fn process_query(&self, ctx: &CallerContext, query: &str) -> Value {
        let attachments = extract_attachment_paths(query);
        let descriptors = self.operations();

        let outcome = match self.reasoner.interpret(query, &descriptors).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Reasoning failed");
                return json!({ "success": false, "error": e.to_string() });
            }
        };

        match outcome {
            ReasoningOutcome::Text(message) => json!({ "success": true, "message": message }),
            ReasoningOutcome::Operation { name, mut arguments } => {
                if name == "create_expense" {
                    if let (Value::Object(map), Some(path)) =
                        (&mut arguments, attachments.first())
                    {
                        map.entry("receipt_path")
                            .or_insert_with(|| json!(path));
                    }
                }
                self.invoke(ctx, &name, arguments).await
            }
        }
    }

    async fn run(&self, ctx: &CallerContext, op: Operation, args: Value) -> Result<Value, Error> {
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ProtocolError::InvalidParameters(format!(
                    "expected an argument object, got {other}"
                ))
                .into())
            }
        };

        match op {
            Operation::CreateExpense => self.create_expense(ctx, &args).await,
            Operation::GetExpense => self.get_expense(ctx, &args).await,
            Operation::ListExpenses => self.list_expenses(ctx).await,
            Operation::ReviewExpense => self.review_expense(&args).await,
            Operation::EvaluateExpense => {
                self.forward(ctx, &self.review, "review_expense", &args).await
            }
            Operation::ProcessExpensePayment => self.process_expense_payment(&args).await,
            Operation::ExtractReceipt => {
                self.forward(ctx, &self.extraction, "extract_receipt_info", &args)
                    .await
            }
            Operation::SendExpenseNotification => {
                self.forward(ctx, &self.notification, "send_expense_notification", &args)
                    .await
            }
            Operation::QueryPolicies => self.query_policies().await,
            Operation::ListProviders => self.list_providers().await,
            Operation::ListEmployees => self.list_employees().await,
            Operation::GetEmployee => self.get_employee(&args).await,
            Operation::CreateEmployee => self.create_employee(&args).await,
            Operation::UpdateEmployee => self.update_employee(&args).await,
            Operation::DeleteEmployee => self.delete_employee(&args).await,
            Operation::ListAuditLogs => self.list_audit_logs().await,
        }
    }

    fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, Error> {
        args.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidParameters(format!("missing parameter: {key}")).into())
    }

    /// Forward arguments to a provider capability over the envelope
    /// protocol, recording the exchange in the audit trail.
    async fn forward(
        &self,
        ctx: &CallerContext,
        provider: &Arc<dyn Provider>,
        capability: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, Error> {
        let request = Envelope::request(
            ORCHESTRATOR_ID,
            provider.id(),
            capability,
            Value::Object(args.clone()),
        );
        let reply = deliver(provider.as_ref(), &request, ctx).await;

        let failed = reply.kind == EnvelopeKind::Error;
        self.audit
            .provider_message(
                ORCHESTRATOR_ID,
                &provider.id(),
                capability,
                !failed,
                reply.payload["error"].as_str().filter(|_| failed),
            )
            .await;

        if failed {
            let message = reply.payload["error"]
                .as_str()
                .unwrap_or("capability request failed")
                .to_string();
            return Ok(json!({ "success": false, "error": message }));
        }
        Ok(reply.payload)
    }

    async fn create_expense(
        &self,
        ctx: &CallerContext,
        args: &Map<String, Value>,
    ) -> Result<Value, Error> {
        // Employees always submit for themselves; only admins may submit
        // on someone else's behalf.
        let employee_id = if ctx.is_admin() {
            args.get("employee_id")
                .and_then(Value::as_str)
                .unwrap_or(&ctx.user_id)
                .to_string()
        } else {
            ctx.user_id.clone()
        };

        // The owner must be a registered employee: the pipeline needs their
        // ledger account to pay and their address to notify.
        if self
            .store
            .get_employee(&employee_id)
            .await
            .map_err(Error::from)?
            .is_none()
        {
            return Err(ProtocolError::InvalidParameters(format!(
                "unknown employee: {employee_id}"
            ))
            .into());
        }

        let amount = args
            .get("amount")
            .and_then(parse_amount)
            .filter(|a| a.is_sign_positive() && !a.is_zero())
            .ok_or_else(|| {
                Error::from(ProtocolError::InvalidParameters(
                    "amount must be a positive number".to_string(),
                ))
            })?;
        let category = Self::require_str(args, "category")?;
        let justification = Self::require_str(args, "business_justification")?;
        let date_of_expense: NaiveDate = Self::require_str(args, "date_of_expense")?
            .parse()
            .map_err(|_| {
                Error::from(ProtocolError::InvalidParameters(
                    "date_of_expense must be an ISO date (YYYY-MM-DD)".to_string(),
                ))
            })?;
        let receipt_path = args
            .get("receipt_path")
            .and_then(Value::as_str)
            .map(str::to_string);

        let expense = Expense::new(
            employee_id,
            amount,
            category,
            justification,
            date_of_expense,
            receipt_path,
        );
        self.store.create_expense(&expense).await.map_err(Error::from)?;
        info!(expense_id = %expense.id, amount = %expense.amount, "Expense submitted");

        // Only a submission with a document reference triggers the
        // automatic review; without one the expense stays pending until a
        // human picks it up.
        if expense.receipt_path.is_none() {
            return Ok(json!({ "expense": expense, "review_completed": false }));
        }

        self.pipeline.schedule(expense.id.clone());
        let decided = self
            .pipeline
            .wait_for_decision(&expense.id)
            .await
            .map_err(Error::from)?;

        let completed = decided.status != crate::model::ExpenseStatus::Pending;
        Ok(json!({ "expense": decided, "review_completed": completed }))
    }

    async fn get_expense(
        &self,
        ctx: &CallerContext,
        args: &Map<String, Value>,
    ) -> Result<Value, Error> {
        let expense_id = Self::require_str(args, "expense_id")?;
        let expense = self
            .store
            .get_expense(expense_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| {
                Error::from(StorageError::NotFound {
                    entity: "expense".to_string(),
                    id: expense_id.to_string(),
                })
            })?;

        if !rbac::check_ownership(ctx, &expense.employee_id) {
            self.audit
                .unauthorized_access(
                    &ctx.user_id,
                    expense_id,
                    "get_expense",
                    "caller does not own this expense",
                )
                .await;
            return Err(AuthError::Denied {
                required: vec!["admin".to_string()],
                user_role: ctx.role.as_str().to_string(),
            }
            .into());
        }
        Ok(json!({ "expense": expense }))
    }

    async fn list_expenses(&self, ctx: &CallerContext) -> Result<Value, Error> {
        let all = self.store.list_expenses().await.map_err(Error::from)?;
        let visible = rbac::filter_owned(ctx, all, |e| &e.employee_id);
        Ok(json!({ "count": visible.len(), "expenses": visible }))
    }

    async fn review_expense(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let expense_id = Self::require_str(args, "expense_id")?;
        let approve = args
            .get("approve")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                Error::from(ProtocolError::InvalidParameters(
                    "missing parameter: approve".to_string(),
                ))
            })?;
        let reason = args.get("reason").and_then(Value::as_str).unwrap_or("");

        let expense = self
            .pipeline
            .human_decision(expense_id, approve, reason)
            .await
            .map_err(Error::from)?;
        Ok(json!({ "expense": expense }))
    }

    async fn process_expense_payment(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let expense_id = Self::require_str(args, "expense_id")?;
        match self.ledger.credit_expense(expense_id).await.map_err(Error::from)? {
            CreditOutcome::Credited {
                account_id,
                previous_balance,
                new_balance,
            } => Ok(json!({
                "credited": true,
                "account_id": account_id,
                "previous_balance": previous_balance,
                "new_balance": new_balance,
            })),
            CreditOutcome::AlreadyCredited => Ok(json!({
                "credited": false,
                "detail": "expense has already been reimbursed",
            })),
        }
    }

    async fn query_policies(&self) -> Result<Value, Error> {
        let policy = self
            .store
            .get_policy()
            .await
            .map_err(Error::from)?
            .unwrap_or_else(ReimbursementPolicy::default_policy);
        Ok(json!({ "policy": policy }))
    }

    async fn list_providers(&self) -> Result<Value, Error> {
        Ok(json!({
            "providers": self.registry.list().await,
            "capabilities": self.registry.capability_map().await,
        }))
    }

    async fn list_employees(&self) -> Result<Value, Error> {
        let employees = self.store.list_employees().await.map_err(Error::from)?;
        Ok(json!({ "count": employees.len(), "employees": employees }))
    }

    async fn get_employee(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let employee_id = Self::require_str(args, "employee_id")?;
        let employee = self
            .store
            .get_employee(employee_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| {
                Error::from(StorageError::NotFound {
                    entity: "employee".to_string(),
                    id: employee_id.to_string(),
                })
            })?;
        Ok(json!({ "employee": employee }))
    }

    async fn create_employee(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let name = Self::require_str(args, "name")?;
        let email = Self::require_str(args, "email")?;
        let department = args
            .get("department")
            .and_then(Value::as_str)
            .unwrap_or("General");
        let role = args
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("employee")
            .parse()
            .map_err(|e: String| Error::from(ProtocolError::InvalidParameters(e)))?;

        let mut employee = Employee::new(name, email, department, role);
        let account = LedgerAccount::new(employee.id.clone(), name, email);
        employee.account_id = Some(account.id.clone());

        self.store.create_account(&account).await.map_err(Error::from)?;
        self.store.create_employee(&employee).await.map_err(Error::from)?;
        info!(employee_id = %employee.id, account_id = %account.id, "Employee created");

        Ok(json!({ "employee": employee, "account_id": account.id }))
    }

    async fn update_employee(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let employee_id = Self::require_str(args, "employee_id")?;
        let mut employee = self
            .store
            .get_employee(employee_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| {
                Error::from(StorageError::NotFound {
                    entity: "employee".to_string(),
                    id: employee_id.to_string(),
                })
            })?;

        if let Some(name) = args.get("name").and_then(Value::as_str) {
            employee.name = name.to_string();
        }
        if let Some(email) = args.get("email").and_then(Value::as_str) {
            employee.email = email.to_string();
        }
        if let Some(department) = args.get("department").and_then(Value::as_str) {
            employee.department = department.to_string();
        }
        if let Some(role) = args.get("role").and_then(Value::as_str) {
            employee.role = role
                .parse()
                .map_err(|e: String| Error::from(ProtocolError::InvalidParameters(e)))?;
        }
        self.store.update_employee(&employee).await.map_err(Error::from)?;
        Ok(json!({ "employee": employee }))
    }

    async fn delete_employee(&self, args: &Map<String, Value>) -> Result<Value, Error> {
        let employee_id = Self::require_str(args, "employee_id")?;
        self.store.delete_employee(employee_id).await.map_err(Error::from)?;
        Ok(json!({ "deleted": true, "employee_id": employee_id }))
    }

    async fn list_audit_logs(&self) -> Result<Value, Error> {
        let entries = self.store.list_audit().await.map_err(Error::from)?;
        Ok(json!({ "count": entries.len(), "entries": entries }))
    }
}
