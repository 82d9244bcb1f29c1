//! End-to-end review flow through the dispatcher.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;

use expense_agents::audit::{AuditEvent, AuditTrail};
use expense_agents::config::OrchestratorConfig;
use expense_agents::context::{CallerContext, Role};
use expense_agents::dispatch::Dispatcher;
use expense_agents::ledger::LedgerService;
use expense_agents::pipeline::{PolicyEngine, ReviewPipeline};
use expense_agents::protocol::{Provider, ProviderRegistry};
use expense_agents::providers::{
    ExtractionProvider, LocalJsonExtractor, LogNotifier, NotificationProvider, ReviewProvider,
};
use expense_agents::reasoning::HeuristicReasoner;
use expense_agents::store::{MemoryStore, Storage};

struct Harness {
    store: Arc<MemoryStore>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let storage: Arc<dyn Storage> = store.clone();
    let audit = AuditTrail::new(storage.clone());
    let ledger = Arc::new(LedgerService::new(storage.clone(), audit.clone()));
    let engine = Arc::new(PolicyEngine::new(storage.clone(), dec!(500.00)));
    let extraction: Arc<dyn Provider> =
        Arc::new(ExtractionProvider::new(Arc::new(LocalJsonExtractor)));
    let notification: Arc<dyn Provider> = Arc::new(NotificationProvider::new(Arc::new(LogNotifier)));
    let review: Arc<dyn Provider> = Arc::new(ReviewProvider::new(storage.clone(), engine.clone()));

    let config = OrchestratorConfig {
        poll_interval: Duration::from_millis(10),
        poll_ceiling: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    let pipeline = Arc::new(ReviewPipeline::new(
        storage.clone(),
        audit.clone(),
        ledger.clone(),
        engine,
        extraction.clone(),
        notification.clone(),
        config,
    ));

    let registry = Arc::new(ProviderRegistry::new());
    let dispatcher = Dispatcher::new(
        storage,
        audit,
        ledger,
        pipeline,
        registry,
        extraction,
        notification,
        review,
        Arc::new(HeuristicReasoner),
    );
    Harness { store, dispatcher }
}

fn admin() -> CallerContext {
    CallerContext::new("adm_1", Role::Admin)
}

async fn seed_employee(h: &Harness) -> String {
    let result = h
        .dispatcher
        .invoke(
            &admin(),
            "create_employee",
            json!({ "name": "Alice", "email": "alice@corp.test", "department": "Eng" }),
        )
        .await;
    assert_eq!(result["success"], true, "seed failed: {result}");
    result["employee"]["id"].as_str().unwrap().to_string()
}

fn receipt_file(amount: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"vendor":"Vendor Co","amount":"{amount}","category":"Meals","description":"receipt"}}"#
    )
    .unwrap();
    file
}

async fn submit(
    h: &Harness,
    ctx: &CallerContext,
    amount: &str,
    receipt_path: Option<&str>,
) -> serde_json::Value {
    let mut args = json!({
        "amount": amount,
        "category": "Meals",
        "business_justification": "Working meal",
        "date_of_expense": "2025-02-10",
    });
    if let Some(path) = receipt_path {
        args["receipt_path"] = json!(path);
    }
    h.dispatcher.invoke(ctx, "create_expense", args).await
}

/// The credit lands just after the status write the poller observes, so
/// balance assertions wait for it.
async fn wait_for_balance(
    store: &MemoryStore,
    employee_id: &str,
    expected: rust_decimal::Decimal,
) -> rust_decimal::Decimal {
    let mut balance = dec!(0.00);
    for _ in 0..100 {
        balance = store
            .get_account_by_employee(employee_id)
            .await
            .unwrap()
            .unwrap()
            .balance;
        if balance == expected {
            return balance;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    balance
}

/// Wait for the detached notification task to land its audit entry.
async fn wait_for_notification_audit(store: &MemoryStore) -> bool {
    for _ in 0..100 {
        let entries = store.list_audit().await.unwrap();
        if entries.iter().any(|e| e.event == AuditEvent::Notification) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn small_receipted_expense_auto_approves_and_pays_once() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id.clone(), Role::Employee);

    let receipt = receipt_file("42.50");
    let result = submit(&h, &ctx, "42.50", receipt.path().to_str()).await;
    assert_eq!(result["success"], true, "unexpected: {result}");
    assert_eq!(result["review_completed"], true);
    assert_eq!(result["expense"]["status"], "approved");
    assert_eq!(result["expense"]["decision_actor"], "AI");
    assert_eq!(
        result["expense"]["decision_reason"],
        "Receipt valid, within policy limits"
    );

    assert_eq!(
        wait_for_balance(&h.store, &employee_id, dec!(42.50)).await,
        dec!(42.50)
    );

    let entries = h.store.list_audit().await.unwrap();
    assert!(entries.iter().any(|e| e.event == AuditEvent::StatusChange));
    assert!(entries.iter().any(|e| e.event == AuditEvent::Payment));
    assert!(entries
        .iter()
        .any(|e| e.event == AuditEvent::InterAgentMessage));
    assert!(wait_for_notification_audit(&h.store).await);
}

#[tokio::test]
async fn over_limit_expense_waits_for_manual_approval() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id.clone(), Role::Employee);

    let receipt = receipt_file("900.00");
    let result = submit(&h, &ctx, "900.00", receipt.path().to_str()).await;
    assert_eq!(result["expense"]["status"], "admin_review");
    let expense_id = result["expense"]["id"].as_str().unwrap().to_string();

    // No payment while parked in review.
    let account = h
        .store
        .get_account_by_employee(&employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(0.00));

    // Manual review is admin-gated.
    let denied = h
        .dispatcher
        .invoke(
            &ctx,
            "review_expense",
            json!({ "expense_id": expense_id, "approve": true }),
        )
        .await;
    assert_eq!(denied["success"], false);

    let reviewed = h
        .dispatcher
        .invoke(
            &admin(),
            "review_expense",
            json!({ "expense_id": expense_id, "approve": true, "reason": "Conference travel approved" }),
        )
        .await;
    assert_eq!(reviewed["success"], true, "unexpected: {reviewed}");
    assert_eq!(reviewed["expense"]["status"], "approved");
    assert_eq!(reviewed["expense"]["decision_actor"], "Human");

    let account = h
        .store
        .get_account_by_employee(&employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(900.00));
}

#[tokio::test]
async fn repeated_same_day_submission_goes_to_review() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id, Role::Employee);

    let first_receipt = receipt_file("20.00");
    let first = submit(&h, &ctx, "20.00", first_receipt.path().to_str()).await;
    assert_eq!(first["expense"]["status"], "approved");

    let second_receipt = receipt_file("25.00");
    let second = submit(&h, &ctx, "25.00", second_receipt.path().to_str()).await;
    assert_eq!(second["expense"]["status"], "admin_review");
    assert!(second["expense"]["decision_reason"]
        .as_str()
        .unwrap()
        .contains("Repeated submission"));
}

#[tokio::test]
async fn unreadable_receipt_is_rejected_without_payment() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id.clone(), Role::Employee);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "this is not a receipt").unwrap();

    let result = submit(&h, &ctx, "30.00", file.path().to_str()).await;
    assert_eq!(result["expense"]["status"], "rejected");
    assert_eq!(result["expense"]["decision_actor"], "AI");

    let account = h
        .store
        .get_account_by_employee(&employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(0.00));
}

#[tokio::test]
async fn rejection_by_human_reviewer_does_not_pay() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id.clone(), Role::Employee);

    let receipt = receipt_file("700.00");
    let result = submit(&h, &ctx, "700.00", receipt.path().to_str()).await;
    let expense_id = result["expense"]["id"].as_str().unwrap().to_string();

    let reviewed = h
        .dispatcher
        .invoke(
            &admin(),
            "review_expense",
            json!({ "expense_id": expense_id, "approve": false, "reason": "Not a business expense" }),
        )
        .await;
    assert_eq!(reviewed["expense"]["status"], "rejected");

    let account = h
        .store
        .get_account_by_employee(&employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(0.00));

    // A terminal decision cannot be re-reviewed.
    let again = h
        .dispatcher
        .invoke(
            &admin(),
            "review_expense",
            json!({ "expense_id": expense_id, "approve": true }),
        )
        .await;
    assert_eq!(again["success"], false);
}

#[tokio::test]
async fn repeated_payment_requests_credit_exactly_once() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id.clone(), Role::Employee);

    let receipt = receipt_file("55.00");
    let result = submit(&h, &ctx, "55.00", receipt.path().to_str()).await;
    assert_eq!(result["expense"]["status"], "approved");
    let expense_id = result["expense"]["id"].as_str().unwrap().to_string();
    wait_for_balance(&h.store, &employee_id, dec!(55.00)).await;

    // The pipeline already paid on approval; explicit payment requests
    // afterwards are no-ops.
    for _ in 0..3 {
        let payment = h
            .dispatcher
            .invoke(
                &admin(),
                "process_expense_payment",
                json!({ "expense_id": expense_id }),
            )
            .await;
        assert_eq!(payment["success"], true);
        assert_eq!(payment["credited"], false);
    }

    let account = h
        .store
        .get_account_by_employee(&employee_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(55.00));

    let payments = h
        .store
        .list_audit()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event == AuditEvent::Payment)
        .count();
    assert_eq!(payments, 1);
}

#[tokio::test]
async fn submission_without_document_is_not_reviewed() {
    let h = harness();
    let employee_id = seed_employee(&h).await;
    let ctx = CallerContext::new(employee_id, Role::Employee);

    let result = submit(&h, &ctx, "42.00", None).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["review_completed"], false);
    assert_eq!(result["expense"]["status"], "pending");
}

#[tokio::test]
async fn audit_trail_is_admin_only() {
    let h = harness();
    let employee = CallerContext::new("emp_1", Role::Employee);

    let denied = h
        .dispatcher
        .invoke(&employee, "list_audit_logs", json!({}))
        .await;
    assert_eq!(denied["success"], false);

    let allowed = h.dispatcher.invoke(&admin(), "list_audit_logs", json!({})).await;
    assert_eq!(allowed["success"], true);
    // The denial itself is on the trail.
    assert!(allowed["entries"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["event"] == "unauthorized_access"));
}
