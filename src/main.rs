use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use expense_agents::audit::AuditTrail;
use expense_agents::config::OrchestratorConfig;
use expense_agents::dispatch::Dispatcher;
use expense_agents::ledger::LedgerService;
use expense_agents::model::ReimbursementPolicy;
use expense_agents::pipeline::{PolicyEngine, ReviewPipeline};
use expense_agents::protocol::{Provider, ProviderRegistry};
use expense_agents::providers::{
    ExtractionProvider, LocalJsonExtractor, LogNotifier, NotificationProvider, Notifier,
    ReviewProvider, SmtpNotifier,
};
use expense_agents::reasoning::HeuristicReasoner;
use expense_agents::store::{MemoryStore, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = OrchestratorConfig::from_env().context("loading configuration")?;

    let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let audit = AuditTrail::new(store.clone());
    let ledger = Arc::new(LedgerService::new(store.clone(), audit.clone()));
    let engine = Arc::new(PolicyEngine::new(
        store.clone(),
        config.default_auto_approve_limit,
    ));

    if store.get_policy().await?.is_none() {
        let mut policy = ReimbursementPolicy::default_policy();
        policy.auto_approve_limit = config.default_auto_approve_limit;
        store.put_policy(&policy).await?;
        info!(limit = %policy.auto_approve_limit, "Seeded default reimbursement policy");
    }

    let notifier: Arc<dyn Notifier> = match config.smtp.clone() {
        Some(smtp) => {
            info!(host = %smtp.host, "SMTP notifications enabled");
            Arc::new(SmtpNotifier::new(smtp))
        }
        None => {
            info!("SMTP not configured, notifications are log-only");
            Arc::new(LogNotifier)
        }
    };

    let extraction: Arc<dyn Provider> =
        Arc::new(ExtractionProvider::new(Arc::new(LocalJsonExtractor)));
    let notification: Arc<dyn Provider> = Arc::new(NotificationProvider::new(notifier));
    let review: Arc<dyn Provider> = Arc::new(ReviewProvider::new(store.clone(), engine.clone()));

    let registry = Arc::new(ProviderRegistry::new());
    registry.register(extraction.card()).await;
    registry.register(notification.card()).await;
    registry.register(review.card()).await;

    let pipeline = Arc::new(ReviewPipeline::new(
        store.clone(),
        audit.clone(),
        ledger.clone(),
        engine,
        extraction.clone(),
        notification.clone(),
        config.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        audit,
        ledger,
        pipeline,
        registry,
        extraction,
        notification,
        review,
        Arc::new(HeuristicReasoner),
    ));

    expense_agents::http::serve(config.bind_addr, dispatcher).await
}
