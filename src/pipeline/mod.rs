//! Expense review: policy rules and the asynchronous pipeline.

pub mod review;
pub mod rules;

pub use review::{ReviewPipeline, ORCHESTRATOR_ID};
pub use rules::{DocumentCheck, PolicyEngine, RuleDecision};
