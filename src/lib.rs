//! Expense reimbursement orchestration.
//!
//! A set of capability providers wired together over a typed envelope
//! protocol: submitted expenses run through an automatic review pipeline
//! that checks the receipt, applies reimbursement policy, credits the
//! ledger on approval, and notifies the employee. A role-gated dispatcher
//! exposes the operation catalog to callers; every action lands in an
//! append-only audit trail.

pub mod audit;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod protocol;
pub mod providers;
pub mod reasoning;
pub mod store;

pub use config::OrchestratorConfig;
pub use context::{CallerContext, Role};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use pipeline::{PolicyEngine, ReviewPipeline};
