//! HTTP surface for the orchestrator.
//!
//! Three routes: free-form queries, direct operation invocation, and
//! capability discovery. Every response body is the dispatcher's JSON
//! result; transport-level errors are limited to malformed request
//! bodies.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::context::{CallerContext, Role};
use crate::dispatch::Dispatcher;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

#[derive(Deserialize)]
struct QueryBody {
    user_id: String,
    role: Role,
    #[serde(default)]
    session_id: Option<String>,
    query: String,
}

#[derive(Deserialize)]
struct OperationBody {
    user_id: String,
    role: Role,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    args: Value,
}

fn caller(user_id: String, role: Role, session_id: Option<String>) -> CallerContext {
    let ctx = CallerContext::new(user_id, role);
    match session_id {
        Some(session) => ctx.with_session(session),
        None => ctx,
    }
}

async fn handle_query(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Json<Value> {
    let ctx = caller(body.user_id, body.role, body.session_id);
    Json(state.dispatcher.process_query(&ctx, &body.query).await)
}

async fn handle_operation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<OperationBody>,
) -> Json<Value> {
    let ctx = caller(body.user_id, body.role, body.session_id);
    Json(state.dispatcher.invoke(&ctx, &name, body.args).await)
}

async fn handle_capabilities(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "operations": state.dispatcher.operations() }))
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/orchestrator", post(handle_query))
        .route("/operations/{name}", post(handle_operation))
        .route("/capabilities", get(handle_capabilities))
        .layer(CorsLayer::permissive())
        .with_state(AppState { dispatcher })
}

pub async fn serve(addr: std::net::SocketAddr, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}
