// rest/mod.rs — Public REST surface.
//
// Endpoints:
//   GET /api                  — example endpoint, returns a hello payload
//   GET /api/v1/capabilities  — merged capability report

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>, addr: SocketAddr) -> Result<()> {
    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api", get(hello))
        .route("/api/v1/capabilities", get(capabilities))
        .with_state(ctx)
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "Hello world!" }))
}

async fn capabilities(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(ctx.capabilities.merged())
}
