use axum::{ extract::State, response::Json, routing::get, Router };
use serde::Serialize;
use std::sync::Arc;

use crate::webserver::state::AppState;

/// Simple health check response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub verified_wallets: usize,
}

/// Create status routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(service_status))
}

/// GET /status
async fn service_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        verified_wallets: state.store.len(),
    })
}
