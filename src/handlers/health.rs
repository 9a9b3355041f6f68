use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status
    pub status: String,
    /// Number of registered calls
    #[serde(rename = "activeCalls")]
    pub active_calls: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_calls: state.registry.active_calls(),
    })
}
