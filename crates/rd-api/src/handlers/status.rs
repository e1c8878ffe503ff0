//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub coap_addr: String,
    pub uptime_secs: u64,
    pub registrations: usize,
    pub pending_probes: usize,
    pub default_domain: String,
    pub default_lifetime: u32,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let defaults = state.registry.defaults();
    Json(StatusResponse {
        coap_addr: state.coap_addr.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        registrations: state.registry.len(),
        pending_probes: state.registry.pending_probes(),
        default_domain: defaults.domain.clone(),
        default_lifetime: defaults.lifetime,
    })
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub shutting_down: bool,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let shutting_down = state.shutdown_tx.send(()).is_ok();
    Json(ShutdownResponse { shutting_down })
}
