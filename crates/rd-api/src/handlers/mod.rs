//! HTTP admin handlers: directory state as JSON.

pub mod endpoints;
pub mod lookup;
pub mod status;

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::StatusCode;
use serde::Serialize;

use rd_core::link_format;
use rd_services::{Endpoint, LookupQuery, RegistryError};

#[derive(Clone)]
pub struct ApiState {
    pub registry: rd_services::Registry,
    /// Address the CoAP listener is bound to.
    pub coap_addr: SocketAddr,
    pub started_at: Instant,
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Listing of one registration.
#[derive(Serialize)]
pub struct EndpointInfo {
    pub id: String,
    pub location: String,
    pub ep: String,
    pub d: String,
    pub et: Option<String>,
    pub lt: u32,
    pub base: String,
    pub expires_in_secs: u64,
    pub registered_secs: u64,
    pub resources: usize,
    pub attributes: Vec<(String, String)>,
}

impl EndpointInfo {
    fn from_endpoint(ep: &Endpoint) -> Self {
        let now = tokio::time::Instant::now();
        Self {
            id: ep.id.clone(),
            location: format!("/{}", ep.location()),
            ep: ep.name.clone(),
            d: ep.domain.clone(),
            et: ep.endpoint_type.clone(),
            lt: ep.lifetime,
            base: ep.context.to_string(),
            expires_in_secs: ep.remaining(now).as_secs(),
            registered_secs: now.saturating_duration_since(ep.registered_at).as_secs(),
            resources: ep.resources.len(),
            attributes: ep.attributes.clone(),
        }
    }
}

/// Lookup filters from an HTTP query string, same syntax as the CoAP
/// lookup interface.
fn parse_lookup(query: &[(String, String)]) -> Result<LookupQuery, (StatusCode, String)> {
    LookupQuery::from_query(query).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn map_registry_error(e: RegistryError) -> (StatusCode, String) {
    match e {
        RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        RegistryError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn links_text(ep: &Endpoint) -> String {
    link_format::encode(&ep.resources)
}

pub use endpoints::{handle_endpoint_remove, handle_endpoint_show, handle_endpoints};
pub use lookup::{handle_domains, handle_resources};
pub use status::{handle_shutdown, handle_status};
