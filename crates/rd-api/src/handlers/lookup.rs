//! /resources and /domains handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use rd_services::router::resource_link;

use super::{parse_lookup, ApiState};

#[derive(Serialize)]
pub struct ResourceInfo {
    pub endpoint_id: String,
    pub ep: String,
    pub d: String,
    /// Absolute link as returned by resource lookup.
    pub link: String,
}

#[derive(Serialize)]
pub struct ResourcesResponse {
    pub resources: Vec<ResourceInfo>,
}

pub async fn handle_resources(
    State(state): State<ApiState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<ResourcesResponse>, (StatusCode, String)> {
    let lookup = parse_lookup(&query)?;
    let resources = state
        .registry
        .lookup_resources(&lookup)
        .iter()
        .map(|m| ResourceInfo {
            endpoint_id: m.endpoint_id.clone(),
            ep: m.endpoint.clone(),
            d: m.domain.clone(),
            link: rd_core::link_format::encode(std::slice::from_ref(&resource_link(m))),
        })
        .collect();
    Ok(Json(ResourcesResponse { resources }))
}

#[derive(Serialize)]
pub struct DomainsResponse {
    pub domains: Vec<String>,
}

pub async fn handle_domains(
    State(state): State<ApiState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<DomainsResponse>, (StatusCode, String)> {
    let lookup = parse_lookup(&query)?;
    Ok(Json(DomainsResponse {
        domains: state.registry.lookup_domains(&lookup),
    }))
}
