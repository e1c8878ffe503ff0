//! /endpoints handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{links_text, map_registry_error, parse_lookup, ApiState, EndpointInfo};

#[derive(Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<EndpointInfo>,
}

pub async fn handle_endpoints(
    State(state): State<ApiState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<EndpointsResponse>, (StatusCode, String)> {
    let lookup = parse_lookup(&query)?;
    let endpoints = state
        .registry
        .lookup_endpoints(&lookup)
        .iter()
        .map(EndpointInfo::from_endpoint)
        .collect();
    Ok(Json(EndpointsResponse { endpoints }))
}

#[derive(Serialize)]
pub struct EndpointDetail {
    #[serde(flatten)]
    pub info: EndpointInfo,
    /// Registered resources as link-format.
    pub links: String,
}

pub async fn handle_endpoint_show(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<EndpointDetail>, (StatusCode, String)> {
    let ep = state
        .registry
        .get(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no registration {}", id)))?;
    Ok(Json(EndpointDetail {
        info: EndpointInfo::from_endpoint(&ep),
        links: links_text(&ep),
    }))
}

#[derive(Serialize)]
pub struct RemoveResponse {
    pub id: String,
    pub removed: bool,
}

pub async fn handle_endpoint_remove(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RemoveResponse>, (StatusCode, String)> {
    state.registry.remove(&id).map_err(map_registry_error)?;
    tracing::info!(id = %id, "registration removed via API");
    Ok(Json(RemoveResponse { id, removed: true }))
}
