//! Registration listing and management.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json, get_json_query};

#[derive(Deserialize)]
struct EndpointInfo {
    id: String,
    location: String,
    ep: String,
    d: String,
    et: Option<String>,
    lt: u32,
    base: String,
    expires_in_secs: u64,
    resources: usize,
    attributes: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct EndpointsResponse {
    endpoints: Vec<EndpointInfo>,
}

fn print_endpoint(e: &EndpointInfo) {
    println!("  ┌─ {} ({})", e.ep, e.d);
    println!("  │  location  : {}", e.location);
    if let Some(et) = &e.et {
        println!("  │  type      : {}", et);
    }
    println!("  │  base      : {}", e.base);
    for (k, v) in &e.attributes {
        println!("  │  {:<9} : {}", k, v);
    }
    println!("  │  resources : {}", e.resources);
    println!("  └─ expires   : {}s (lt={})", e.expires_in_secs, e.lt);
}

pub async fn cmd_endpoints(port: u16, filters: &[(String, String)]) -> Result<()> {
    let resp: EndpointsResponse =
        get_json_query(&format!("{}/endpoints", base_url(port)), filters).await?;

    if resp.endpoints.is_empty() {
        println!("No matching registrations.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Registrations ({})", resp.endpoints.len());
    println!("═══════════════════════════════════════");
    for e in &resp.endpoints {
        print_endpoint(e);
    }
    Ok(())
}

pub async fn cmd_show(port: u16, id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct EndpointDetail {
        #[serde(flatten)]
        info: EndpointInfo,
        links: String,
    }

    let resp: EndpointDetail = get_json(&format!("{}/endpoints/{}", base_url(port), id)).await?;

    println!("═══════════════════════════════════════");
    println!("  Registration {}", resp.info.id);
    println!("═══════════════════════════════════════");
    print_endpoint(&resp.info);
    if !resp.links.is_empty() {
        println!();
        println!("  {}", resp.links);
    }
    Ok(())
}

pub async fn cmd_remove(port: u16, id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct RemoveResponse {
        id: String,
        removed: bool,
    }

    let resp: RemoveResponse = delete_json(&format!("{}/endpoints/{}", base_url(port), id)).await?;
    if resp.removed {
        println!("✓ Registration removed: {}", resp.id);
    } else {
        println!("Registration not found: {}", id);
    }
    Ok(())
}
