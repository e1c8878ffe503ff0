//! Resource and domain lookup.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json_query};

pub async fn cmd_resources(port: u16, filters: &[(String, String)]) -> Result<()> {
    #[derive(Deserialize)]
    struct ResourceInfo {
        ep: String,
        d: String,
        link: String,
    }

    #[derive(Deserialize)]
    struct ResourcesResponse {
        resources: Vec<ResourceInfo>,
    }

    let resp: ResourcesResponse =
        get_json_query(&format!("{}/resources", base_url(port)), filters).await?;

    if resp.resources.is_empty() {
        println!("No matching resources.");
        return Ok(());
    }
    for r in &resp.resources {
        println!("{:<20} {:<12} {}", r.ep, r.d, r.link);
    }
    Ok(())
}

pub async fn cmd_domains(port: u16, filters: &[(String, String)]) -> Result<()> {
    #[derive(Deserialize)]
    struct DomainsResponse {
        domains: Vec<String>,
    }

    let resp: DomainsResponse =
        get_json_query(&format!("{}/domains", base_url(port)), filters).await?;
    for d in &resp.domains {
        println!("{}", d);
    }
    Ok(())
}
