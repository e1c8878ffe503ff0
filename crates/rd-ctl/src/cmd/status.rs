//! Daemon status and shutdown.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    coap_addr: String,
    uptime_secs: u64,
    registrations: usize,
    pending_probes: usize,
    default_domain: String,
    default_lifetime: u32,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Resource Directory Status");
    println!("═══════════════════════════════════════");
    println!("  CoAP address     : {}", resp.coap_addr);
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Registrations    : {}", resp.registrations);
    println!("  Pending probes   : {}", resp.pending_probes);
    println!("  Default domain   : {}", resp.default_domain);
    println!("  Default lifetime : {}s", resp.default_lifetime);

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        shutting_down: bool,
    }

    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    if resp.shutting_down {
        println!("✓ rdd is shutting down");
    } else {
        println!("rdd did not accept the shutdown request");
    }
    Ok(())
}
