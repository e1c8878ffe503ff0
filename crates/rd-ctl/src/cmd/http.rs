//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

/// Turn `name=value` arguments into query pairs. A bare `name` filters on
/// presence.
pub fn parse_filters(args: &[&str]) -> Vec<(String, String)> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (arg.to_string(), String::new()),
        })
        .collect()
}

async fn read_json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("rdd answered {}: {}", status, body);
    }
    resp.json::<T>().await.context("failed to parse response")
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    get_json_query(url, &[]).await
}

pub async fn get_json_query<T: for<'de> Deserialize<'de>>(
    url: &str,
    query: &[(String, String)],
) -> Result<T> {
    let resp = reqwest::Client::new()
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("failed to connect to rdd at {}, is it running?", url))?;
    read_json(resp).await
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to rdd at {}, is it running?", url))?;
    read_json(resp).await
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to rdd at {}, is it running?", url))?;
    read_json(resp).await
}
