//! Registered endpoints.

use std::time::Duration;

use rd_core::{ResourceLink, UriRef};
use tokio::time::Instant;

/// One endpoint's registration.
///
/// `(name, domain)` identifies the endpoint; `id` is the handle returned to
/// it and is never reassigned while the process runs.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,

    /// `ep`
    pub name: String,

    /// `d`
    pub domain: String,

    /// `et`
    pub endpoint_type: Option<String>,

    /// `lt`, in seconds.
    pub lifetime: u32,

    /// `con`, or `coap://<sender>` when the endpoint gave none.
    pub context: UriRef,

    /// Registration query parameters with no dedicated field.
    pub attributes: Vec<(String, String)>,

    pub resources: Vec<ResourceLink>,

    pub registered_at: Instant,
    pub last_refreshed_at: Instant,

    /// Creation order, for stable lookup output.
    pub(crate) seq: u64,

    /// Bumped whenever resources are set explicitly. A discovery probe only
    /// commits if the generation it started with is still current.
    pub(crate) resource_generation: u64,
}

impl Endpoint {
    /// Relative location handed back to the registrant, e.g. `rd/4521a0c2e9f31b7d`.
    pub fn location(&self) -> String {
        format!("rd/{}", self.id)
    }

    /// An endpoint expires `lifetime` seconds after its last refresh.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_refreshed_at) >= self.lifetime_duration()
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self, now: Instant) -> Duration {
        self.lifetime_duration()
            .saturating_sub(now.saturating_duration_since(self.last_refreshed_at))
    }

    fn lifetime_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lifetime))
    }

    /// Registration attribute by name, as lookups see it.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "ep" => Some(self.name.clone()),
            "d" => Some(self.domain.clone()),
            "et" => self.endpoint_type.clone(),
            "lt" => Some(self.lifetime.to_string()),
            "con" | "base" => Some(self.context.to_string()),
            "href" => Some(format!("/{}", self.location())),
            _ => self
                .attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
        }
    }

    /// Merge links by `href`: replace a link with the same target, append
    /// the rest in the order given. Returns whether anything changed.
    pub fn merge_resources(&mut self, links: Vec<ResourceLink>) -> bool {
        let mut changed = false;
        for link in links {
            match self.resources.iter_mut().find(|r| r.href == link.href) {
                Some(existing) if *existing == link => {}
                Some(existing) => {
                    *existing = link;
                    changed = true;
                }
                None => {
                    self.resources.push(link);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Set a free-form attribute, replacing any previous value.
    pub(crate) fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_endpoint(name: &str, domain: &str, lifetime: u32) -> Endpoint {
    let now = Instant::now();
    Endpoint {
        id: format!("{:016x}", name.len()),
        name: name.to_string(),
        domain: domain.to_string(),
        endpoint_type: None,
        lifetime,
        context: UriRef::parse("coap://[2001:db8::1]:5683").unwrap_or_default(),
        attributes: Vec::new(),
        resources: Vec::new(),
        registered_at: now,
        last_refreshed_at: now,
        seq: 0,
        resource_generation: 0,
    }
}
