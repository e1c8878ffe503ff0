//! The endpoint registry.
//!
//! Two sharded maps: `(ep, d)` → id and id → [`Endpoint`]. Every path that
//! touches both locks `names` before `endpoints`, never the other way round,
//! and never holds an `endpoints` guard while acquiring a `names` one.
//!
//! Expired endpoints are invisible to reads as soon as their lifetime runs
//! out; the sweeper removes them physically.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use rd_core::config::RegistryConfig;
use rd_core::{RegistrationParams, ResourceLink, UriRef, ValidationError};

use crate::endpoint::Endpoint;
use crate::events::{RegistryEvent, EVENT_CAPACITY};
use crate::lookup::LookupQuery;
use crate::probe::{ProbeError, Prober};

/// Result of a registration through `/.well-known/core`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleOutcome {
    /// Resources came with the request.
    Created(String),
    /// Stored without resources; a discovery probe is under way.
    Changed(String),
}

impl SimpleOutcome {
    pub fn id(&self) -> &str {
        match self {
            SimpleOutcome::Created(id) | SimpleOutcome::Changed(id) => id,
        }
    }
}

/// One resource lookup hit.
#[derive(Debug, Clone)]
pub struct ResourceMatch {
    pub endpoint_id: String,
    pub endpoint: String,
    pub domain: String,
    pub context: UriRef,
    pub link: ResourceLink,
}

/// Defaults applied to registrations that omit parameters.
#[derive(Debug, Clone)]
pub struct RegistryDefaults {
    pub domain: String,
    pub lifetime: u32,
}

impl From<&RegistryConfig> for RegistryDefaults {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            domain: config.default_domain.clone(),
            lifetime: config.default_lifetime,
        }
    }
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

struct Inner {
    names: DashMap<(String, String), String>,
    endpoints: DashMap<String, Endpoint>,
    /// Running discovery probes, keyed by endpoint id.
    probes: DashMap<String, (u64, AbortHandle)>,
    sequence: AtomicU64,
    events: broadcast::Sender<RegistryEvent>,
    defaults: RegistryDefaults,
    prober: Option<Arc<dyn Prober>>,
    probe_timeout: Duration,
}

/// Shared handle to the registry. Clones refer to the same state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// A registry without discovery probes.
    pub fn new(defaults: RegistryDefaults) -> Self {
        Self::build(defaults, None, Duration::ZERO)
    }

    pub fn with_prober(
        defaults: RegistryDefaults,
        prober: Arc<dyn Prober>,
        probe_timeout: Duration,
    ) -> Self {
        Self::build(defaults, Some(prober), probe_timeout)
    }

    fn build(
        defaults: RegistryDefaults,
        prober: Option<Arc<dyn Prober>>,
        probe_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                names: DashMap::new(),
                endpoints: DashMap::new(),
                probes: DashMap::new(),
                sequence: AtomicU64::new(0),
                events,
                defaults,
                prober,
                probe_timeout,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    pub fn defaults(&self) -> &RegistryDefaults {
        &self.inner.defaults
    }

    /// Number of stored endpoints, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.inner.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.is_empty()
    }

    pub fn pending_probes(&self) -> usize {
        self.inner.probes.len()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Create or refresh the endpoint named by `ep`/`d`. An existing
    /// registration keeps its id and has every other field overwritten.
    pub fn register(
        &self,
        params: RegistrationParams,
        resources: Vec<ResourceLink>,
        sender: SocketAddr,
    ) -> Result<String, RegistryError> {
        self.upsert(params, Some(resources), sender)
    }

    /// Registration through `/.well-known/core`. With resources this is
    /// [`register`](Self::register); without, the endpoint is stored and its
    /// resources are fetched in the background.
    pub fn register_simple(
        &self,
        params: RegistrationParams,
        resources: Option<Vec<ResourceLink>>,
        sender: SocketAddr,
    ) -> Result<SimpleOutcome, RegistryError> {
        if resources.is_some() {
            return self.upsert(params, resources, sender).map(SimpleOutcome::Created);
        }

        let id = self.upsert(params, None, sender)?;
        let probe = self
            .inner
            .endpoints
            .get(&id)
            .map(|ep| (ep.context.clone(), ep.resource_generation));
        if let Some((target, generation)) = probe {
            self.spawn_probe(&id, generation, target);
        }
        Ok(SimpleOutcome::Changed(id))
    }

    /// `resources: None` keeps whatever an existing registration had.
    fn upsert(
        &self,
        params: RegistrationParams,
        resources: Option<Vec<ResourceLink>>,
        sender: SocketAddr,
    ) -> Result<String, RegistryError> {
        let name = params
            .ep
            .ok_or_else(|| ValidationError::new("ep", "required"))?;
        let domain = params
            .d
            .unwrap_or_else(|| self.inner.defaults.domain.clone());
        let lifetime = params.lt.unwrap_or(self.inner.defaults.lifetime);
        let context = params
            .con
            .unwrap_or_else(|| UriRef::from_socket_addr("coap", sender));
        let now = Instant::now();

        let mut expired = None;
        let (id, event) = match self.inner.names.entry((name.clone(), domain.clone())) {
            Entry::Occupied(mut slot) => {
                let id = slot.get().clone();
                let live = self
                    .inner
                    .endpoints
                    .get_mut(&id)
                    .filter(|ep| !ep.is_expired(now));
                match live {
                    Some(mut ep) => {
                        ep.endpoint_type = params.et;
                        ep.lifetime = lifetime;
                        ep.context = context;
                        ep.attributes = params.extra;
                        ep.last_refreshed_at = now;
                        if let Some(resources) = resources {
                            ep.resources = resources;
                            ep.resource_generation += 1;
                        }
                        (id, RegistryEvent::Updated { id: ep.id.clone(), ep: name, d: domain })
                    }
                    None => {
                        // Lapsed: the old registration is gone, its id retired.
                        expired = self.inner.endpoints.remove(&id).map(|(_, ep)| ep);
                        let fresh = self.create(
                            name.clone(),
                            domain.clone(),
                            params.et,
                            lifetime,
                            context,
                            params.extra,
                            resources.unwrap_or_default(),
                            now,
                        );
                        slot.insert(fresh.clone());
                        (fresh.clone(), RegistryEvent::Registered { id: fresh, ep: name, d: domain })
                    }
                }
            }
            Entry::Vacant(slot) => {
                let fresh = self.create(
                    name.clone(),
                    domain.clone(),
                    params.et,
                    lifetime,
                    context,
                    params.extra,
                    resources.unwrap_or_default(),
                    now,
                );
                slot.insert(fresh.clone());
                (fresh.clone(), RegistryEvent::Registered { id: fresh, ep: name, d: domain })
            }
        };

        if let Some(old) = expired {
            self.cancel_probe(&old.id);
            self.emit(RegistryEvent::Expired {
                id: old.id,
                ep: old.name,
                d: old.domain,
            });
        }
        match &event {
            RegistryEvent::Registered { id, ep, d } => {
                tracing::info!(%id, ep = %ep, d = %d, lt = lifetime, "endpoint registered")
            }
            _ => tracing::debug!(%id, lt = lifetime, "endpoint re-registered"),
        }
        self.emit(event);
        Ok(id)
    }

    /// Insert a new endpoint under a fresh id. Caller holds the `names` slot.
    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        name: String,
        domain: String,
        endpoint_type: Option<String>,
        lifetime: u32,
        context: UriRef,
        attributes: Vec<(String, String)>,
        resources: Vec<ResourceLink>,
        now: Instant,
    ) -> String {
        let seq = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let id = registration_id(&name, &domain, seq);
        self.inner.endpoints.insert(
            id.clone(),
            Endpoint {
                id: id.clone(),
                name,
                domain,
                endpoint_type,
                lifetime,
                context,
                attributes,
                resources,
                registered_at: now,
                last_refreshed_at: now,
                seq,
                resource_generation: 0,
            },
        );
        id
    }

    // ── Per-registration operations ──────────────────────────────────────────

    /// Refresh a registration, apply any changed parameters and, when given,
    /// replace its resources. `ep` and `d` cannot change here.
    pub fn update(
        &self,
        id: &str,
        params: RegistrationParams,
        resources: Option<Vec<ResourceLink>>,
    ) -> Result<(), RegistryError> {
        if params.ep.is_some() {
            return Err(ValidationError::new("ep", "cannot be changed by an update").into());
        }
        if params.d.is_some() {
            return Err(ValidationError::new("d", "cannot be changed by an update").into());
        }

        let now = Instant::now();
        let event = {
            let mut ep = self.live_mut(id, now)?;
            ep.last_refreshed_at = now;
            if let Some(et) = params.et {
                ep.endpoint_type = Some(et);
            }
            if let Some(lt) = params.lt {
                ep.lifetime = lt;
            }
            if let Some(con) = params.con {
                ep.context = con;
            }
            for (name, value) in &params.extra {
                ep.set_attribute(name, value);
            }
            if let Some(resources) = resources {
                ep.resources = resources;
                ep.resource_generation += 1;
            }
            RegistryEvent::Updated {
                id: ep.id.clone(),
                ep: ep.name.clone(),
                d: ep.domain.clone(),
            }
        };
        tracing::debug!(%id, "registration updated");
        self.emit(event);
        Ok(())
    }

    /// Merge links into a registration by `href`. The lifetime is not
    /// refreshed.
    pub fn patch(&self, id: &str, links: Vec<ResourceLink>) -> Result<(), RegistryError> {
        let now = Instant::now();
        let event = {
            let mut ep = self.live_mut(id, now)?;
            // An in-flight discovery only loses out to an actual change.
            if ep.merge_resources(links) {
                ep.resource_generation += 1;
            }
            RegistryEvent::Updated {
                id: ep.id.clone(),
                ep: ep.name.clone(),
                d: ep.domain.clone(),
            }
        };
        self.emit(event);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let now = Instant::now();
        let removed = self.detach(id, |_| true).ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if removed.is_expired(now) {
            self.emit(RegistryEvent::Expired {
                id: removed.id,
                ep: removed.name,
                d: removed.domain,
            });
            return Err(RegistryError::NotFound(id.to_string()));
        }

        tracing::info!(%id, ep = %removed.name, d = %removed.domain, "endpoint removed");
        self.emit(RegistryEvent::Removed {
            id: removed.id,
            ep: removed.name,
            d: removed.domain,
        });
        Ok(())
    }

    /// Current resources of a live registration.
    pub fn read(&self, id: &str) -> Result<Vec<ResourceLink>, RegistryError> {
        self.get(id)
            .map(|ep| ep.resources)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Snapshot of a live registration.
    pub fn get(&self, id: &str) -> Option<Endpoint> {
        let now = Instant::now();
        self.inner
            .endpoints
            .get(id)
            .filter(|ep| !ep.is_expired(now))
            .map(|ep| ep.value().clone())
    }

    fn live_mut(
        &self,
        id: &str,
        now: Instant,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Endpoint>, RegistryError> {
        self.inner
            .endpoints
            .get_mut(id)
            .filter(|ep| !ep.is_expired(now))
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Remove `id` from both maps if `pred` holds for it, respecting the
    /// lock order. Returns the removed endpoint.
    fn detach(&self, id: &str, pred: impl Fn(&Endpoint) -> bool) -> Option<Endpoint> {
        let key = self
            .inner
            .endpoints
            .get(id)
            .map(|ep| (ep.name.clone(), ep.domain.clone()))?;

        let removed = match self.inner.names.entry(key) {
            Entry::Occupied(slot) if slot.get() == id => {
                let removed = self.inner.endpoints.remove_if(id, |_, ep| pred(ep));
                if removed.is_some() {
                    slot.remove();
                }
                removed
            }
            // Index already points elsewhere; just drop the orphan.
            _ => self.inner.endpoints.remove_if(id, |_, ep| pred(ep)),
        };

        let (_, endpoint) = removed?;
        self.cancel_probe(id);
        Some(endpoint)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Live endpoints in registration order.
    fn live_endpoints(&self) -> Vec<Endpoint> {
        let now = Instant::now();
        let mut live: Vec<Endpoint> = self
            .inner
            .endpoints
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value().clone())
            .collect();
        live.sort_by_key(|ep| ep.seq);
        live
    }

    /// Endpoints whose registration attributes satisfy every filter. A
    /// filter naming something that is not a registration attribute is
    /// satisfied by any one of the endpoint's resources.
    pub fn lookup_endpoints(&self, query: &LookupQuery) -> Vec<Endpoint> {
        let matched = self
            .live_endpoints()
            .into_iter()
            .filter(|ep| {
                query.filters.iter().all(|f| match ep.attribute(&f.name) {
                    Some(value) => f.matches(Some(&value)),
                    None => ep
                        .resources
                        .iter()
                        .any(|link| f.matches(link_attribute(link, &f.name).as_deref())),
                })
            })
            .collect();
        query.paginate(matched)
    }

    /// Resources whose parameters satisfy every filter. `ep`, `d`, `et` and
    /// other registration attributes are taken from the owning endpoint when
    /// the link does not carry them itself.
    pub fn lookup_resources(&self, query: &LookupQuery) -> Vec<ResourceMatch> {
        let mut matched = Vec::new();
        for ep in self.live_endpoints() {
            for link in &ep.resources {
                let hit = query.matches(|name| {
                    link_attribute(link, name).or_else(|| match name {
                        "href" => None,
                        _ => ep.attribute(name),
                    })
                });
                if hit {
                    matched.push(ResourceMatch {
                        endpoint_id: ep.id.clone(),
                        endpoint: ep.name.clone(),
                        domain: ep.domain.clone(),
                        context: ep.context.clone(),
                        link: link.clone(),
                    });
                }
            }
        }
        query.paginate(matched)
    }

    /// Distinct domains of endpoints matching the query, sorted.
    pub fn lookup_domains(&self, query: &LookupQuery) -> Vec<String> {
        let unpaged = LookupQuery {
            filters: query.filters.clone(),
            page: None,
            count: None,
        };
        let mut domains: Vec<String> = self
            .lookup_endpoints(&unpaged)
            .into_iter()
            .map(|ep| ep.domain)
            .collect();
        domains.sort();
        domains.dedup();
        query.paginate(domains)
    }

    // ── Expiry ───────────────────────────────────────────────────────────────

    /// Remove every endpoint expired at `now`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .inner
            .endpoints
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            // Re-checked under the entry lock: a refresh may have won the race.
            if let Some(ep) = self.detach(&id, |ep| ep.is_expired(now)) {
                tracing::info!(id = %ep.id, ep = %ep.name, d = %ep.domain, "endpoint expired");
                self.emit(RegistryEvent::Expired {
                    id: ep.id,
                    ep: ep.name,
                    d: ep.domain,
                });
                removed += 1;
            }
        }
        removed
    }

    // ── Discovery probes ─────────────────────────────────────────────────────

    fn spawn_probe(&self, id: &str, generation: u64, target: UriRef) {
        let Some(prober) = self.inner.prober.clone() else {
            tracing::debug!(%id, "no prober configured, resources stay as registered");
            return;
        };

        let registry = self.clone();
        let task_id = id.to_string();
        let timeout = self.inner.probe_timeout;
        tracing::debug!(%id, target = %target, "starting resource discovery");

        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, prober.probe(target.clone())).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::TimedOut(timeout)),
            };
            match outcome {
                Ok(links) => registry.commit_probe(&task_id, generation, links),
                Err(e) => {
                    tracing::warn!(id = %task_id, target = %target, error = %e, "resource discovery failed")
                }
            }
            registry
                .inner
                .probes
                .remove_if(&task_id, |_, (g, _)| *g == generation);
        });

        if let Some((_, previous)) = self
            .inner
            .probes
            .insert(id.to_string(), (generation, handle.abort_handle()))
        {
            previous.abort();
        }
        // A probe that finished before it was recorded cannot clear itself.
        if handle.is_finished() {
            self.inner.probes.remove_if(id, |_, (g, _)| *g == generation);
        }
    }

    /// Store probed resources unless the registration has gone, expired, or
    /// had its resources set since the probe started.
    fn commit_probe(&self, id: &str, generation: u64, links: Vec<ResourceLink>) {
        let now = Instant::now();
        let committed = match self.inner.endpoints.get_mut(id) {
            Some(mut ep) if ep.resource_generation == generation && !ep.is_expired(now) => {
                ep.resources = links;
                Some(ep.resources.len())
            }
            _ => None,
        };
        match committed {
            Some(resources) => self.emit(RegistryEvent::ResourcesProbed {
                id: id.to_string(),
                resources,
            }),
            None => tracing::debug!(%id, "discarding superseded discovery result"),
        }
    }

    fn cancel_probe(&self, id: &str) {
        if let Some((_, (_, handle))) = self.inner.probes.remove(id) {
            handle.abort();
        }
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Link parameter by name; `href` is the link target.
fn link_attribute(link: &ResourceLink, name: &str) -> Option<String> {
    match name {
        "href" => Some(link.href.clone()),
        _ => link.param(name).map(str::to_string),
    }
}

/// 16 hex digits of BLAKE3 over name, domain and a process-wide counter, so
/// an id is never handed out twice.
fn registration_id(name: &str, domain: &str, seq: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(&[0]);
    hasher.update(domain.as_bytes());
    hasher.update(&[0]);
    hasher.update(&seq.to_be_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no registration {0}")]
    NotFound(String),
}
