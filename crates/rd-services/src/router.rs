//! Maps requests onto registry operations.
//!
//! | path                | method        | operation          |
//! |---------------------|---------------|--------------------|
//! | `.well-known/core`  | GET           | directory links    |
//! | `.well-known/core`  | POST          | simple registration|
//! | `rd`                | POST          | register           |
//! | `rd/{id}`           | GET           | read               |
//! | `rd/{id}`           | POST          | update             |
//! | `rd/{id}`           | DELETE        | remove             |
//! | `rd/{id}`           | PATCH, iPATCH | patch              |
//! | `rd-lookup/{ep,res,d}` | GET        | lookup             |

use url::Url;

use rd_core::exchange::{self, PayloadError};
use rd_core::{
    IncomingRequest, Method, OutgoingResponse, RegistrationParams, ResourceLink, Status,
    ValidationError,
};

use crate::endpoint::Endpoint;
use crate::lookup::{LookupKind, LookupQuery};
use crate::registry::{Registry, RegistryError, ResourceMatch, SimpleOutcome};

/// What the directory itself advertises under `/.well-known/core`.
pub fn directory_links() -> Vec<ResourceLink> {
    [
        ("/rd", "core.rd"),
        ("/rd-lookup/ep", "core.rd-lookup-ep"),
        ("/rd-lookup/res", "core.rd-lookup-res"),
        ("/rd-lookup/d", "core.rd-lookup-d"),
    ]
    .into_iter()
    .map(|(href, rt)| ResourceLink::new(href).with_param("rt", rt))
    .collect()
}

#[derive(Clone)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn handle(&self, req: &IncomingRequest) -> OutgoingResponse {
        let segments: Vec<&str> = req.segments().collect();

        let result = match (segments.as_slice(), req.method) {
            ([".well-known", "core"], Method::Get) => self.directory(req),
            ([".well-known", "core"], Method::Post) => self.register_simple(req),
            (["rd"], Method::Post) => self.register(req),
            (["rd", id], Method::Get) => self.read(req, id),
            (["rd", id], Method::Post) => self.update(req, id),
            (["rd", id], Method::Delete) => self.remove(id),
            (["rd", id], Method::Patch | Method::IPatch) => self.patch(req, id),
            (["rd-lookup", kind], Method::Get) => match LookupKind::from_segment(kind) {
                Some(kind) => self.lookup(req, kind),
                None => Err(RouteError::NoSuchPath),
            },
            ([".well-known", "core"] | ["rd"] | ["rd", _] | ["rd-lookup", "ep" | "res" | "d"], _) => {
                Err(RouteError::MethodNotAllowed)
            }
            _ => Err(RouteError::NoSuchPath),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(
                    method = ?req.method,
                    path = %req.path,
                    sender = %req.sender,
                    error = %e,
                    "request rejected"
                );
                e.into_response()
            }
        }
    }

    // ── Registration ─────────────────────────────────────────────────────────

    fn register(&self, req: &IncomingRequest) -> Result<OutgoingResponse, RouteError> {
        let params = RegistrationParams::from_query(&req.query)?;
        let resources = exchange::decode_links(req.content_format, &req.payload)?;
        let id = self.registry.register(params, resources, req.sender)?;
        Ok(OutgoingResponse::new(Status::Created).with_location(&format!("rd/{}", id)))
    }

    fn register_simple(&self, req: &IncomingRequest) -> Result<OutgoingResponse, RouteError> {
        let params = RegistrationParams::from_query(&req.query)?;
        let resources = payload_links(req)?;
        let status = match self.registry.register_simple(params, resources, req.sender)? {
            SimpleOutcome::Created(_) => Status::Created,
            SimpleOutcome::Changed(_) => Status::Changed,
        };
        Ok(OutgoingResponse::new(status))
    }

    fn update(&self, req: &IncomingRequest, id: &str) -> Result<OutgoingResponse, RouteError> {
        let params = RegistrationParams::from_query(&req.query)?;
        let resources = payload_links(req)?;
        self.registry.update(id, params, resources)?;
        Ok(OutgoingResponse::new(Status::Changed))
    }

    fn patch(&self, req: &IncomingRequest, id: &str) -> Result<OutgoingResponse, RouteError> {
        let links = exchange::decode_links(req.content_format, &req.payload)?;
        self.registry.patch(id, links)?;
        Ok(OutgoingResponse::new(Status::Changed))
    }

    fn remove(&self, id: &str) -> Result<OutgoingResponse, RouteError> {
        self.registry.remove(id)?;
        Ok(OutgoingResponse::new(Status::Deleted))
    }

    fn read(&self, req: &IncomingRequest, id: &str) -> Result<OutgoingResponse, RouteError> {
        let links = self.registry.read(id)?;
        content(req, &links)
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    fn directory(&self, req: &IncomingRequest) -> Result<OutgoingResponse, RouteError> {
        let query = LookupQuery::from_query(&req.query)?;
        let links: Vec<ResourceLink> = directory_links()
            .into_iter()
            .filter(|link| {
                query.matches(|name| match name {
                    "href" => Some(link.href.clone()),
                    _ => link.param(name).map(str::to_string),
                })
            })
            .collect();
        content(req, &links)
    }

    fn lookup(&self, req: &IncomingRequest, kind: LookupKind) -> Result<OutgoingResponse, RouteError> {
        let query = LookupQuery::from_query(&req.query)?;
        let links: Vec<ResourceLink> = match kind {
            LookupKind::Endpoint => self
                .registry
                .lookup_endpoints(&query)
                .iter()
                .map(endpoint_link)
                .collect(),
            LookupKind::Resource => self
                .registry
                .lookup_resources(&query)
                .iter()
                .map(resource_link)
                .collect(),
            LookupKind::Domain => self
                .registry
                .lookup_domains(&query)
                .into_iter()
                .map(|d| ResourceLink::new("/rd").with_param("d", d))
                .collect(),
        };
        content(req, &links)
    }
}

/// Resources carried by the request, or `None` when the payload holds no
/// links (empty, blank, or an empty list).
fn payload_links(req: &IncomingRequest) -> Result<Option<Vec<ResourceLink>>, PayloadError> {
    if req.payload.is_empty() {
        return Ok(None);
    }
    let links = exchange::decode_links(req.content_format, &req.payload)?;
    Ok((!links.is_empty()).then_some(links))
}

fn content(req: &IncomingRequest, links: &[ResourceLink]) -> Result<OutgoingResponse, RouteError> {
    let (format, body) = exchange::encode_links(req.accept, links)?;
    Ok(OutgoingResponse::new(Status::Content).with_body(format, body))
}

/// `</rd/ID>;ep=..;d=..;et=..;lt=..;base=..` plus any extra attributes.
pub fn endpoint_link(ep: &Endpoint) -> ResourceLink {
    let mut link = ResourceLink::new(format!("/{}", ep.location()))
        .with_param("ep", ep.name.as_str())
        .with_param("d", ep.domain.as_str());
    if let Some(et) = &ep.endpoint_type {
        link.set_param("et", et.as_str());
    }
    link.set_param("lt", ep.lifetime.to_string());
    link.set_param("base", ep.context.to_string());
    for (name, value) in &ep.attributes {
        link.set_param(name.as_str(), value.as_str());
    }
    link
}

/// The registered link with its target made absolute against the
/// endpoint's context, anchored at that context unless it names an anchor.
pub fn resource_link(m: &ResourceMatch) -> ResourceLink {
    let base = Url::parse(&m.context.to_string()).ok();
    let absolute = |reference: &str| {
        base.as_ref()
            .and_then(|base| base.join(reference).ok())
            .map(String::from)
            .unwrap_or_else(|| reference.to_string())
    };

    let mut link = ResourceLink::new(absolute(&m.link.href));
    link.params = m.link.params.clone();
    let anchor = match m.link.param("anchor") {
        Some(anchor) => absolute(anchor),
        None => m.context.to_string(),
    };
    link.set_param("anchor", anchor);
    link
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no such resource")]
    NoSuchPath,

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl RouteError {
    fn into_response(self) -> OutgoingResponse {
        let status = match &self {
            RouteError::Validation(_)
            | RouteError::Registry(RegistryError::Validation(_))
            | RouteError::Payload(PayloadError::Format(_) | PayloadError::Json(_)) => {
                Status::BadRequest
            }
            RouteError::Payload(PayloadError::Unsupported(_)) => Status::UnsupportedFormat,
            RouteError::Registry(RegistryError::NotFound(_)) | RouteError::NoSuchPath => {
                Status::NotFound
            }
            RouteError::MethodNotAllowed => Status::MethodNotAllowed,
        };
        OutgoingResponse::new(status).with_diagnostic(self.to_string())
    }
}
