//! rd-core — link-format codecs, URI references, CoAP framing and config.
//! All other resource directory crates depend on this one.

pub mod coap;
pub mod config;
pub mod exchange;
pub mod link_format;
pub mod link_json;
pub mod params;
pub mod uri;

pub use exchange::{ContentFormat, IncomingRequest, Method, OutgoingResponse, Status};
pub use link_format::{FormatError, ResourceLink};
pub use link_json::LinkJsonError;
pub use params::{RegistrationParams, ValidationError};
pub use uri::UriRef;
