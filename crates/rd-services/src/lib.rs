//! rd-services — the endpoint registry and everything that drives it:
//! lookup, discovery probes, expiry, request routing and the CoAP listener.

pub mod endpoint;
pub mod events;
pub mod listener;
pub mod lookup;
pub mod probe;
pub mod registry;
pub mod router;
pub mod sweeper;

pub use endpoint::Endpoint;
pub use events::RegistryEvent;
pub use listener::CoapListener;
pub use lookup::{LookupKind, LookupQuery};
pub use probe::{CoapProber, ProbeError, Prober};
pub use registry::{Registry, RegistryDefaults, RegistryError, ResourceMatch, SimpleOutcome};
pub use router::Router;
