//! Registry change notifications.
//!
//! The registry publishes on a broadcast channel; anything interested
//! (the daemon's log task, tests) subscribes. Sends never block and a send
//! with no subscribers is not an error.

use tokio::sync::broadcast;

pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { id: String, ep: String, d: String },
    Updated { id: String, ep: String, d: String },
    Removed { id: String, ep: String, d: String },
    Expired { id: String, ep: String, d: String },
    /// A discovery probe replaced the endpoint's resources.
    ResourcesProbed { id: String, resources: usize },
}

impl RegistryEvent {
    pub fn id(&self) -> &str {
        match self {
            RegistryEvent::Registered { id, .. }
            | RegistryEvent::Updated { id, .. }
            | RegistryEvent::Removed { id, .. }
            | RegistryEvent::Expired { id, .. }
            | RegistryEvent::ResourcesProbed { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::Registered { .. } => "registered",
            RegistryEvent::Updated { .. } => "updated",
            RegistryEvent::Removed { .. } => "removed",
            RegistryEvent::Expired { .. } => "expired",
            RegistryEvent::ResourcesProbed { .. } => "resources_probed",
        }
    }
}

/// Log every registry event until the channel closes or shutdown fires.
pub async fn log_loop(
    mut events: broadcast::Receiver<RegistryEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            event = events.recv() => match event {
                Ok(RegistryEvent::ResourcesProbed { id, resources }) => {
                    tracing::info!(%id, resources, "resources discovered");
                }
                Ok(event @ RegistryEvent::Updated { .. }) => {
                    tracing::debug!(id = event.id(), event = event.kind(), "registry event");
                }
                Ok(event) => {
                    tracing::info!(id = event.id(), event = event.kind(), "registry event");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}
