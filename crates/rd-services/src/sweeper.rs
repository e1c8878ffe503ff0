//! Periodic removal of expired registrations.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use crate::registry::Registry;

/// Sweep `registry` every `every` until shutdown.
pub async fn expiry_loop(registry: Registry, every: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("expiry sweeper shutting down");
                return;
            }
            _ = interval.tick() => {
                let before = registry.len();
                let removed = registry.sweep(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, remaining = before.saturating_sub(removed), "swept expired registrations");
                }
            }
        }
    }
}
