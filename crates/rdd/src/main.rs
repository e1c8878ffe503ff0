//! rdd — CoAP resource directory daemon.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use rd_core::config::RdConfig;
use rd_services::{events, listener, sweeper, CoapListener, CoapProber, Registry, RegistryDefaults, Router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RdConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RdConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RdConfig::default()
    });

    // Bind CoAP socket
    let bind = SocketAddr::new(config.network.bind_addr, config.network.coap_port);
    let socket = Arc::new(listener::bind_socket(bind).context("failed to bind CoAP socket")?);
    let coap_addr = socket.local_addr()?;
    tracing::info!(
        %coap_addr,
        domain = %config.registry.default_domain,
        lifetime = config.registry.default_lifetime,
        "rdd starting"
    );

    // Shared state
    let registry = Registry::with_prober(
        RegistryDefaults::from(&config.registry),
        Arc::new(CoapProber::new(&config.probe)),
        config.probe.timeout(),
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    {
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received");
                let _ = tx.send(());
            }
        });
    }
    // Subscribe before any task can send.
    let mut shutdown_rx = shutdown_tx.subscribe();

    // ── Tasks ────────────────────────────────────────────────────────────────

    let events_task = tokio::spawn(events::log_loop(registry.subscribe(), shutdown_tx.subscribe()));

    let expiry_task = tokio::spawn(sweeper::expiry_loop(
        registry.clone(),
        config.registry.sweep_interval(),
        shutdown_tx.subscribe(),
    ));

    let listener_task = {
        let listener = CoapListener::new(socket, Router::new(registry.clone()), shutdown_tx.subscribe());
        tokio::spawn(listener.run())
    };

    let api_task = {
        let state = rd_api::ApiState {
            registry: registry.clone(),
            coap_addr,
            started_at: Instant::now(),
            shutdown_tx: shutdown_tx.clone(),
        };
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = rd_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = listener_task      => tracing::error!("CoAP listener exited: {:?}", r),
        r = expiry_task        => tracing::error!("expiry task exited: {:?}", r),
        r = events_task        => tracing::error!("event logger exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
    }

    tracing::info!(registrations = registry.len(), "rdd stopped");
    Ok(())
}
