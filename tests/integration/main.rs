//! Resource directory integration test harness.
//!
//! Each test starts its own directory on a loopback UDP port and talks to it
//! as a CoAP client would. Nothing outside the process is required:
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use rd_core::coap::{Message, MessageType};
use rd_core::config::ProbeConfig;
use rd_core::{IncomingRequest, Method, OutgoingResponse, ResourceLink};
use rd_services::{listener, CoapListener, CoapProber, Registry, RegistryDefaults, Router};

mod expiry;
mod lookup;
mod registration;
mod simple;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for any single reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// A directory running in the background on 127.0.0.1.
pub struct Directory {
    pub addr: SocketAddr,
    pub registry: Registry,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl Directory {
    pub async fn start() -> Result<Self> {
        Self::start_with(Registry::new(RegistryDefaults::default())).await
    }

    /// Directory that probes endpoints registering without a payload.
    pub async fn start_probing() -> Result<Self> {
        let config = ProbeConfig {
            timeout_secs: 5,
            ack_timeout_ms: 200,
            max_retransmit: 2,
        };
        let registry = Registry::with_prober(
            RegistryDefaults::default(),
            Arc::new(CoapProber::new(&config)),
            config.timeout(),
        );
        Self::start_with(registry).await
    }

    async fn start_with(registry: Registry) -> Result<Self> {
        let socket = Arc::new(listener::bind_socket("127.0.0.1:0".parse()?)?);
        let addr = socket.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(
            CoapListener::new(socket, Router::new(registry.clone()), shutdown_rx).run(),
        );
        Ok(Self {
            addr,
            registry,
            shutdown_tx,
            task,
        })
    }

    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.task.await.context("listener task panicked")?
    }
}

/// A CoAP client bound to its own loopback port.
pub struct Client {
    socket: UdpSocket,
    server: SocketAddr,
}

impl Client {
    pub async fn connect(server: SocketAddr) -> Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind("127.0.0.1:0").await?,
            server,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// A request from this client; the directory sees our address as sender.
    pub fn request(&self, method: Method, path: &str) -> IncomingRequest {
        let sender = self
            .socket
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));
        IncomingRequest::new(method, path, sender)
    }

    /// Send a confirmable request and wait for the piggybacked response.
    pub async fn send(&self, req: &IncomingRequest) -> Result<OutgoingResponse> {
        let (mid, token) = {
            let mut rng = rand::thread_rng();
            (rng.gen::<u16>(), rng.gen::<[u8; 4]>())
        };
        let msg = req.to_message(MessageType::Confirmable, mid, &token);
        self.socket.send_to(&msg.encode()?, self.server).await?;

        let mut buf = vec![0u8; 2048];
        loop {
            let (len, _) = tokio::time::timeout(REPLY_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .context("no reply from directory")??;
            let reply = Message::decode(&buf[..len])?;
            if reply.message_id != mid || reply.token != token {
                continue;
            }
            if reply.mtype != MessageType::Acknowledgement {
                bail!("expected ACK, got {:?}", reply.mtype);
            }
            return Ok(OutgoingResponse::from_message(&reply)?);
        }
    }
}

/// Parse a link-format response body.
pub fn links(resp: &OutgoingResponse) -> Vec<ResourceLink> {
    rd_core::link_format::decode(&resp.body_text()).unwrap_or_default()
}

/// Register `ep` in `d` at `/rd` with a link-format payload; returns the
/// registration's location path.
pub async fn register(client: &Client, ep: &str, d: &str, payload: &str) -> Result<String> {
    let req = client
        .request(Method::Post, "rd")
        .with_query("ep", ep)
        .with_query("d", d)
        .with_payload(rd_core::ContentFormat::LinkFormat, payload.to_string());
    let resp = client.send(&req).await?;
    if resp.status != rd_core::Status::Created {
        bail!("registration of {} failed: {:?} {}", ep, resp.status, resp.body_text());
    }
    Ok(resp.location_path())
}
