//! CoAP server loop.
//!
//! Decodes each datagram, hands requests to the [`Router`] and answers on
//! the same socket: piggybacked in an ACK for confirmable requests, as a
//! NON for non-confirmable ones. Confirmable messages that cannot be parsed
//! (but have a readable header) and CoAP pings get a Reset.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use rd_core::coap::{self, Code, Message, MessageType};
use rd_core::exchange::{IncomingRequest, OutgoingResponse, Status};

use crate::router::Router;

/// Bind the CoAP socket. An unspecified IPv6 address also accepts IPv4.
pub fn bind_socket(addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    if addr.is_ipv6() {
        socket.set_only_v6(false).context("IPV6_V6ONLY")?;
    }
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({})", addr))?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

pub struct CoapListener {
    socket: Arc<UdpSocket>,
    router: Router,
    shutdown: broadcast::Receiver<()>,
}

impl CoapListener {
    pub fn new(socket: Arc<UdpSocket>, router: Router, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            socket,
            router,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; coap::MAX_DATAGRAM];
        if let Ok(addr) = self.socket.local_addr() {
            tracing::info!(%addr, "CoAP listener starting");
        }

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("CoAP listener shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    if let Some(reply) = self.handle_datagram(&buf[..len], peer) {
                        match reply.encode() {
                            Ok(bytes) => {
                                if let Err(e) = self.socket.send_to(&bytes, peer).await {
                                    tracing::warn!(%peer, error = %e, "send_to failed");
                                }
                            }
                            Err(e) => tracing::warn!(%peer, error = %e, "failed to encode reply"),
                        }
                    }
                }
            }
        }
    }

    /// The message to send back, if any.
    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) -> Option<Message> {
        let msg = match Message::decode(data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "malformed datagram");
                return match Message::peek_header(data) {
                    Some((MessageType::Confirmable, _, mid)) => Some(Message::reset(mid)),
                    _ => None,
                };
            }
        };

        match (msg.mtype, msg.code) {
            (MessageType::Confirmable, Code::EMPTY) => {
                tracing::trace!(%peer, "ping");
                return Some(Message::reset(msg.message_id));
            }
            (MessageType::Confirmable | MessageType::NonConfirmable, code) if code.is_request() => {}
            (mtype, code) => {
                tracing::trace!(%peer, ?mtype, %code, "ignoring non-request");
                return None;
            }
        }

        let response = match IncomingRequest::from_message(&msg, peer) {
            Ok(req) => {
                tracing::debug!(%peer, method = ?req.method, path = %req.path, "request");
                self.router.handle(&req)
            }
            Err(e) => OutgoingResponse::new(Status::BadRequest).with_diagnostic(e.to_string()),
        };

        let reply = if msg.mtype == MessageType::Confirmable {
            response.to_message(MessageType::Acknowledgement, msg.message_id, &msg.token)
        } else {
            let mid = rand::thread_rng().gen::<u16>();
            response.to_message(MessageType::NonConfirmable, mid, &msg.token)
        };
        Some(reply)
    }
}
