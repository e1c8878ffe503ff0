//! Resource discovery probe: `GET /.well-known/core` against an endpoint.
//!
//! Used when an endpoint registers through `/.well-known/core` without a
//! payload. The registry runs each probe as its own task under an overall
//! timeout; this module only performs the exchange.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tokio::net::UdpSocket;

use rd_core::coap::{self, option, Code, Message, MessageType};
use rd_core::config::ProbeConfig;
use rd_core::exchange::{self, ContentFormat, PayloadError};
use rd_core::{ResourceLink, UriRef};

/// Fetches an endpoint's resource list.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, target: UriRef) -> BoxFuture<'static, Result<Vec<ResourceLink>, ProbeError>>;
}

/// Confirmable CoAP GET with RFC 7252 exponential back-off.
#[derive(Debug, Clone)]
pub struct CoapProber {
    ack_timeout: Duration,
    max_retransmit: u32,
}

impl CoapProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout(),
            max_retransmit: config.max_retransmit,
        }
    }
}

impl Prober for CoapProber {
    fn probe(&self, target: UriRef) -> BoxFuture<'static, Result<Vec<ResourceLink>, ProbeError>> {
        let prober = self.clone();
        Box::pin(async move { prober.fetch_core(&target).await })
    }
}

impl CoapProber {
    async fn fetch_core(&self, target: &UriRef) -> Result<Vec<ResourceLink>, ProbeError> {
        let peer = resolve_target(target).await?;
        let bind: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;

        let (message_id, token) = {
            let mut rng = rand::thread_rng();
            (rng.gen::<u16>(), rng.gen::<[u8; 4]>())
        };
        let mut request = Message::new(MessageType::Confirmable, Code::GET, message_id);
        request.token = token.to_vec();
        request.add_uri_path(".well-known/core");
        request.add_uint_option(option::ACCEPT, u32::from(ContentFormat::LinkFormat.number()));
        let datagram = request.encode()?;

        let factor = rand::thread_rng().gen_range(1.0..coap::ACK_RANDOM_FACTOR);
        let mut timeout = self.ack_timeout.mul_f64(factor);
        let mut buf = vec![0u8; coap::MAX_DATAGRAM];

        for attempt in 0..=self.max_retransmit {
            socket.send_to(&datagram, peer).await?;
            tracing::trace!(%peer, attempt, "probe sent");

            let deadline = tokio::time::Instant::now() + timeout;
            while let Ok(received) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                let (len, from) = received?;
                if from != peer {
                    continue;
                }
                let reply = match Message::decode(&buf[..len]) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "ignoring malformed probe reply");
                        continue;
                    }
                };

                match reply.mtype {
                    MessageType::Reset if reply.message_id == message_id => {
                        return Err(ProbeError::Reset);
                    }
                    MessageType::Acknowledgement
                        if reply.message_id == message_id && reply.code == Code::EMPTY =>
                    {
                        // Separate response follows; no more retransmissions.
                        return self.await_separate(&socket, peer, &token, &mut buf).await;
                    }
                    _ if reply.token == token && !reply.code.is_request() => {
                        return links_from(&reply);
                    }
                    _ => continue,
                }
            }
            timeout *= 2;
        }

        Err(ProbeError::NoResponse(self.max_retransmit + 1))
    }

    /// Wait for the response after an empty ACK. The caller's overall
    /// timeout bounds how long.
    async fn await_separate(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        token: &[u8],
        buf: &mut [u8],
    ) -> Result<Vec<ResourceLink>, ProbeError> {
        loop {
            let (len, from) = socket.recv_from(buf).await?;
            if from != peer {
                continue;
            }
            let Ok(reply) = Message::decode(&buf[..len]) else {
                continue;
            };
            if reply.token != token || reply.code.is_request() || reply.code == Code::EMPTY {
                continue;
            }
            if reply.mtype == MessageType::Confirmable {
                let ack = Message::empty_ack(reply.message_id).encode()?;
                socket.send_to(&ack, peer).await?;
            }
            return links_from(&reply);
        }
    }
}

fn links_from(reply: &Message) -> Result<Vec<ResourceLink>, ProbeError> {
    if reply.code != Code::CONTENT {
        return Err(ProbeError::ErrorResponse(reply.code));
    }
    let format = reply
        .uint_option(option::CONTENT_FORMAT)
        .and_then(|n| u16::try_from(n).ok())
        .map(ContentFormat::from_number);
    Ok(exchange::decode_links(format, &reply.payload)?)
}

async fn resolve_target(target: &UriRef) -> Result<SocketAddr, ProbeError> {
    match target.scheme.as_deref() {
        Some("coap") | None => {}
        Some(other) => return Err(ProbeError::UnsupportedScheme(other.to_string())),
    }
    let host = target
        .host()
        .ok_or_else(|| ProbeError::Unresolvable(target.to_string()))?;
    let port = target.port().unwrap_or(coap::DEFAULT_PORT);

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ProbeError::Unresolvable(target.to_string()))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("cannot resolve probe target {0}")]
    Unresolvable(String),

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("no response after {0} transmissions")]
    NoResponse(u32),

    #[error("probe rejected with reset")]
    Reset,

    #[error("endpoint answered {0}")]
    ErrorResponse(Code),

    #[error("probe timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Coap(#[from] coap::CoapError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn prober(ack_ms: u64, max_retransmit: u32) -> CoapProber {
        CoapProber {
            ack_timeout: Duration::from_millis(ack_ms),
            max_retransmit,
        }
    }

    /// Loopback endpoint that hands every request to `reply` and sends back
    /// whatever datagrams it returns.
    async fn fake_endpoint<F>(reply: F) -> (UriRef, Arc<AtomicUsize>)
    where
        F: Fn(usize, &Message) -> Vec<Message> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(msg) = Message::decode(&buf[..len]) else {
                    continue;
                };
                if !msg.code.is_request() {
                    continue;
                }
                let n = counter.fetch_add(1, Ordering::SeqCst);
                for out in reply(n, &msg) {
                    let _ = socket.send_to(&out.encode().unwrap(), from).await;
                }
            }
        });
        (UriRef::from_socket_addr("coap", addr), seen)
    }

    fn content(request: &Message, mtype: MessageType, body: &str) -> Message {
        let mid = if mtype == MessageType::Acknowledgement {
            request.message_id
        } else {
            request.message_id.wrapping_add(1000)
        };
        let mut m = Message::new(mtype, Code::CONTENT, mid);
        m.token = request.token.clone();
        m.add_uint_option(option::CONTENT_FORMAT, 40);
        m.payload = body.as_bytes().to_vec();
        m
    }

    #[tokio::test]
    async fn piggybacked_response() {
        let (target, _) = fake_endpoint(|_, req| {
            assert_eq!(
                req.option_values(option::URI_PATH).collect::<Vec<_>>(),
                vec![&b".well-known"[..], &b"core"[..]]
            );
            vec![content(req, MessageType::Acknowledgement, "</temp>;rt=temperature")]
        })
        .await;

        let links = prober(200, 2).probe(target).await.unwrap();
        assert_eq!(links, vec![ResourceLink::new("/temp").with_param("rt", "temperature")]);
    }

    #[tokio::test]
    async fn separate_response_after_empty_ack() {
        let (target, _) = fake_endpoint(|_, req| {
            vec![
                Message::empty_ack(req.message_id),
                content(req, MessageType::Confirmable, "</late>"),
            ]
        })
        .await;

        let links = prober(200, 2).probe(target).await.unwrap();
        assert_eq!(links[0].href, "/late");
    }

    #[tokio::test]
    async fn retransmits_until_answered() {
        let (target, seen) = fake_endpoint(|n, req| {
            if n < 2 {
                Vec::new()
            } else {
                vec![content(req, MessageType::Acknowledgement, "</a>")]
            }
        })
        .await;

        let links = prober(20, 4).probe(target).await.unwrap();
        assert_eq!(links[0].href, "/a");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retransmit() {
        let (target, seen) = fake_endpoint(|_, _| Vec::new()).await;
        let err = prober(10, 2).probe(target).await.unwrap_err();
        assert!(matches!(err, ProbeError::NoResponse(3)));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reset_and_error_codes() {
        let (target, _) = fake_endpoint(|_, req| vec![Message::reset(req.message_id)]).await;
        assert!(matches!(prober(200, 1).probe(target).await, Err(ProbeError::Reset)));

        let (target, _) = fake_endpoint(|_, req| {
            let mut m = Message::new(MessageType::Acknowledgement, Code::NOT_FOUND, req.message_id);
            m.token = req.token.clone();
            vec![m]
        })
        .await;
        assert!(matches!(
            prober(200, 1).probe(target).await,
            Err(ProbeError::ErrorResponse(Code::NOT_FOUND))
        ));
    }

    #[tokio::test]
    async fn rejects_other_schemes() {
        let target = UriRef::parse("http://192.0.2.1").unwrap();
        assert!(matches!(
            prober(10, 0).probe(target).await,
            Err(ProbeError::UnsupportedScheme(s)) if s == "http"
        ));
    }
}
