//! Lifetime expiry, driven through the router on a paused clock.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;

use rd_core::{ContentFormat, IncomingRequest, Method, Status};
use rd_services::{sweeper, Registry, RegistryDefaults, RegistryEvent, Router};

fn sender() -> SocketAddr {
    "192.0.2.7:5683".parse().unwrap()
}

fn register(router: &Router, ep: &str, lt: &str) -> String {
    let req = IncomingRequest::new(Method::Post, "rd", sender())
        .with_query("ep", ep)
        .with_query("lt", lt)
        .with_payload(ContentFormat::LinkFormat, "</a>");
    let resp = router.handle(&req);
    assert_eq!(resp.status, Status::Created);
    resp.location_path()
}

#[tokio::test(start_paused = true)]
async fn lapsed_registrations_disappear() {
    let registry = Registry::new(RegistryDefaults::default());
    let router = Router::new(registry.clone());
    let mut events = registry.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = tokio::spawn(sweeper::expiry_loop(
        registry.clone(),
        Duration::from_secs(1),
        shutdown_rx,
    ));

    let short = register(&router, "short", "60");
    let long = register(&router, "long", "3600");

    // Refreshing `short` at 50s pushes its expiry to 110s.
    tokio::time::sleep(Duration::from_secs(50)).await;
    let refresh = router.handle(&IncomingRequest::new(Method::Post, &short, sender()));
    assert_eq!(refresh.status, Status::Changed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let read = router.handle(&IncomingRequest::new(Method::Get, &short, sender()));
    assert_eq!(read.status, Status::Content);

    tokio::time::sleep(Duration::from_secs(32)).await;
    let read = router.handle(&IncomingRequest::new(Method::Get, &short, sender()));
    assert_eq!(read.status, Status::NotFound);
    assert_eq!(registry.len(), 1);

    let lookup = router.handle(&IncomingRequest::new(Method::Get, "rd-lookup/ep", sender()));
    assert_eq!(lookup.body_text(), format!("</{}>;ep=long;d=local;lt=3600;base=coap://192.0.2.7:5683", long));

    let mut expired = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RegistryEvent::Expired { ep, .. } = event {
            expired.push(ep);
        }
    }
    assert_eq!(expired, vec!["short".to_string()]);

    shutdown_tx.send(()).unwrap();
    sweeper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reregistering_after_expiry_gets_new_location() {
    let registry = Registry::new(RegistryDefaults::default());
    let router = Router::new(registry.clone());

    let first = register(&router, "node", "60");
    tokio::time::sleep(Duration::from_secs(61)).await;
    let second = register(&router, "node", "60");
    assert_ne!(first, second);

    let read = router.handle(&IncomingRequest::new(Method::Get, &first, sender()));
    assert_eq!(read.status, Status::NotFound);
    assert_eq!(registry.len(), 1);
}
