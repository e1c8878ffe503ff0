//! Simple registration: POST to `/.well-known/core`, resources discovered by
//! the directory probing the endpoint back.

use std::time::Duration;

use tokio::net::UdpSocket;

use rd_core::coap::{option, Code, Message, MessageType};
use rd_core::{ContentFormat, IncomingRequest, Method, OutgoingResponse, ResourceLink, Status};

use crate::{Client, Directory, REPLY_TIMEOUT};

/// Wait until the registry holds `ep` with at least one resource.
async fn wait_for_resources(rd: &Directory, ep: &str) -> Vec<ResourceLink> {
    let deadline = tokio::time::Instant::now() + REPLY_TIMEOUT;
    loop {
        let found = rd
            .registry
            .lookup_endpoints(&rd_services::LookupQuery::default().filter("ep", ep));
        if let Some(endpoint) = found.first() {
            if !endpoint.resources.is_empty() {
                return endpoint.resources.clone();
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "probe never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn probe_fills_in_resources() {
    let rd = Directory::start_probing().await.unwrap();
    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let me = device.local_addr().unwrap();

    let token = [1, 2, 3, 4];
    let register = IncomingRequest::new(Method::Post, ".well-known/core", me)
        .with_query("ep", "sensor1")
        .to_message(MessageType::Confirmable, 0x1001, &token);
    device.send_to(&register.encode().unwrap(), rd.addr).await.unwrap();

    // Serve the directory's probe while waiting for our own response.
    let mut buf = vec![0u8; 2048];
    let mut response = None;
    let mut probed = false;
    while response.is_none() || !probed {
        let (len, from) = tokio::time::timeout(REPLY_TIMEOUT, device.recv_from(&mut buf))
            .await
            .expect("directory went quiet")
            .unwrap();
        let msg = Message::decode(&buf[..len]).unwrap();

        if msg.code.is_request() {
            let path: Vec<&[u8]> = msg.option_values(option::URI_PATH).collect();
            assert_eq!(path, vec![&b".well-known"[..], &b"core"[..]]);
            let mut reply = Message::new(MessageType::Acknowledgement, Code::CONTENT, msg.message_id);
            reply.token = msg.token.clone();
            reply.add_uint_option(option::CONTENT_FORMAT, 40);
            reply.payload = b"</temp>;rt=temperature,</fan>;if=actuator".to_vec();
            device.send_to(&reply.encode().unwrap(), from).await.unwrap();
            probed = true;
        } else if msg.token == token {
            response = Some(OutgoingResponse::from_message(&msg).unwrap());
        }
    }
    assert_eq!(response.unwrap().status, Status::Changed);

    let resources = wait_for_resources(&rd, "sensor1").await;
    assert_eq!(
        resources,
        vec![
            ResourceLink::new("/temp").with_param("rt", "temperature"),
            ResourceLink::new("/fan").with_param("if", "actuator"),
        ]
    );

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn simple_registration_with_payload_skips_probe() {
    let rd = Directory::start_probing().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    let req = client
        .request(Method::Post, ".well-known/core")
        .with_query("ep", "sensor2")
        .with_payload(ContentFormat::LinkFormat, "</temp>");
    let resp = client.send(&req).await.unwrap();
    assert_eq!(resp.status, Status::Created);
    assert_eq!(rd.registry.pending_probes(), 0);

    let found = rd
        .registry
        .lookup_endpoints(&rd_services::LookupQuery::default().filter("ep", "sensor2"));
    assert_eq!(found[0].resources, vec![ResourceLink::new("/temp")]);

    rd.stop().await.unwrap();
}
