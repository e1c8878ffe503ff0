//! Registration lifecycle over CoAP.

use rd_core::{ContentFormat, Method, ResourceLink, Status};

use crate::{links, register, Client, Directory};

#[tokio::test]
async fn register_read_update_remove() {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    let location = register(
        &client,
        "node1",
        "lab",
        "</sensors/temp>;rt=temperature;if=sensor,</sensors/light>;rt=light-lux",
    )
    .await
    .unwrap();
    assert!(location.starts_with("rd/"));
    assert_eq!(location.len(), "rd/".len() + 16);

    let resp = client.send(&client.request(Method::Get, &location)).await.unwrap();
    assert_eq!(resp.status, Status::Content);
    assert_eq!(resp.content_format(), Some(ContentFormat::LinkFormat));
    let read = links(&resp);
    assert_eq!(read.len(), 2);
    assert_eq!(
        read[0],
        ResourceLink::new("/sensors/temp")
            .with_param("rt", "temperature")
            .with_param("if", "sensor")
    );

    // Refresh with a new lifetime and a replacement link list.
    let update = client
        .request(Method::Post, &location)
        .with_query("lt", "600")
        .with_payload(ContentFormat::LinkFormat, "</sensors/humidity>;rt=humidity");
    let resp = client.send(&update).await.unwrap();
    assert_eq!(resp.status, Status::Changed);

    let id = location.trim_start_matches("rd/");
    let ep = rd.registry.get(id).unwrap();
    assert_eq!(ep.lifetime, 600);
    assert_eq!(ep.resources, vec![ResourceLink::new("/sensors/humidity").with_param("rt", "humidity")]);

    // PATCH merges by href.
    let patch = client
        .request(Method::Patch, &location)
        .with_payload(ContentFormat::LinkFormat, "</sensors/humidity>;rt=rh,</sensors/co2>");
    let resp = client.send(&patch).await.unwrap();
    assert_eq!(resp.status, Status::Changed);
    let ep = rd.registry.get(id).unwrap();
    assert_eq!(ep.resources.len(), 2);
    assert_eq!(ep.resources[0].param("rt"), Some("rh"));

    let resp = client.send(&client.request(Method::Delete, &location)).await.unwrap();
    assert_eq!(resp.status, Status::Deleted);

    let resp = client.send(&client.request(Method::Get, &location)).await.unwrap();
    assert_eq!(resp.status, Status::NotFound);

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn reregistration_keeps_location() {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    let first = register(&client, "node1", "lab", "</a>").await.unwrap();
    let second = register(&client, "node1", "lab", "</b>").await.unwrap();
    assert_eq!(first, second);

    let resp = client.send(&client.request(Method::Get, &second)).await.unwrap();
    assert_eq!(resp.body_text(), "</b>");

    let other = register(&client, "node1", "office", "</a>").await.unwrap();
    assert_ne!(first, other);
    assert_eq!(rd.registry.len(), 2);

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    // No endpoint name.
    let resp = client
        .send(&client.request(Method::Post, "rd").with_payload(ContentFormat::LinkFormat, "</a>"))
        .await
        .unwrap();
    assert_eq!(resp.status, Status::BadRequest);

    // Lifetime below the minimum.
    let resp = client
        .send(
            &client
                .request(Method::Post, "rd")
                .with_query("ep", "node1")
                .with_query("lt", "10")
                .with_payload(ContentFormat::LinkFormat, "</a>"),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, Status::BadRequest);

    // CBOR payloads are not accepted.
    let resp = client
        .send(
            &client
                .request(Method::Post, "rd")
                .with_query("ep", "node1")
                .with_payload(ContentFormat::LinkFormatCbor, vec![0x80]),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, Status::UnsupportedFormat);

    let resp = client.send(&client.request(Method::Put, "rd")).await.unwrap();
    assert_eq!(resp.status, Status::MethodNotAllowed);

    let resp = client.send(&client.request(Method::Get, "nowhere")).await.unwrap();
    assert_eq!(resp.status, Status::NotFound);

    assert!(rd.registry.is_empty());
    rd.stop().await.unwrap();
}

#[tokio::test]
async fn json_registration_reads_back_as_json() {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    let req = client
        .request(Method::Post, "rd")
        .with_query("ep", "node1")
        .with_payload(ContentFormat::LinkFormatJson, r#"[{"href":"/temp","rt":"temperature"}]"#);
    let resp = client.send(&req).await.unwrap();
    assert_eq!(resp.status, Status::Created);

    let mut read = client.request(Method::Get, &resp.location_path());
    read.accept = Some(ContentFormat::LinkFormatJson);
    let resp = client.send(&read).await.unwrap();
    assert_eq!(resp.content_format(), Some(ContentFormat::LinkFormatJson));
    assert_eq!(resp.body_text(), r#"[{"href":"/temp","rt":"temperature"}]"#);

    rd.stop().await.unwrap();
}
