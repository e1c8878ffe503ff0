//! Lookup interface and directory discovery over CoAP.

use rd_core::{Method, Status};

use crate::{links, register, Client, Directory};

async fn populated() -> (Directory, Client, String, String) {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();
    let lab = register(
        &client,
        "node1",
        "lab",
        "</temp>;rt=temperature,</light>;rt=light-lux",
    )
    .await
    .unwrap();
    let office = register(&client, "node2", "office", "</temp>;rt=temperature")
        .await
        .unwrap();
    (rd, client, lab, office)
}

#[tokio::test]
async fn endpoint_lookup_by_domain() {
    let (rd, client, lab, _) = populated().await;

    let resp = client
        .send(&client.request(Method::Get, "rd-lookup/ep").with_query("d", "lab"))
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Content);
    let found = links(&resp);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].href, format!("/{}", lab));
    assert_eq!(found[0].param("ep"), Some("node1"));
    assert_eq!(found[0].param("d"), Some("lab"));

    // Endpoints can be found by the resources they host.
    let resp = client
        .send(&client.request(Method::Get, "rd-lookup/ep").with_query("rt", "light*"))
        .await
        .unwrap();
    assert_eq!(links(&resp).len(), 1);

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn resource_lookup_with_wildcard_and_paging() {
    let (rd, client, _, _) = populated().await;
    let port = client.local_addr().unwrap().port();

    let resp = client
        .send(&client.request(Method::Get, "rd-lookup/res").with_query("rt", "temp*"))
        .await
        .unwrap();
    let found = links(&resp);
    assert_eq!(found.len(), 2);
    for link in &found {
        assert_eq!(link.href, format!("coap://127.0.0.1:{}/temp", port));
        assert_eq!(link.param("anchor"), Some(format!("coap://127.0.0.1:{}", port).as_str()));
    }

    let resp = client
        .send(
            &client
                .request(Method::Get, "rd-lookup/res")
                .with_query("rt", "temperature")
                .with_query("d", "office"),
        )
        .await
        .unwrap();
    assert_eq!(links(&resp).len(), 1);

    let all = links(
        &client
            .send(&client.request(Method::Get, "rd-lookup/res"))
            .await
            .unwrap(),
    );
    assert_eq!(all.len(), 3);

    let page = links(
        &client
            .send(
                &client
                    .request(Method::Get, "rd-lookup/res")
                    .with_query("count", "2")
                    .with_query("page", "1"),
            )
            .await
            .unwrap(),
    );
    assert_eq!(page, all[2..].to_vec());

    let resp = client
        .send(&client.request(Method::Get, "rd-lookup/res").with_query("page", "x"))
        .await
        .unwrap();
    assert_eq!(resp.status, Status::BadRequest);

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn domain_lookup_lists_each_domain_once() {
    let (rd, client, _, _) = populated().await;
    register(&client, "node3", "lab", "</x>").await.unwrap();

    let resp = client
        .send(&client.request(Method::Get, "rd-lookup/d"))
        .await
        .unwrap();
    let domains: Vec<String> = links(&resp)
        .iter()
        .filter_map(|l| l.param("d").map(str::to_string))
        .collect();
    assert_eq!(domains, vec!["lab".to_string(), "office".to_string()]);

    rd.stop().await.unwrap();
}

#[tokio::test]
async fn well_known_core_advertises_directory() {
    let rd = Directory::start().await.unwrap();
    let client = Client::connect(rd.addr).await.unwrap();

    let resp = client
        .send(&client.request(Method::Get, ".well-known/core"))
        .await
        .unwrap();
    let hrefs: Vec<String> = links(&resp).into_iter().map(|l| l.href).collect();
    assert_eq!(hrefs, vec!["/rd", "/rd-lookup/ep", "/rd-lookup/res", "/rd-lookup/d"]);

    let resp = client
        .send(&client.request(Method::Get, ".well-known/core").with_query("rt", "core.rd"))
        .await
        .unwrap();
    let only = links(&resp);
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].href, "/rd");

    rd.stop().await.unwrap();
}
