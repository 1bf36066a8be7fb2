//! Dispatch over a real socket: matching, body, auth and handler failures.

use std::net::SocketAddr;

use routekit::router::{RouterSettings, RunOptions};

mod common;

use common::{http_client, start_server, Item};

#[tokio::test]
async fn test_api_roundtrip() {
    let addr: SocketAddr = "127.0.0.1:28301".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;
    let client = http_client();

    let created = client
        .post(server.url("/items"))
        .json(&Item::new(1, "a", "first"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(created.status(), 200);
    assert_eq!(
        created.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert!(created.headers().contains_key("x-request-id"));
    assert_eq!(created.json::<Item>().await.unwrap(), Item::new(1, "a", "first"));

    let fetched = client.get(server.url("/items/1")).send().await.unwrap();
    assert_eq!(fetched.status(), 200);
    assert_eq!(fetched.json::<Item>().await.unwrap().v, "first");

    let listed = client.get(server.url("/items?owner=b")).send().await.unwrap();
    assert_eq!(listed.json::<Vec<Item>>().await.unwrap(), Vec::<Item>::new());
}

#[tokio::test]
async fn test_misses_and_failures() {
    let addr: SocketAddr = "127.0.0.1:28302".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;
    let client = http_client();

    let unmatched = client.get(server.url("/nothing/here")).send().await.unwrap();
    assert_eq!(unmatched.status(), 404);
    assert_eq!(unmatched.text().await.unwrap(), "Not found");

    // Capture fails to parse, so the route does not match at all.
    let not_a_number = client.get(server.url("/items/abc")).send().await.unwrap();
    assert_eq!(not_a_number.status(), 404);
    assert_eq!(not_a_number.text().await.unwrap(), "Not found");

    let missing = client.get(server.url("/items/99")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.text().await.unwrap(), "Server error: no such item");

    let bad_json = client
        .post(server.url("/items"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_json.status(), 400);
    assert!(bad_json
        .text()
        .await
        .unwrap()
        .starts_with("Error while parsing body. Invalid Json!"));

    let wrong_shape = client
        .post(server.url("/items"))
        .body(r#"{"id":"x"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_shape.status(), 400);
    assert!(wrong_shape
        .text()
        .await
        .unwrap()
        .starts_with("Error decoding body"));
}

#[tokio::test]
async fn test_authorization_outcomes() {
    let addr: SocketAddr = "127.0.0.1:28303".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;
    let client = http_client();

    client
        .post(server.url("/items"))
        .json(&Item::new(5, "a", "x"))
        .send()
        .await
        .unwrap();

    let refused = client.delete(server.url("/items/5")).send().await.unwrap();
    assert_eq!(refused.status(), 401);
    assert_eq!(
        refused.text().await.unwrap(),
        "Failed to authorize: missing or wrong token"
    );

    let broken = client
        .delete(server.url("/items/5"))
        .bearer_auth("broken")
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), 500);
    assert_eq!(
        broken.text().await.unwrap(),
        "Server error: token store offline"
    );

    let allowed = client
        .delete(server.url("/items/5"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    assert_eq!(allowed.text().await.unwrap(), "");

    let gone = client.get(server.url("/items/5")).send().await.unwrap();
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn test_pages_and_login_redirect() {
    let addr: SocketAddr = "127.0.0.1:28304".parse().unwrap();
    let options = RunOptions {
        redirect_on_unauthorized_page: Some("/login".into()),
    };
    let server = start_server(addr, options, RouterSettings::default()).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap();

    let page = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(
        page.text().await.unwrap(),
        "<!DOCTYPE html><html><body>0 items</body></html>"
    );

    let redirected = client.get(server.url("/admin")).send().await.unwrap();
    assert_eq!(redirected.status(), 302);
    assert_eq!(redirected.headers()["location"], "/login");

    let admitted = client
        .get(server.url("/admin"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert!(admitted.text().await.unwrap().contains("hello admin"));
}
