//! SSE channels over a real socket: handshake, filtered fan-out, replay, shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use routekit::client::WatchEvent;
use routekit::router::{RouterSettings, RunOptions};

mod common;

use common::{http_client, read_until, start_server, Item};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_fresh_subscriber_gets_handshake() {
    let addr: SocketAddr = "127.0.0.1:28311".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;
    server.feed.new_item(vec![WatchEvent::New(Item::new(1, "a", "x"))]);

    let mut response = http_client().get(server.url("/events")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let seen = read_until(&mut response, "id:1\n\n", WAIT).await;
    assert_eq!(seen, "\ndata:initlasteventid\nid:1\n\n");
}

#[tokio::test]
async fn test_live_batches_respect_filter() {
    let addr: SocketAddr = "127.0.0.1:28312".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;

    let mut response = http_client()
        .get(server.url("/events?owner=a"))
        .send()
        .await
        .unwrap();
    read_until(&mut response, "initlasteventid", WAIT).await;

    server.feed.new_item(vec![WatchEvent::New(Item::new(1, "b", "hidden"))]);
    server.feed.new_item(vec![
        WatchEvent::New(Item::new(2, "a", "shown")),
        WatchEvent::New(Item::new(3, "b", "hidden")),
    ]);

    let seen = read_until(&mut response, "id:2\n\n", WAIT).await;
    assert!(seen.contains("shown"));
    assert!(!seen.contains("hidden"));
    assert!(!seen.contains("id:1\n"));
}

#[tokio::test]
async fn test_reconnect_replays_missed_batches() {
    let addr: SocketAddr = "127.0.0.1:28313".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;
    for id in 1..=3 {
        server
            .feed
            .new_item(vec![WatchEvent::New(Item::new(id, "a", &format!("v{id}")))]);
    }

    let mut by_header = http_client()
        .get(server.url("/events"))
        .header("Last-Event-ID", "1")
        .send()
        .await
        .unwrap();
    let seen = read_until(&mut by_header, "id:3\n\n", WAIT).await;
    assert!(!seen.contains("initlasteventid"));
    assert!(!seen.contains("v1"));
    assert!(seen.contains("v2") && seen.contains("v3"));

    let mut by_query = http_client()
        .get(server.url("/events?last-event-id=2"))
        .send()
        .await
        .unwrap();
    let seen = read_until(&mut by_query, "id:3\n\n", WAIT).await;
    assert!(seen.contains("v3") && !seen.contains("v2"));

    // Caught up: nothing but the preamble.
    let mut current = http_client()
        .get(server.url("/events"))
        .header("Last-Event-ID", "3")
        .send()
        .await
        .unwrap();
    let seen = read_until(&mut current, "data:", Duration::from_millis(300)).await;
    assert_eq!(seen, "\n");
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let addr: SocketAddr = "127.0.0.1:28314".parse().unwrap();
    let server = start_server(addr, RunOptions::default(), RouterSettings::default()).await;

    let mut response = http_client().get(server.url("/events")).send().await.unwrap();
    read_until(&mut response, "initlasteventid", WAIT).await;
    assert_eq!(server.feed.subscriber_count(), 1);

    server.shutdown.trigger();
    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match response.chunk().await {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "stream stayed open after shutdown");
}
