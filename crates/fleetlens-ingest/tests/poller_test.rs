// Poller tests against a wiremock server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetlens_core::SourceTag;
use fleetlens_ingest::{BasicAuth, HttpPoller, PollerConfig};

#[tokio::test]
async fn poller_pushes_each_body_as_a_frame() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/map/locations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"data":[{"id":"1","lat":1.0,"lng":2.0}]}"#),
        )
        .mount(&server)
        .await;

    let url = format!("{}/api/map/locations", server.uri()).parse().unwrap();
    let config = PollerConfig::new(url, SourceTag::from("poll"))
        .with_interval(Duration::from_millis(25));

    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let poller = HttpPoller::spawn(config, tx, cancel).unwrap();

    // First fetch is immediate, then one per tick.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.source.as_str(), "poll");
    assert!(first.as_text().unwrap().contains("\"id\":\"1\""));

    let second = rx.recv().await.unwrap();
    assert!(second.as_text().is_some());

    poller.shutdown();
}

#[tokio::test]
async fn poller_sends_basic_auth_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odata/works"))
        .and(query_param("$format", "json"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1..)
        .mount(&server)
        .await;

    let url = format!("{}/odata/works", server.uri()).parse().unwrap();
    let config = PollerConfig::new(url, SourceTag::from("sap"))
        .with_interval(Duration::from_secs(3600))
        .with_basic_auth(BasicAuth::new("user", "pass"))
        .with_query(vec![("$format".into(), "json".into())]);

    let (tx, mut rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let poller = HttpPoller::spawn(config, tx, cancel).unwrap();

    assert!(rx.recv().await.is_some());
    poller.shutdown();
}

#[tokio::test]
async fn failed_poll_is_skipped_and_the_loop_survives() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .mount(&server)
        .await;

    let url = format!("{}/flaky", server.uri()).parse().unwrap();
    let config =
        PollerConfig::new(url, SourceTag::from("poll")).with_interval(Duration::from_millis(25));

    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let poller = HttpPoller::spawn(config, tx, cancel).unwrap();

    // The 500 produces no frame; the next tick's 200 does.
    let frame = rx.recv().await.unwrap();
    assert!(frame.as_text().unwrap().contains("ok"));

    poller.shutdown();
}
