//! `/metrics`, `/healthz`, and `/readyz` over a real listener.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crmetrics_controller::app_state::AppState;
use crmetrics_controller::cluster::{ClusterClient, MemoryCluster};
use crmetrics_controller::reconcile::Reconciler;
use crmetrics_controller::{config, router};

use support::id;

async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Plain HTTP/1.1 GET; returns the raw response text.
async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

fn state() -> AppState {
    AppState::new(config::load_from_str("version: 1\n").unwrap()).unwrap()
}

#[tokio::test]
async fn metrics_endpoint_renders_live_series() {
    let state = state();
    let cluster = Arc::new(MemoryCluster::new());
    let client: Arc<dyn ClusterClient> = cluster.clone();
    let reconciler = Reconciler::new(client, state.metrics());
    cluster.apply(&id("a"), 3);
    reconciler.reconcile(&id("a")).await.unwrap();

    let addr = serve(state).await;
    let resp = get(addr, "/metrics").await;

    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    assert!(resp
        .to_ascii_lowercase()
        .contains("content-type: text/plain; version=0.0.4; charset=utf-8"));
    assert!(resp.contains("# TYPE custom_resource_info gauge"));
    assert!(resp.contains(
        r#"custom_resource_info{group="cache.example.com",kind="Memcached",name="a",namespace="default"} 1"#
    ));
    assert!(resp.contains(r#"size_info{name="a",namespace="default"} 3"#));
    assert!(resp.contains(r#"sizing_actions_total{name="a",namespace="default"} 1"#));
    assert!(resp.contains("# TYPE size_drift summary"));
}

#[tokio::test]
async fn deleted_resource_disappears_from_scrape() {
    let state = state();
    let cluster = Arc::new(MemoryCluster::new());
    let client: Arc<dyn ClusterClient> = cluster.clone();
    let reconciler = Reconciler::new(client, state.metrics());
    cluster.apply(&id("gone"), 1);
    reconciler.reconcile(&id("gone")).await.unwrap();
    cluster.request_delete(&id("gone"));
    reconciler.reconcile(&id("gone")).await.unwrap();

    let addr = serve(state).await;
    let resp = get(addr, "/metrics").await;
    assert!(resp.starts_with("HTTP/1.1 200"));
    assert!(!resp.contains(r#"name="gone""#), "{resp}");
}

#[tokio::test]
async fn readiness_follows_the_registry() {
    let state = state();
    let registry = Arc::clone(state.registry());
    let addr = serve(state).await;

    assert!(get(addr, "/healthz").await.starts_with("HTTP/1.1 200"));
    let resp = get(addr, "/readyz").await;
    assert!(resp.starts_with("HTTP/1.1 503"), "{resp}");

    registry.mark_ready();
    let resp = get(addr, "/readyz").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
}
