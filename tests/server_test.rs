//! HTTP server endpoint tests

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use common::{cluster_snapshot, ScriptedSource};
use pbm_exporter::{metrics::MetricsCollector, server};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

fn collector(source: ScriptedSource) -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new(Arc::new(source)).unwrap())
}

async fn send(
    collector: Arc<MetricsCollector>,
    method: Method,
    uri: &str,
) -> (StatusCode, Option<String>, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = server::router(collector).oneshot(request).await.unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let collector = collector(ScriptedSource::always(cluster_snapshot()));

    let (status, content_type, body) = send(collector, Method::GET, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(prometheus::TEXT_FORMAT));
    assert!(body.contains("# HELP pbm_snapshots_total Number of snapshots per status"));
    assert!(body.contains("# TYPE pbm_snapshots_total gauge"));
    assert!(body.contains(r#"pbm_snapshots_total{status="done"} 1"#));
    assert!(body.contains(r#"pbm_last_snapshot{status="error"} 1"#));
    assert!(body.contains("pbm_last_snapshot_error 1"));
    assert!(body.contains(r#"pbm_nodes_total{status="error"} 1"#));
    assert!(body.contains(r#"pbm_nodes{host="rs0/mongo2:27017",rs="rs0",status="error"} 1"#));
}

#[tokio::test]
async fn test_fetch_failure_returns_500_with_empty_body() {
    let collector = collector(ScriptedSource::failing());

    let (status, _, body) = send(collector, Method::GET, "/metrics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_failure_after_success_renders_nothing() {
    let collector = collector(ScriptedSource::new(vec![Some(cluster_snapshot()), None]));

    let (status, _, _) = send(collector.clone(), Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(collector, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("pbm_"));
}

#[tokio::test]
async fn test_other_paths_and_methods_are_not_found() {
    let collector = collector(ScriptedSource::always(cluster_snapshot()));

    for (method, uri) in [
        (Method::GET, "/"),
        (Method::GET, "/health"),
        (Method::GET, "/metrics/extra"),
        (Method::HEAD, "/metrics"),
        (Method::POST, "/metrics"),
        (Method::DELETE, "/metrics"),
    ] {
        let (status, _, body) = send(collector.clone(), method.clone(), uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_scrapes_see_consistent_totals() {
    let collector = collector(ScriptedSource::always(cluster_snapshot()));

    let scrapes = (0..8).map(|_| {
        let collector = collector.clone();
        tokio::spawn(async move { collector.scrape().await.unwrap() })
    });

    for scrape in scrapes {
        let body = scrape.await.unwrap();
        assert!(body.contains(r#"pbm_snapshots_total{status="done"} 1"#));
        assert!(body.contains(r#"pbm_snapshots_total{status="error"} 1"#));
        assert!(body.contains(r#"pbm_nodes_total{status="ok"} 1"#));
    }
}

#[tokio::test]
async fn test_server_serves_and_shuts_down_gracefully() {
    let collector = collector(ScriptedSource::always(cluster_snapshot()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(server::serve(listener, collector, async move {
        let _ = stop_rx.await;
    }));

    let response = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("pbm_last_snapshot_since_seconds"));

    let missing = reqwest::get(format!("http://{}/nope", addr)).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    stop_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}
