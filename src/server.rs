//! HTTP server for exposing Prometheus metrics.
//!
//! This module provides an Axum-based HTTP server that serves the `/metrics`
//! endpoint for Prometheus scraping. Every other path or method is a 404.

use crate::error::{PbmError, Result};
use crate::metrics::MetricsCollector;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared application state.
#[derive(Clone)]
struct AppState {
    collector: Arc<MetricsCollector>,
}

/// Build the exporter's router.
pub fn router(collector: Arc<MetricsCollector>) -> Router {
    let state = AppState { collector };

    Router::new()
        .route("/metrics", get(metrics_handler).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `listen_address` and serve until SIGINT or SIGTERM.
///
/// # Examples
///
/// ```no_run
/// use pbm_exporter::metrics::MetricsCollector;
/// use pbm_exporter::server::start_server;
/// use pbm_exporter::source::MongoSource;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MongoSource::new(
///         "mongodb://localhost:27017".to_string(),
///         Duration::from_secs(10),
///     );
///     let collector = MetricsCollector::new(Arc::new(source)).unwrap();
///     start_server("0.0.0.0:9090", Arc::new(collector)).await.unwrap();
/// }
/// ```
pub async fn start_server(listen_address: &str, collector: Arc<MetricsCollector>) -> Result<()> {
    info!("Starting HTTP server on {}", listen_address);
    let listener = TcpListener::bind(listen_address).await?;
    info!(
        "Prometheus exporter serving metrics on http://{}/metrics",
        listener.local_addr()?
    );

    serve(listener, collector, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// In-flight scrapes are allowed to finish before this returns.
pub async fn serve<F>(
    listener: TcpListener,
    collector: Arc<MetricsCollector>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(collector))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PbmError::Server(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM signal, shutting down gracefully..."),
    }
}

/// Handler for /metrics endpoint.
async fn metrics_handler(method: Method, State(state): State<AppState>) -> Response {
    // axum routes HEAD to GET handlers; only a real GET triggers a scrape
    if method != Method::GET {
        return not_found().await;
    }
    debug!("Received metrics scrape request");

    match state.collector.scrape().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        // Already logged with its phase by the collector
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}
