//! Prometheus metrics definitions and collection logic.
//!
//! [`PbmMetrics`] owns the registry and every gauge the exporter emits.
//! [`MetricsCollector`] ties a [`StatusSource`] to the projection and is what
//! the HTTP layer calls on each scrape.

use crate::error::{PbmError, Result};
use crate::projection::ProjectionContext;
use crate::source::StatusSource;
use chrono::Utc;
use prometheus::{Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Every gauge the exporter emits, registered on a private registry.
pub struct PbmMetrics {
    registry: Registry,

    // Backup metrics
    pub(crate) snapshots_total: GaugeVec,
    pub(crate) snapshots: GaugeVec,
    pub(crate) last_snapshot: GaugeVec,
    pub(crate) last_snapshot_error: Gauge,
    pub(crate) last_snapshot_since_seconds: Gauge,

    // Node metrics
    pub(crate) nodes_total: GaugeVec,
    pub(crate) nodes: GaugeVec,

    // PITR metrics
    pub(crate) pitr_chunks_total: Gauge,
    pub(crate) pitr_error: Gauge,
    pub(crate) last_pitr_chunk_since_seconds: Gauge,
}

impl PbmMetrics {
    /// Create and register all gauges.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let snapshots_total = register_gauge_vec(
            &registry,
            "pbm_snapshots_total",
            "Number of snapshots per status",
            &["status"],
        )?;
        let snapshots = register_gauge_vec(
            &registry,
            "pbm_snapshots",
            "Detail of snapshots with statuses",
            &["name", "status"],
        )?;
        let last_snapshot = register_gauge_vec(
            &registry,
            "pbm_last_snapshot",
            "Status of last snapshot",
            &["status"],
        )?;
        let last_snapshot_error = register_gauge(
            &registry,
            "pbm_last_snapshot_error",
            "1 if last snapshot is in error",
        )?;
        let last_snapshot_since_seconds = register_gauge(
            &registry,
            "pbm_last_snapshot_since_seconds",
            "Time since last snapshot",
        )?;

        let nodes_total = register_gauge_vec(
            &registry,
            "pbm_nodes_total",
            "Number of nodes per status",
            &["status"],
        )?;
        let nodes = register_gauge_vec(
            &registry,
            "pbm_nodes",
            "Detail of nodes with statuses",
            &["rs", "host", "status"],
        )?;

        let pitr_chunks_total =
            register_gauge(&registry, "pbm_pitr_chunks_total", "Number of PITR chunks")?;
        let pitr_error = register_gauge(&registry, "pbm_pitr_error", "1 if PITR is in error")?;
        let last_pitr_chunk_since_seconds = register_gauge(
            &registry,
            "pbm_last_pitr_chunk_since_seconds",
            "Time since last PITR chunk",
        )?;

        Ok(Self {
            registry,
            snapshots_total,
            snapshots,
            last_snapshot,
            last_snapshot_error,
            last_snapshot_since_seconds,
            nodes_total,
            nodes,
            pitr_chunks_total,
            pitr_error,
            last_pitr_chunk_since_seconds,
        })
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .map_err(|e| PbmError::Metrics(e.to_string()))
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn register_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Fetches status and projects it, one scrape at a time.
pub struct MetricsCollector {
    source: Arc<dyn StatusSource>,
    // Held across fetch, projection and encoding so scrapes never interleave.
    state: Mutex<ProjectionContext>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(source: Arc<dyn StatusSource>) -> Result<Self> {
        Ok(Self {
            source,
            state: Mutex::new(ProjectionContext::new(PbmMetrics::new()?)),
        })
    }

    /// Refresh every gauge from a fresh status read.
    pub async fn collect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.collect_locked(&mut state).await
    }

    /// Refresh and render the registry. Nothing is rendered if the fetch fails.
    pub async fn scrape(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.collect_locked(&mut state).await?;

        state.metrics().encode().inspect_err(|e| {
            error!(phase = "encode", error = %e, "Failed to encode metrics");
        })
    }

    async fn collect_locked(&self, state: &mut ProjectionContext) -> Result<()> {
        debug!("Collecting metrics from PBM");

        let snapshot = self.source.fetch_status().await.inspect_err(|e| {
            error!(phase = "fetch", error = %e, "Failed to fetch PBM status");
        })?;

        debug!(
            backups = snapshot.backups.len(),
            nodes = snapshot.nodes.len(),
            pitr_enabled = snapshot.config.pitr.enabled,
            "Fetched PBM status"
        );

        state.project(&snapshot, Utc::now());
        info!("Successfully collected metrics");
        Ok(())
    }
}
