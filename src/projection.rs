//! Projection of a [`StatusSnapshot`] onto the metric registry.
//!
//! Label values are open-ended: backup statuses and node identities are only
//! known once observed. Every value ever emitted is remembered in a
//! [`LabelUniverse`] and explicitly zeroed on later polls when it is no longer
//! current, so dashboards never silently lose a series.

use crate::metrics::PbmMetrics;
use crate::status::{StatusSnapshot, BACKUP_ERROR, NODE_ERROR, NODE_OK};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Grace period after which a PITR heartbeat counts as stale.
pub const PITR_HEARTBEAT_GRACE_SECS: i64 = 30;

const NODE_STATUSES: [&str; 2] = [NODE_OK, NODE_ERROR];

/// Label values observed so far. Only grows.
#[derive(Debug, Default, Clone)]
pub struct LabelUniverse {
    statuses: BTreeSet<String>,
    nodes: BTreeSet<(String, String)>,
}

impl LabelUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backup statuses seen so far.
    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.statuses.iter().map(String::as_str)
    }

    /// Node identities `(rs, host)` seen so far.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes.iter().map(|(rs, host)| (rs.as_str(), host.as_str()))
    }

    fn add_status(&mut self, status: &str) {
        if !self.statuses.contains(status) {
            self.statuses.insert(status.to_string());
        }
    }

    fn add_node(&mut self, rs: &str, host: &str) {
        let key = (rs.to_string(), host.to_string());
        self.nodes.insert(key);
    }
}

/// Registry plus label memory; the only state that outlives a scrape.
///
/// `project` takes `&mut self`: the zero-then-set sequence below must not be
/// interleaved with another projection.
pub struct ProjectionContext {
    metrics: PbmMetrics,
    labels: LabelUniverse,
}

impl ProjectionContext {
    pub fn new(metrics: PbmMetrics) -> Self {
        Self {
            metrics,
            labels: LabelUniverse::new(),
        }
    }

    pub fn metrics(&self) -> &PbmMetrics {
        &self.metrics
    }

    pub fn labels(&self) -> &LabelUniverse {
        &self.labels
    }

    /// Apply a snapshot to the registry, as observed at `now`.
    pub fn project(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) {
        self.project_backups(snapshot, now);
        self.project_nodes(snapshot);

        if snapshot.config.pitr.enabled {
            self.project_pitr(snapshot, now);
        } else {
            debug!("PITR disabled, leaving PITR gauges untouched");
        }
    }

    fn project_backups(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) {
        let m = &self.metrics;

        for status in self.labels.statuses() {
            m.snapshots_total.with_label_values(&[status]).set(0.0);
            m.last_snapshot.with_label_values(&[status]).set(0.0);
            // A backup whose status changed must not keep its old series at 1
            for backup in &snapshot.backups {
                m.snapshots
                    .with_label_values(&[backup.name.as_str(), status])
                    .set(0.0);
            }
        }

        for backup in &snapshot.backups {
            self.labels.add_status(&backup.status);
            m.snapshots_total
                .with_label_values(&[backup.status.as_str()])
                .inc();
            m.snapshots
                .with_label_values(&[backup.name.as_str(), backup.status.as_str()])
                .set(1.0);
        }

        // Absence of backups is not a change: derived gauges keep their values
        let Some(last) = snapshot.backups.first() else {
            return;
        };

        m.last_snapshot
            .with_label_values(&[last.status.as_str()])
            .set(1.0);
        m.last_snapshot_error
            .set(if last.status == BACKUP_ERROR { 1.0 } else { 0.0 });

        match DateTime::parse_from_rfc3339(&last.name) {
            Ok(created) => {
                let elapsed = now.signed_duration_since(created.with_timezone(&Utc));
                let seconds = (elapsed.num_milliseconds() as f64 / 1000.0).round();
                m.last_snapshot_since_seconds.set(seconds);
            }
            Err(e) => {
                warn!(name = %last.name, error = %e, "Backup name is not a timestamp");
            }
        }
    }

    fn project_nodes(&mut self, snapshot: &StatusSnapshot) {
        let m = &self.metrics;

        for status in NODE_STATUSES {
            m.nodes_total.with_label_values(&[status]).set(0.0);
            for (rs, host) in self.labels.nodes() {
                m.nodes.with_label_values(&[rs, host, status]).set(0.0);
            }
        }

        for node in &snapshot.nodes {
            let status = node.status();
            let host = node.host();
            self.labels.add_node(&node.rs, &host);
            m.nodes_total.with_label_values(&[status]).inc();
            m.nodes
                .with_label_values(&[node.rs.as_str(), host.as_str(), status])
                .set(1.0);
        }
    }

    fn project_pitr(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) {
        let m = &self.metrics;
        let now_secs = round_to_secs(now);

        let stale = match snapshot.pitr_lock {
            None => true,
            Some(hb) => hb.high + PITR_HEARTBEAT_GRACE_SECS < now_secs,
        };
        debug!(
            stale,
            heartbeat_age = snapshot.pitr_lock.map(|hb| now_secs - hb.high),
            "PITR heartbeat"
        );
        m.pitr_error.set(if stale { 1.0 } else { 0.0 });

        m.pitr_chunks_total.set(snapshot.pitr_chunks.count as f64);

        if let Some(chunk) = snapshot.pitr_chunks.last {
            m.last_pitr_chunk_since_seconds
                .set((now_secs - chunk.end_ts) as f64);
        }
    }
}

fn round_to_secs(now: DateTime<Utc>) -> i64 {
    (now.timestamp_millis() as f64 / 1000.0).round() as i64
}
