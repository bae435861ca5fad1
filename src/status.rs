//! Point-in-time view of PBM state.
//!
//! A [`StatusSnapshot`] is produced fresh by a [`crate::source::StatusSource`]
//! on every scrape and dropped once it has been projected onto the registry.

use serde::{Deserialize, Serialize};

/// Node status label for a healthy member.
pub const NODE_OK: &str = "ok";
/// Node status label for a member with any failing sub-check.
pub const NODE_ERROR: &str = "error";

/// Backup status that raises `pbm_last_snapshot_error`.
pub const BACKUP_ERROR: &str = "error";

/// Everything the projection needs from one status read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Tool-wide configuration
    pub config: PbmConfig,
    /// Backups, newest first by name
    pub backups: Vec<Backup>,
    /// One entry per cluster member running an agent
    pub nodes: Vec<Node>,
    /// Heartbeat of the node holding the PITR lock
    pub pitr_lock: Option<Heartbeat>,
    /// PITR chunk summary
    pub pitr_chunks: PitrChunks,
}

/// PBM configuration as far as the exporter cares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PbmConfig {
    #[serde(default)]
    pub pitr: PitrConfig,
}

/// Continuous capture settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitrConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// A single backup record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Backup name, an RFC 3339 timestamp of its creation
    pub name: String,
    /// Source-defined status (done, error, running, ...)
    pub status: String,
}

impl Backup {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Sub-checks reported for a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub agent_ok: bool,
    pub node_ok: bool,
    pub storage_ok: bool,
}

impl NodeHealth {
    pub fn healthy() -> Self {
        Self {
            agent_ok: true,
            node_ok: true,
            storage_ok: true,
        }
    }
}

/// A cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Replica set name
    pub rs: String,
    /// Member address
    pub node: String,
    pub health: NodeHealth,
}

impl Node {
    pub fn new(rs: impl Into<String>, node: impl Into<String>, health: NodeHealth) -> Self {
        Self {
            rs: rs.into(),
            node: node.into(),
            health,
        }
    }

    /// `ok` when every sub-check passes, `error` otherwise.
    pub fn status(&self) -> &'static str {
        let NodeHealth {
            agent_ok,
            node_ok,
            storage_ok,
        } = self.health;
        if agent_ok && node_ok && storage_ok {
            NODE_OK
        } else {
            NODE_ERROR
        }
    }

    /// Composite `rs/node` identifier used as the `host` label.
    pub fn host(&self) -> String {
        format!("{}/{}", self.rs, self.node)
    }
}

/// Lock heartbeat; `high` is the seconds part of the BSON timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub high: i64,
}

/// One captured oplog range, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitrChunk {
    pub start_ts: i64,
    pub end_ts: i64,
}

/// Chunk count plus the chunk with the greatest end timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitrChunks {
    /// Approximate number of chunks
    pub count: u64,
    pub last: Option<PitrChunk>,
}
