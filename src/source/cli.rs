//! Status read by running `pbm status --out=json`.

use super::{StatusSource, MAX_RECORDS};
use crate::error::{PbmError, Result};
use crate::status::{
    Backup, Heartbeat, Node, NodeHealth, PbmConfig, PitrChunk, PitrChunks, PitrConfig,
    StatusSnapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Environment variable the pbm CLI reads its connection string from.
const PBM_URI_ENV: &str = "PBM_MONGODB_URI";

/// Runs the pbm CLI and maps its JSON status report.
pub struct CliSource {
    program: String,
    args: Vec<String>,
    uri: String,
}

impl CliSource {
    /// Run `<program> status --out=json`.
    pub fn new(program: String, uri: String) -> Self {
        Self::with_args(
            program,
            vec!["status".to_string(), "--out=json".to_string()],
            uri,
        )
    }

    pub fn with_args(program: String, args: Vec<String>, uri: String) -> Self {
        Self { program, args, uri }
    }
}

#[async_trait]
impl StatusSource for CliSource {
    async fn fetch_status(&self) -> Result<StatusSnapshot> {
        debug!(program = %self.program, args = ?self.args, "Running pbm status");

        let output = Command::new(&self.program)
            .args(&self.args)
            .env(PBM_URI_ENV, &self.uri)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PbmError::Command(format!("failed to run {}: {}", self.program, e)))?;

        // pbm reports most failures on stderr, sometimes with a zero exit code
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PbmError::Command(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(PbmError::Command(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let status: CliStatus = serde_json::from_slice(&output.stdout).map_err(|e| {
            let body = String::from_utf8_lossy(&output.stdout);
            PbmError::ParseError(format!(
                "{}. Output preview: {}...",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })?;

        Ok(status.into_snapshot(Utc::now().timestamp()))
    }
}

#[derive(Debug, Deserialize)]
struct CliStatus {
    #[serde(default)]
    cluster: Option<Vec<CliReplset>>,
    #[serde(default)]
    pitr: Option<CliPitr>,
    #[serde(default)]
    backups: Option<CliBackups>,
}

#[derive(Debug, Deserialize)]
struct CliReplset {
    rs: String,
    #[serde(default)]
    nodes: Option<Vec<CliNode>>,
}

#[derive(Debug, Deserialize)]
struct CliNode {
    host: String,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CliPitr {
    #[serde(default)]
    conf: bool,
    #[serde(default)]
    run: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CliBackups {
    #[serde(default)]
    snapshot: Option<Vec<CliSnapshot>>,
    #[serde(default, rename = "pitrChunks")]
    pitr_chunks: Option<CliChunks>,
}

#[derive(Debug, Deserialize)]
struct CliSnapshot {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CliChunks {
    #[serde(default, rename = "pitrChunks")]
    chunks: Option<Vec<CliChunk>>,
}

#[derive(Debug, Deserialize)]
struct CliChunk {
    range: CliRange,
}

#[derive(Debug, Deserialize)]
struct CliRange {
    start: i64,
    end: i64,
}

impl CliStatus {
    /// Map the report onto a snapshot; `fetched_at` stands in for the
    /// heartbeat, which the CLI only reports as a liveness flag.
    fn into_snapshot(self, fetched_at: i64) -> StatusSnapshot {
        let pitr = self.pitr;
        let enabled = pitr.as_ref().is_some_and(|p| p.conf);
        let pitr_lock = pitr
            .filter(|p| p.run && p.error.as_deref().unwrap_or_default().is_empty())
            .map(|_| Heartbeat { high: fetched_at });

        let nodes = self
            .cluster
            .unwrap_or_default()
            .into_iter()
            .flat_map(|replset| {
                let rs = replset.rs;
                replset
                    .nodes
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |node| {
                        let health = NodeHealth {
                            agent_ok: node.ok,
                            node_ok: node.errors.map_or(true, |e| e.is_empty()),
                            // not reported separately by the status command
                            storage_ok: true,
                        };
                        // pbm may report members as `rs/host:port`
                        let host = node
                            .host
                            .strip_prefix(&format!("{}/", rs))
                            .map(str::to_string)
                            .unwrap_or(node.host);
                        Node::new(rs.clone(), host, health)
                    })
            })
            .collect();

        let (snapshots, chunks) = match self.backups {
            Some(backups) => (
                backups.snapshot.unwrap_or_default(),
                backups
                    .pitr_chunks
                    .and_then(|c| c.chunks)
                    .unwrap_or_default(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let mut backups: Vec<Backup> = snapshots
            .into_iter()
            .map(|s| Backup::new(s.name, s.status))
            .collect();
        backups.sort_by(|a, b| b.name.cmp(&a.name));
        backups.truncate(MAX_RECORDS);

        let mut last: Option<PitrChunk> = None;
        for chunk in &chunks {
            if last.map_or(true, |l| chunk.range.end > l.end_ts) {
                last = Some(PitrChunk {
                    start_ts: chunk.range.start,
                    end_ts: chunk.range.end,
                });
            }
        }

        StatusSnapshot {
            config: PbmConfig {
                pitr: PitrConfig { enabled },
            },
            backups,
            nodes,
            pitr_lock,
            pitr_chunks: PitrChunks {
                count: chunks.len() as u64,
                last,
            },
        }
    }
}
