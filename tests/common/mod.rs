//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pbm_exporter::status::{Backup, Node, NodeHealth, PbmConfig, PitrConfig, StatusSnapshot};
use pbm_exporter::{source::StatusSource, PbmError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued snapshots; once one is left it is returned forever.
pub struct ScriptedSource {
    queue: Mutex<VecDeque<Option<StatusSnapshot>>>,
}

impl ScriptedSource {
    /// `None` entries make the fetch fail.
    pub fn new(script: Vec<Option<StatusSnapshot>>) -> Self {
        Self {
            queue: Mutex::new(script.into()),
        }
    }

    pub fn always(snapshot: StatusSnapshot) -> Self {
        Self::new(vec![Some(snapshot)])
    }

    pub fn failing() -> Self {
        Self::new(vec![None])
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self) -> Result<StatusSnapshot> {
        let next = {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().flatten()
            } else {
                queue.front().cloned().flatten()
            }
        };
        next.ok_or(PbmError::MissingConfig)
    }
}

pub fn cluster_snapshot() -> StatusSnapshot {
    StatusSnapshot {
        config: PbmConfig {
            pitr: PitrConfig { enabled: false },
        },
        backups: vec![
            Backup::new("2024-01-02T00:00:00Z", "error"),
            Backup::new("2024-01-01T00:00:00Z", "done"),
        ],
        nodes: vec![
            Node::new("rs0", "mongo1:27017", NodeHealth::healthy()),
            Node::new(
                "rs0",
                "mongo2:27017",
                NodeHealth {
                    storage_ok: false,
                    ..NodeHealth::healthy()
                },
            ),
        ],
        ..Default::default()
    }
}
