//! Status read straight from PBM's control collections in the `admin` database.

use super::{StatusSource, MAX_RECORDS};
use crate::error::{PbmError, Result};
use crate::status::{
    Backup, Heartbeat, Node, NodeHealth, PbmConfig, PitrChunk, PitrChunks, StatusSnapshot,
};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document, Timestamp};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const ADMIN_DB: &str = "admin";
const CONFIG_COLLECTION: &str = "pbmConfig";
const BACKUPS_COLLECTION: &str = "pbmBackups";
const AGENTS_COLLECTION: &str = "pbmAgents";
const LOCK_COLLECTION: &str = "pbmLock";
const LOCK_OP_COLLECTION: &str = "pbmLockOp";
const PITR_CHUNKS_COLLECTION: &str = "pbmPITRChunks";

/// Delay before the single connection retry.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Reads PBM status from MongoDB.
pub struct MongoSource {
    uri: String,
    connect_timeout: Duration,
}

impl std::fmt::Debug for MongoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSource")
            .field("uri", &"***REDACTED***")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl MongoSource {
    pub fn new(uri: String, connect_timeout: Duration) -> Self {
        Self {
            uri,
            connect_timeout,
        }
    }

    /// Connect and ping, retrying once after [`CONNECT_RETRY_DELAY`].
    ///
    /// The retry covers the exporter starting alongside the database.
    async fn connect(&self) -> Result<Client> {
        match self.try_connect().await {
            Ok(client) => Ok(client),
            Err(e) => {
                warn!(error = %e, "MongoDB not reachable, retrying once");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                self.try_connect().await.map_err(PbmError::Connect)
            }
        }
    }

    async fn try_connect(&self) -> mongodb::error::Result<Client> {
        let mut options = ClientOptions::parse(self.uri.as_str()).await?;
        options.max_pool_size = Some(1);
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        let client = Client::with_options(options)?;
        if let Err(e) = client.database(ADMIN_DB).run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(e);
        }
        debug!("Connected to MongoDB");
        Ok(client)
    }

    async fn read_snapshot(db: &Database) -> Result<StatusSnapshot> {
        let config = db
            .collection::<PbmConfig>(CONFIG_COLLECTION)
            .find_one(doc! {})
            .await
            .map_err(query_err(CONFIG_COLLECTION))?
            .ok_or(PbmError::MissingConfig)?;

        let backups = find_sorted::<BackupDoc>(
            db.collection(BACKUPS_COLLECTION),
            doc! { "name": -1 },
            BACKUPS_COLLECTION,
        )
        .await?
        .into_iter()
        .map(Backup::from)
        .collect();

        let nodes = find_sorted::<AgentDoc>(
            db.collection(AGENTS_COLLECTION),
            doc! { "n": 1 },
            AGENTS_COLLECTION,
        )
        .await?
        .into_iter()
        .map(Node::from)
        .collect();

        let mut snapshot = StatusSnapshot {
            config,
            backups,
            nodes,
            ..Default::default()
        };

        if snapshot.config.pitr.enabled {
            snapshot.pitr_lock = Self::read_pitr_lock(db).await?;
            snapshot.pitr_chunks = Self::read_pitr_chunks(db).await?;
        }

        Ok(snapshot)
    }

    /// The owner may be mid-handover, in which case the lock sits in `pbmLockOp`.
    async fn read_pitr_lock(db: &Database) -> Result<Option<Heartbeat>> {
        let filter = doc! { "type": "pitr" };

        let lock = db
            .collection::<LockDoc>(LOCK_COLLECTION)
            .find_one(filter.clone())
            .await
            .map_err(query_err(LOCK_COLLECTION))?;

        let lock = match lock {
            Some(lock) => Some(lock),
            None => {
                debug!("No PITR lock, checking {}", LOCK_OP_COLLECTION);
                db.collection::<LockDoc>(LOCK_OP_COLLECTION)
                    .find_one(filter)
                    .await
                    .map_err(query_err(LOCK_OP_COLLECTION))?
            }
        };

        Ok(lock.and_then(LockDoc::heartbeat))
    }

    async fn read_pitr_chunks(db: &Database) -> Result<PitrChunks> {
        let chunks: Collection<ChunkDoc> = db.collection(PITR_CHUNKS_COLLECTION);

        let count = chunks
            .estimated_document_count()
            .await
            .map_err(query_err(PITR_CHUNKS_COLLECTION))?;

        let last = chunks
            .find_one(doc! {})
            .sort(doc! { "end_ts": -1 })
            .await
            .map_err(query_err(PITR_CHUNKS_COLLECTION))?
            .map(PitrChunk::from);

        Ok(PitrChunks { count, last })
    }
}

#[async_trait]
impl StatusSource for MongoSource {
    async fn fetch_status(&self) -> Result<StatusSnapshot> {
        let client = self.connect().await?;
        let result = Self::read_snapshot(&client.database(ADMIN_DB)).await;
        client.shutdown().await;
        result
    }
}

async fn find_sorted<T>(
    collection: Collection<T>,
    sort: Document,
    name: &'static str,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Send + Sync,
{
    let mut cursor = collection
        .find(doc! {})
        .sort(sort)
        .limit(MAX_RECORDS as i64)
        .await
        .map_err(query_err(name))?;

    let mut records = Vec::new();
    while cursor.advance().await.map_err(query_err(name))? {
        records.push(cursor.deserialize_current().map_err(query_err(name))?);
    }
    Ok(records)
}

fn query_err(collection: &'static str) -> impl Fn(mongodb::error::Error) -> PbmError {
    move |source| PbmError::Query { collection, source }
}

#[derive(Debug, Deserialize)]
struct BackupDoc {
    name: String,
    status: String,
}

impl From<BackupDoc> for Backup {
    fn from(doc: BackupDoc) -> Self {
        Backup::new(doc.name, doc.status)
    }
}

#[derive(Debug, Default, Deserialize)]
struct CheckDoc {
    #[serde(default)]
    ok: bool,
}

/// Agent status document; a missing check counts as failed.
#[derive(Debug, Deserialize)]
struct AgentDoc {
    rs: String,
    n: String,
    #[serde(default)]
    pbms: CheckDoc,
    #[serde(default)]
    nodes: CheckDoc,
    #[serde(default)]
    stors: CheckDoc,
}

impl From<AgentDoc> for Node {
    fn from(doc: AgentDoc) -> Self {
        Node::new(
            doc.rs,
            doc.n,
            NodeHealth {
                agent_ok: doc.pbms.ok,
                node_ok: doc.nodes.ok,
                storage_ok: doc.stors.ok,
            },
        )
    }
}

/// Lock document; `hb` is kept loose so an unreadable heartbeat reads as stale.
#[derive(Debug, Deserialize)]
struct LockDoc {
    #[serde(default)]
    hb: Option<Bson>,
}

impl LockDoc {
    fn heartbeat(self) -> Option<Heartbeat> {
        match self.hb {
            Some(Bson::Timestamp(ts)) => Some(Heartbeat {
                high: i64::from(ts.time),
            }),
            other => {
                warn!(hb = ?other, "PITR lock has no timestamp heartbeat");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkDoc {
    start_ts: Timestamp,
    end_ts: Timestamp,
}

impl From<ChunkDoc> for PitrChunk {
    fn from(doc: ChunkDoc) -> Self {
        PitrChunk {
            start_ts: i64::from(doc.start_ts.time),
            end_ts: i64::from(doc.end_ts.time),
        }
    }
}
