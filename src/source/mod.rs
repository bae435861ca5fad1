//! Where PBM status comes from.
//!
//! Two interchangeable implementations exist: [`MongoSource`] reads PBM's
//! control collections directly, [`CliSource`] runs `pbm status` and parses
//! its JSON output. One is picked at startup from [`SourceKind`].

mod cli;
mod mongo;

pub use cli::CliSource;
pub use mongo::MongoSource;

use crate::config::{Settings, SourceKind};
use crate::error::Result;
use crate::status::StatusSnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Upper bound on backups and agents read per scrape.
pub const MAX_RECORDS: usize = 10_000;

/// Produces a complete [`StatusSnapshot`] or fails as a whole.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<StatusSnapshot>;
}

/// Build the source selected in `settings`.
pub fn from_settings(settings: &Settings) -> Arc<dyn StatusSource> {
    match settings.source.kind {
        SourceKind::Mongodb => {
            info!("Reading PBM status from MongoDB collections");
            Arc::new(MongoSource::new(
                settings.mongodb_uri.clone(),
                settings.source.connect_timeout(),
            ))
        }
        SourceKind::Cli => {
            info!(path = %settings.source.cli_path, "Reading PBM status from the pbm CLI");
            Arc::new(CliSource::new(
                settings.source.cli_path.clone(),
                settings.mongodb_uri.clone(),
            ))
        }
    }
}
