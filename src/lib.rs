//! # PBM Exporter
//!
//! A Prometheus metrics exporter for Percona Backup for MongoDB (PBM).
//!
//! ## Overview
//!
//! On every scrape the exporter reads PBM's current state and projects it
//! onto a fixed set of gauges:
//!
//! - Backup snapshots per status, per name, and the status of the latest one
//! - Agent health per node and totals per status
//! - PITR (point-in-time recovery) chunk count, lag and heartbeat staleness
//!
//! Label values that disappear from PBM are reported as 0 rather than
//! dropped, so alerts keyed on them keep evaluating.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pbm_exporter::{config::Settings, metrics::MetricsCollector, server::start_server, source};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration (PBM_MONGODB_URI must be set)
//!     let settings = Settings::load(None)?;
//!
//!     let collector = MetricsCollector::new(source::from_settings(&settings))?;
//!
//!     // Start HTTP server
//!     start_server(&settings.exporter.listen_address, Arc::new(collector)).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`metrics`] - Prometheus metrics definitions and collection
//! - [`projection`] - Status to metrics projection
//! - [`server`] - HTTP server for exposing metrics
//! - [`source`] - PBM status sources (MongoDB, pbm CLI)
//! - [`status`] - Status snapshot data model

pub mod config;
pub mod error;
pub mod metrics;
pub mod projection;
pub mod server;
pub mod source;
pub mod status;

pub use error::{PbmError, Result};
