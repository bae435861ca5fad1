//! Configuration management for PBM exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (with `PBM_` prefix, e.g. `PBM_MONGODB_URI`)
//! - Command-line arguments

use crate::error::{PbmError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which implementation reads PBM status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Query PBM's control collections directly
    #[default]
    Mongodb,
    /// Run `pbm status --out=json`
    Cli,
}

/// Status source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Path to the pbm binary (cli source only)
    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    /// Connect and server selection timeout in seconds (mongodb source only)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            cli_path: default_cli_path(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
        }
    }
}

/// Main configuration structure for the PBM exporter.
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// MongoDB connection string of the cluster PBM manages
    pub mongodb_uri: String,

    /// Status source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("mongodb_uri", &"***REDACTED***")
            .field("source", &self.source)
            .field("exporter", &self.exporter)
            .finish()
    }
}

fn default_cli_path() -> String {
    "pbm".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_listen_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// `PBM_MONGODB_URI` is required unless the file sets `mongodb_uri`.
    /// Nested keys use a double underscore, e.g. `PBM_SOURCE__KIND=cli`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pbm_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Add config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PBM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Replace the port of the listen address.
    pub fn override_port(&mut self, port: u16) {
        let host = self
            .exporter
            .listen_address
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0");
        self.exporter.listen_address = format!("{}:{}", host, port);
    }

    /// Validate configuration settings.
    fn validate(&self) -> Result<()> {
        if self.mongodb_uri.trim().is_empty() {
            return Err(PbmError::Config(config::ConfigError::Message(
                "PBM_MONGODB_URI environment variable is required".to_string(),
            )));
        }

        if self.source.kind == SourceKind::Cli && self.source.cli_path.is_empty() {
            return Err(PbmError::Config(config::ConfigError::Message(
                "source.cli_path cannot be empty".to_string(),
            )));
        }

        Ok(())
    }
}
