//! Configuration for OntoAgg
//!
//! Every field has a default, so an empty or missing configuration file
//! yields a working setup against a local triple store.

use crate::{AggregationError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration file path
pub const CONFIG_ENV: &str = "ONTOAGG_CONFIG";

/// Configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "ontoagg.toml";

/// SPARQL query endpoint
pub const QUERY_URL: &str = "http://localhost:3030/bco/query";

/// SPARQL update endpoint
pub const UPDATE_URL: &str = "http://localhost:3030/bco/update";

/// Per-request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retries after the first failed attempt
pub const MAX_RETRIES: u32 = 5;

/// First backoff delay, doubled per retry
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Backoff ceiling
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Triples per INSERT DATA request
pub const INSERT_BATCH_SIZE: usize = 5_000;

/// Hour of the day at which the daily tick fires
pub const TICK_HOUR: u32 = 1;

/// HTTP listen address of the control API
pub const LISTEN_ADDR: &str = "0.0.0.0:8087";

/// Triple store transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub query_url: String,
    pub update_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub insert_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_url: QUERY_URL.to_string(),
            update_url: UPDATE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            insert_batch_size: INSERT_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Daily tick settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Offset of local time from UTC; window boundaries fall on local midnight
    pub utc_offset_minutes: i32,
    /// Local hour at which the tick fires
    pub tick_hour: u32,
    /// Tick counter to resume from after a restart
    pub initial_day_counter: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            tick_hour: TICK_HOUR,
            initial_day_counter: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            AggregationError::Config(format!(
                "utc_offset_minutes {} out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

/// Ontology settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    pub namespace: String,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            namespace: crate::ontology::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Control API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: LISTEN_ADDR.to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntoAggConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl OntoAggConfig {
    /// Path of the configuration file
    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE))
    }

    /// Load the configuration, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| AggregationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.offset()?;
        if self.schedule.tick_hour > 23 {
            return Err(AggregationError::Config(format!(
                "tick_hour {} is not an hour of the day",
                self.schedule.tick_hour
            )));
        }
        if self.store.insert_batch_size == 0 {
            return Err(AggregationError::Config(
                "insert_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\nquery_url = \"http://store:3030/ds/query\"\n\n[schedule]\nutc_offset_minutes = 60"
        )
        .unwrap();

        let config = OntoAggConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.query_url, "http://store:3030/ds/query");
        assert_eq!(config.store.update_url, UPDATE_URL);
        assert_eq!(config.store.max_retries, MAX_RETRIES);
        assert_eq!(config.schedule.offset().unwrap().local_minus_utc(), 3600);
        assert_eq!(config.ontology.namespace, crate::ontology::DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[schedule]\ntick_hour = 30").unwrap();
        assert!(matches!(
            OntoAggConfig::from_file(file.path()),
            Err(AggregationError::Config(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[store]\ninsert_batch_size = 0").unwrap();
        assert!(OntoAggConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[store\nquery_url = 1").unwrap();
        assert!(OntoAggConfig::from_file(file.path()).is_err());
    }
}
