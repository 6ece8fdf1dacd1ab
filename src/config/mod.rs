// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Configuration module

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn or error); `--debug` and `--trace` override it
    pub log_level: String,

    /// Reading and alert buffer bounds
    pub ingestion: IngestionConfig,

    /// Anomaly detection
    pub detection: DetectionConfig,

    /// Age-based retention sweep
    pub retention: RetentionConfig,

    /// Snapshot broadcast cadence
    pub broadcast: BroadcastConfig,

    /// Simulated sensor fleet
    pub simulation: SimulationConfig,

    /// WebSocket push transport
    pub streaming: StreamingConfig,

    /// Optional SQLite backing store
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            ingestion: IngestionConfig::default(),
            detection: DetectionConfig::default(),
            retention: RetentionConfig::default(),
            broadcast: BroadcastConfig::default(),
            simulation: SimulationConfig::default(),
            streaming: StreamingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("sensorflow"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Configured maximum log level
    pub fn max_log_level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow!("log_level '{}' is not one of trace, debug, info, warn, error", self.log_level))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.max_log_level()?;
        ensure!(self.ingestion.eviction_cap > 0, "ingestion.eviction_cap must be positive");
        ensure!(self.ingestion.per_sensor_cap > 0, "ingestion.per_sensor_cap must be positive");
        ensure!(self.ingestion.alert_cap > 0, "ingestion.alert_cap must be positive");
        ensure!(
            self.detection.sigma_threshold > 0.0,
            "detection.sigma_threshold must be positive"
        );
        ensure!(self.retention.window_hours > 0, "retention.window_hours must be positive");
        ensure!(
            self.retention.sweep_interval_secs > 0,
            "retention.sweep_interval_secs must be positive"
        );
        ensure!(self.broadcast.tick_ms > 0, "broadcast.tick_ms must be positive");
        ensure!(
            self.broadcast.channel_capacity > 0,
            "broadcast.channel_capacity must be positive"
        );
        ensure!(self.simulation.period_ms > 0, "simulation.period_ms must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.simulation.anomaly_probability),
            "simulation.anomaly_probability must be within [0, 1]"
        );
        ensure!(
            self.database.write_queue_capacity > 0,
            "database.write_queue_capacity must be positive"
        );
        Ok(())
    }
}

/// Ingestion buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Hard cap on readings held in the global log
    pub eviction_cap: usize,

    /// Cap on readings held per sensor
    pub per_sensor_cap: usize,

    /// Cap on retained alerts
    pub alert_cap: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            eviction_cap: 100_000,
            per_sensor_cap: 10_000,
            alert_cap: 100,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// A series is judged once it holds more than this many samples
    pub min_samples: u64,

    /// Standard deviations a reading may stray before alerting
    pub sigma_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            sigma_threshold: 3.0,
        }
    }
}

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Maximum age of retained readings and alerts
    pub window_hours: u64,

    /// How often the sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.window_hours as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Broadcast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub tick_ms: u64,
    pub stats_interval_secs: u64,
    pub readings_per_tick: usize,
    pub alerts_per_tick: usize,

    /// Sizes of the snapshot sent to a new subscriber
    pub initial_readings: usize,
    pub initial_alerts: usize,

    /// Events buffered per subscriber before it starts losing the oldest
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            stats_interval_secs: 10,
            readings_per_tick: 20,
            alerts_per_tick: 5,
            initial_readings: 100,
            initial_alerts: 20,
            channel_capacity: 1000,
        }
    }
}

impl BroadcastConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Simulated fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,

    /// Virtual sensors generated for each simulated type
    pub sensors_per_type: usize,

    /// Time between readings of one sensor
    pub period_ms: u64,

    /// Chance per reading of injecting an anomaly
    pub anomaly_probability: f64,

    pub spike_multiplier: f64,
    pub dip_multiplier: f64,

    /// Carry the pre-anomaly value forward so injected anomalies stay one-off outliers
    pub transient_anomalies: bool,

    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensors_per_type: 10,
            period_ms: 500,
            anomaly_probability: 0.01,
            spike_multiplier: 3.0,
            dip_multiplier: 0.1,
            transient_anomalies: false,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// How long read-through query results are reused
    pub cache_ttl_ms: u64,

    /// Pending writes held before new ones are dropped
    pub write_queue_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("./data/sensorflow.db"),
            cache_ttl_ms: 5000,
            write_queue_capacity: 10_000,
        }
    }
}

impl DatabaseConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingestion.eviction_cap, 100_000);
        assert_eq!(config.retention.window(), chrono::Duration::hours(24));
        assert_eq!(config.broadcast.tick(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ingestion]
            eviction_cap = 500

            [simulation]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.ingestion.eviction_cap, 500);
        assert_eq!(config.ingestion.alert_cap, 100);
        assert!(!config.simulation.enabled);
        assert_eq!(config.simulation.period_ms, 500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.ingestion.eviction_cap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.anomaly_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_from_file() {
        let config: Config = toml::from_str(r#"log_level = "debug""#).unwrap();
        assert_eq!(config.max_log_level().unwrap(), Level::DEBUG);
        assert_eq!(Config::default().max_log_level().unwrap(), Level::INFO);

        let config: Config = toml::from_str(r#"log_level = "chatty""#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_create_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.broadcast.stats_interval_secs, created.broadcast.stats_interval_secs);
        assert_eq!(loaded.database.path, created.database.path);
    }
}
