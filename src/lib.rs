// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! SensorFlow - Real-time sensor ingestion and anomaly alerting
//!
//! Readings are validated and appended to bounded in-memory logs, folded into per-sensor
//! running statistics (Welford), and judged against a sigma threshold as they arrive.
//! Periodic tasks push snapshots to subscribers and age old data out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SensorFlow Engine                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ Workload │→ │ Ingestion │→ │ Statistics │→ │ Anomaly  │  │
//! │  │Simulator │  │   Store   │  │   Engine   │  │ Detector │  │
//! │  └──────────┘  └───────────┘  └────────────┘  └──────────┘  │
//! │        ↓              ↓                                     │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐  │
//! │  │ Retention │  │ Broadcast │→ │ Event Bus │→ │WebSocket │  │
//! │  │  Policy   │  │ Scheduler │  │           │  │  Server  │  │
//! │  └───────────┘  └───────────┘  └───────────┘  └──────────┘  │
//! │        ↓                                                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Database (write-behind, read-through)        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use analysis::{Alert, AnomalyDetector, SensorStatistics, Severity, StatisticsEngine, Verdict};
pub use config::Config;
pub use core::{Engine, EventBus, HealthStatus, SnapshotEvent};
pub use db::{Database, SensorRepository};
pub use error::{CollaboratorError, ValidationError};
pub use ingestion::IngestionStore;
pub use sensors::{Reading, SensorType, WorkloadSimulator};

/// SensorFlow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SensorFlow name
pub const NAME: &str = "SensorFlow";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
}
