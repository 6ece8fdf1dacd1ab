//! Core engine module - wires ingestion, periodic tasks and push delivery together

mod broadcast;
mod engine;
mod event_bus;
mod retention;
mod scheduler;
mod snapshot;

pub use broadcast::{BroadcastScheduler, StepOutcome, TickReport};
pub use engine::{Engine, Pipeline};
pub use event_bus::EventBus;
pub use retention::RetentionPolicy;
pub use scheduler::{run_periodic, PeriodicTask};
pub use snapshot::{InitialData, SnapshotEvent, SnapshotSink, SnapshotSource, StatisticsUpdate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub simulated_sensors: usize,
    pub websocket_addr: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Liveness snapshot for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub total_readings: usize,
    pub active_sensors: usize,
    pub recent_alerts: usize,
    pub ingested: u64,
    pub rejected: u64,
    pub alerts_raised: u64,
    pub subscribers: usize,
    /// Resident memory of this process, if the platform reports it
    pub memory_bytes: Option<u64>,
    pub uptime_seconds: u64,
    pub storage: String,
}
