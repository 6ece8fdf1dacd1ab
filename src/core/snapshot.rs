// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Snapshot events pushed to subscribers, and the seams they are read from and
//! written to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Alert, SensorStatistics};
use crate::error::CollaboratorResult;
use crate::sensors::Reading;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsUpdate {
    pub statistics: Vec<SensorStatistics>,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Full state handed to a subscriber when it joins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    pub readings: Vec<Reading>,
    pub statistics: Vec<SensorStatistics>,
    pub alerts: Vec<Alert>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SnapshotEvent {
    NewReadings(Vec<Reading>),
    StatisticsUpdate(StatisticsUpdate),
    NewAlerts(Vec<Alert>),
    InitialData(InitialData),
}

impl SnapshotEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SnapshotEvent::NewReadings(_) => "NewReadings",
            SnapshotEvent::StatisticsUpdate(_) => "StatisticsUpdate",
            SnapshotEvent::NewAlerts(_) => "NewAlerts",
            SnapshotEvent::InitialData(_) => "InitialData",
        }
    }

    /// Subscription topic the event belongs to
    pub fn topic(&self) -> &'static str {
        match self {
            SnapshotEvent::NewReadings(_) => "readings",
            SnapshotEvent::StatisticsUpdate(_) => "statistics",
            SnapshotEvent::NewAlerts(_) => "alerts",
            SnapshotEvent::InitialData(_) => "initial",
        }
    }
}

/// Where snapshots are read from: the in-memory store, or a cache over the
/// persistent repository. Calls return copies.
pub trait SnapshotSource: Send + Sync {
    fn recent_readings(&self, n: usize) -> CollaboratorResult<Vec<Reading>>;

    fn all_statistics(&self) -> CollaboratorResult<Vec<SensorStatistics>>;

    fn recent_alerts(&self, n: usize) -> CollaboratorResult<Vec<Alert>>;

    fn total_count(&self) -> CollaboratorResult<usize>;

    fn initial_data(&self, readings: usize, alerts: usize) -> CollaboratorResult<InitialData> {
        Ok(InitialData {
            readings: self.recent_readings(readings)?,
            statistics: self.all_statistics()?,
            alerts: self.recent_alerts(alerts)?,
            total_count: self.total_count()?,
        })
    }
}

/// Outbound pub/sub channel. Publishing must never wait on subscribers.
pub trait SnapshotSink: Send + Sync {
    /// Returns how many subscribers the event was handed to
    fn publish(&self, event: SnapshotEvent) -> CollaboratorResult<usize>;
}
