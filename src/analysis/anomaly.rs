// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Sigma-threshold anomaly detection against running statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RunningStats;
use crate::sensors::{Reading, SensorType};

/// Alert severity, graded by how far past the threshold a reading lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Grade by `deviation / threshold`
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 1.5 {
            Severity::Low
        } else if ratio < 2.0 {
            Severity::Medium
        } else if ratio < 3.0 {
            Severity::High
        } else {
            Severity::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

/// Raised when a reading strays past the threshold. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub value: f64,
    pub expected_value: f64,
    pub deviation: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of checking one reading
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Too few samples yet, or a sensor with no spread
    WarmupSkipped,
    WithinThreshold,
    Anomalous(Alert),
}

impl Verdict {
    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Verdict::Anomalous(alert) => Some(alert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// Samples required before a series is judged; the series must hold strictly more
    min_samples: u64,
    sigma_threshold: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(10, 3.0)
    }
}

impl AnomalyDetector {
    pub fn new(min_samples: u64, sigma_threshold: f64) -> Self {
        Self {
            min_samples,
            sigma_threshold,
        }
    }

    /// Judge `reading` against `stats`, which already include it
    pub fn check(&self, reading: &Reading, stats: &RunningStats) -> Verdict {
        let std_dev = stats.std_dev();
        if stats.count <= self.min_samples || std_dev <= 0.0 {
            return Verdict::WarmupSkipped;
        }

        let deviation = (reading.value - stats.mean).abs();
        let threshold = self.sigma_threshold * std_dev;
        if deviation <= threshold {
            return Verdict::WithinThreshold;
        }

        let severity = Severity::from_ratio(deviation / threshold);
        let message = format!(
            "Sensor {} reading {:.2} deviates {:.2} from mean {:.2} (threshold: {:.2})",
            reading.sensor_id, reading.value, deviation, stats.mean, threshold
        );
        warn!("Anomaly detected [{}]: {}", severity.as_str(), message);

        Verdict::Anomalous(Alert {
            id: uuid::Uuid::new_v4().to_string(),
            sensor_id: reading.sensor_id.clone(),
            sensor_type: reading.sensor_type,
            value: reading.value,
            expected_value: stats.mean,
            deviation,
            threshold,
            severity,
            message,
            timestamp: reading.timestamp,
        })
    }
}
