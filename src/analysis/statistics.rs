// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Running per-key statistics (Welford's online algorithm)

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::sensors::SensorType;

/// Identifies one statistics series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsKey {
    pub sensor_id: String,
    pub sensor_type: SensorType,
}

impl StatsKey {
    pub fn new(sensor_id: impl Into<String>, sensor_type: SensorType) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type,
        }
    }
}

/// Cumulative statistics for one key.
///
/// `m2` is the sum of squared deviations from the current mean, so the population
/// variance is `m2 / count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningStats {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
    pub min: f64,
    pub max: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl RunningStats {
    /// Fold one value in
    pub fn push(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        self.last_update = Some(timestamp);
    }

    /// Population variance; zero before the first value
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.variance().sqrt()
        }
    }
}

/// Outward view of one series, as served to queries and subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStatistics {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: Option<SensorType>,
    pub count: u64,
    pub average: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub min: f64,
    pub max: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl SensorStatistics {
    pub fn from_running(key: &StatsKey, stats: &RunningStats) -> Self {
        Self {
            sensor_id: key.sensor_id.clone(),
            sensor_type: Some(key.sensor_type),
            count: stats.count,
            average: stats.mean,
            variance: stats.variance(),
            standard_deviation: stats.std_dev(),
            min: stats.min,
            max: stats.max,
            last_update: stats.last_update,
        }
    }

    /// Zero-valued view for a sensor nothing has been seen for
    pub fn empty(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            sensor_type: None,
            count: 0,
            average: 0.0,
            variance: 0.0,
            standard_deviation: 0.0,
            min: 0.0,
            max: 0.0,
            last_update: None,
        }
    }
}

/// Owns every series. Each key has its own lock, so updates to one key are strictly
/// serialised while different keys proceed in parallel. The outer map lock is only
/// taken for writing when a key is seen for the first time.
#[derive(Default)]
pub struct StatisticsEngine {
    series: RwLock<HashMap<StatsKey, Arc<Mutex<RunningStats>>>>,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `value` into the series for `key` and return the state right after it
    pub fn update(&self, key: &StatsKey, value: f64, timestamp: DateTime<Utc>) -> RunningStats {
        let cell = self.cell(key);
        let mut stats = cell.lock();
        stats.push(value, timestamp);
        *stats
    }

    fn cell(&self, key: &StatsKey) -> Arc<Mutex<RunningStats>> {
        if let Some(cell) = self.series.read().get(key) {
            return cell.clone();
        }
        self.series
            .write()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Copy of the series, zero-valued if the key was never seen
    pub fn get(&self, key: &StatsKey) -> RunningStats {
        self.series
            .read()
            .get(key)
            .map(|cell| *cell.lock())
            .unwrap_or_default()
    }

    pub fn variance(&self, key: &StatsKey) -> f64 {
        self.get(key).variance()
    }

    pub fn std_dev(&self, key: &StatsKey) -> f64 {
        self.get(key).std_dev()
    }

    /// Every key tracked so far, sorted. Never shrinks.
    pub fn all_keys(&self) -> Vec<StatsKey> {
        let mut keys: Vec<StatsKey> = self.series.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of the first series (by type order) belonging to `sensor_id`
    pub fn for_sensor(&self, sensor_id: &str) -> SensorStatistics {
        self.all_keys()
            .into_iter()
            .find(|k| k.sensor_id == sensor_id)
            .map(|k| SensorStatistics::from_running(&k, &self.get(&k)))
            .unwrap_or_else(|| SensorStatistics::empty(sensor_id))
    }

    /// Views of every series, sorted by key
    pub fn snapshot(&self) -> Vec<SensorStatistics> {
        self.all_keys()
            .iter()
            .map(|k| SensorStatistics::from_running(k, &self.get(k)))
            .collect()
    }
}
