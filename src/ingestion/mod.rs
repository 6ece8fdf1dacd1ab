// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Ingestion store - bounded reading and alert buffers feeding the analysis pipeline

mod buffer;

pub use buffer::{BoundedLog, Eviction, Timestamped};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{Alert, AnomalyDetector, SensorStatistics, StatisticsEngine, StatsKey};
use crate::config::IngestionConfig;
use crate::core::SnapshotSource;
use crate::error::{CollaboratorResult, ValidationError};
use crate::sensors::{Reading, ReadingSink};

/// What ingesting one reading produced
#[derive(Debug, Clone)]
pub struct Ingested {
    /// Series state including this reading
    pub statistics: SensorStatistics,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub readings: usize,
    pub sensor_readings: usize,
    pub alerts: usize,
}

/// Lifetime counters, independent of retention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestCounters {
    pub ingested: u64,
    pub rejected: u64,
    pub alerts_raised: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    ingested: AtomicU64,
    rejected: AtomicU64,
    alerts_raised: AtomicU64,
    evicted: AtomicU64,
}

type SensorLog = Arc<Mutex<BoundedLog<Reading>>>;

/// Owns the global reading log, one log per sensor and the alert log.
///
/// Each sensor's log lock is held while its reading is folded into the statistics,
/// checked and appended everywhere, so per-sensor order, statistics order and global
/// order always agree. Different sensors only contend briefly on the global log.
pub struct IngestionStore {
    readings: Mutex<BoundedLog<Reading>>,
    by_sensor: RwLock<HashMap<String, SensorLog>>,
    alerts: Mutex<BoundedLog<Alert>>,
    statistics: Arc<StatisticsEngine>,
    detector: AnomalyDetector,
    per_sensor_cap: usize,
    counters: Counters,
}

impl IngestionStore {
    pub fn new(config: &IngestionConfig, detector: AnomalyDetector, statistics: Arc<StatisticsEngine>) -> Self {
        Self {
            readings: Mutex::new(BoundedLog::new(config.eviction_cap, Eviction::Batch)),
            by_sensor: RwLock::new(HashMap::new()),
            alerts: Mutex::new(BoundedLog::new(config.alert_cap, Eviction::Single)),
            statistics,
            detector,
            per_sensor_cap: config.per_sensor_cap,
            counters: Counters::default(),
        }
    }

    /// Validate, append, update statistics and run detection for one reading
    pub fn add_reading(&self, reading: Reading) -> Result<Ingested, ValidationError> {
        if let Err(e) = reading.validate() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Rejected reading: {}", e);
            return Err(e);
        }

        let key = StatsKey::new(reading.sensor_id.clone(), reading.sensor_type);
        let sensor_log = self.sensor_log(&reading.sensor_id);

        // Global and alert appends happen under the sensor guard so every log sees one
        // sensor's readings in the same order. Lock order: sensor, then global, then alerts.
        let (stats, alert) = {
            let mut log = sensor_log.lock();
            let stats = self.statistics.update(&key, reading.value, reading.timestamp);
            let verdict = self.detector.check(&reading, &stats);
            log.push(reading.clone());

            let evicted = self.readings.lock().push(reading);
            if evicted > 0 {
                self.counters.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
                debug!("Evicted {} oldest readings", evicted);
            }

            let alert = verdict.into_alert();
            if let Some(alert) = &alert {
                self.alerts.lock().push(alert.clone());
                self.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
            }
            (stats, alert)
        };
        self.counters.ingested.fetch_add(1, Ordering::Relaxed);

        Ok(Ingested {
            statistics: SensorStatistics::from_running(&key, &stats),
            alert,
        })
    }

    fn sensor_log(&self, sensor_id: &str) -> SensorLog {
        if let Some(log) = self.by_sensor.read().get(sensor_id) {
            return log.clone();
        }
        let cap = self.per_sensor_cap;
        self.by_sensor
            .write()
            .entry(sensor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BoundedLog::new(cap, Eviction::Batch))))
            .clone()
    }

    /// The `n` most recently added readings across all sensors, ascending by timestamp
    pub fn recent_readings(&self, n: usize) -> Vec<Reading> {
        self.readings.lock().latest(n)
    }

    pub fn readings_by_sensor(&self, sensor_id: &str, n: usize) -> Vec<Reading> {
        let log = self.by_sensor.read().get(sensor_id).cloned();
        log.map(|log| log.lock().latest(n)).unwrap_or_default()
    }

    /// Readings currently retained in the global log
    pub fn total_count(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn recent_alerts(&self, n: usize) -> Vec<Alert> {
        self.alerts.lock().latest(n)
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_sensor.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn statistics(&self) -> &Arc<StatisticsEngine> {
        &self.statistics
    }

    pub fn counters(&self) -> IngestCounters {
        IngestCounters {
            ingested: self.counters.ingested.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            alerts_raised: self.counters.alerts_raised.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// Drop every reading and alert stamped before `cutoff`. Each log is purged on its
    /// own; concurrent writers may interleave between logs.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> PurgeReport {
        let readings = self.readings.lock().purge_older_than(cutoff);

        let logs: Vec<SensorLog> = self.by_sensor.read().values().cloned().collect();
        let sensor_readings: usize = logs
            .iter()
            .map(|log| log.lock().purge_older_than(cutoff))
            .sum();

        let alerts = self.alerts.lock().purge_older_than(cutoff);

        info!(
            "Purged data older than {}: {} readings, {} alerts removed, {} readings retained",
            cutoff.to_rfc3339(),
            readings,
            alerts,
            self.total_count()
        );

        PurgeReport {
            readings,
            sensor_readings,
            alerts,
        }
    }
}

impl ReadingSink for IngestionStore {
    fn submit(&self, reading: Reading) -> Result<(), ValidationError> {
        self.add_reading(reading).map(|_| ())
    }
}

impl SnapshotSource for IngestionStore {
    fn recent_readings(&self, n: usize) -> CollaboratorResult<Vec<Reading>> {
        Ok(IngestionStore::recent_readings(self, n))
    }

    fn all_statistics(&self) -> CollaboratorResult<Vec<SensorStatistics>> {
        Ok(self.statistics.snapshot())
    }

    fn recent_alerts(&self, n: usize) -> CollaboratorResult<Vec<Alert>> {
        Ok(IngestionStore::recent_alerts(self, n))
    }

    fn total_count(&self) -> CollaboratorResult<usize> {
        Ok(IngestionStore::total_count(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use crate::sensors::SensorType;
    use chrono::Duration;

    fn store_with(eviction_cap: usize, per_sensor_cap: usize) -> IngestionStore {
        let config = IngestionConfig {
            eviction_cap,
            per_sensor_cap,
            alert_cap: 100,
        };
        IngestionStore::new(&config, AnomalyDetector::default(), Arc::new(StatisticsEngine::new()))
    }

    fn temp(id: &str, value: f64, at: DateTime<Utc>) -> Reading {
        Reading::new(id, SensorType::Temperature, value, at)
    }

    #[test]
    fn test_rejected_reading_mutates_nothing() {
        let store = store_with(100, 100);
        let now = Utc::now();
        assert_eq!(
            store.add_reading(temp("", 1.0, now)).unwrap_err(),
            ValidationError::EmptySensorId
        );
        assert!(store.add_reading(temp("T1", f64::NAN, now)).is_err());

        assert_eq!(store.total_count(), 0);
        assert!(store.sensor_ids().is_empty());
        assert!(store.statistics().is_empty());
        assert_eq!(store.counters().rejected, 2);
    }

    #[test]
    fn test_global_and_per_sensor_queries() {
        let store = store_with(100, 100);
        let base = Utc::now();
        for i in 0..10 {
            let id = if i % 2 == 0 { "A" } else { "B" };
            store.add_reading(temp(id, i as f64, base + Duration::seconds(i))).unwrap();
        }

        let recent: Vec<f64> = store.recent_readings(3).iter().map(|r| r.value).collect();
        assert_eq!(recent, vec![7.0, 8.0, 9.0]);

        let only_a: Vec<f64> = store.readings_by_sensor("A", 2).iter().map(|r| r.value).collect();
        assert_eq!(only_a, vec![6.0, 8.0]);
        assert!(store.readings_by_sensor("missing", 5).is_empty());
        assert_eq!(store.total_count(), 10);
        assert_eq!(store.statistics().for_sensor("B").count, 5);
    }

    #[test]
    fn test_eviction_cap_at_production_size() {
        let cap = 100_000;
        let store = store_with(cap, cap + 1);
        let base = Utc::now();
        for i in 0..=cap as i64 {
            store
                .add_reading(temp("BULK", (i % 7) as f64, base + Duration::milliseconds(i)))
                .unwrap();
        }

        assert!(store.total_count() <= cap);
        assert_eq!(store.total_count(), cap - cap / 10);
        let retained = store.recent_readings(cap);
        assert_eq!(retained.len(), cap - cap / 10);
        assert_eq!(retained[0].timestamp, base + Duration::milliseconds((cap / 10 + 1) as i64));
        // Statistics are cumulative and unaffected by eviction
        assert_eq!(store.statistics().for_sensor("BULK").count, cap as u64 + 1);
        assert_eq!(store.counters().evicted, (cap / 10 + 1) as u64);
    }

    #[test]
    fn test_per_sensor_logs_are_bounded_independently() {
        let store = store_with(1_000, 20);
        let now = Utc::now();
        for i in 0..21 {
            store.add_reading(temp("S", i as f64, now)).unwrap();
        }
        assert_eq!(store.readings_by_sensor("S", 100).len(), 18);
        assert_eq!(store.total_count(), 21);
    }

    #[test]
    fn test_spike_raises_alert_after_warmup() {
        let store = store_with(1_000, 1_000);
        let base = Utc::now();
        for i in 0..30 {
            let value = if i % 2 == 0 { 20.0 } else { 21.0 };
            let out = store.add_reading(temp("T", value, base + Duration::seconds(i))).unwrap();
            assert!(out.alert.is_none());
        }

        let out = store
            .add_reading(temp("T", 60.0, base + Duration::seconds(31)))
            .unwrap();
        let alert = out.alert.expect("spike should alert");
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(out.statistics.count, 31);
        assert_eq!(store.recent_alerts(10), vec![alert]);
        assert_eq!(store.counters().alerts_raised, 1);
    }

    #[test]
    fn test_purge_removes_old_readings_and_alerts() {
        let store = store_with(1_000, 1_000);
        let now = Utc::now();
        let old = now - Duration::hours(30);
        for i in 0..5 {
            store.add_reading(temp("OLD", i as f64, old)).unwrap();
            store.add_reading(temp("NEW", i as f64, now)).unwrap();
        }

        let cutoff = now - Duration::hours(24);
        let report = store.purge_older_than(cutoff);
        assert_eq!(report.readings, 5);
        assert_eq!(report.sensor_readings, 5);
        assert_eq!(store.total_count(), 5);
        assert!(store.readings_by_sensor("OLD", 10).is_empty());

        let again = store.purge_older_than(cutoff);
        assert_eq!(again, PurgeReport::default());
        assert_eq!(store.total_count(), 5);
        // Statistics outlive retention
        assert_eq!(store.statistics().for_sensor("OLD").count, 5);
    }

    #[test]
    fn test_concurrent_producers_same_key() {
        let store = Arc::new(store_with(1_000_000, 1_000_000));
        let producers = 8;
        let per_producer = 1_000;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..per_producer {
                        let value = (p * per_producer + i) as f64;
                        store.add_reading(temp("SHARED", value, Utc::now())).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total = producers * per_producer;
        assert_eq!(store.statistics().for_sensor("SHARED").count, total as u64);
        assert_eq!(store.total_count(), total);
        assert_eq!(store.readings_by_sensor("SHARED", total).len(), total);
    }

    #[test]
    fn test_concurrent_producers_agree_on_sensor_order() {
        let store = Arc::new(store_with(1_000_000, 1_000_000));
        let producers = 8;
        let per_producer = 5_000;
        // One timestamp for all, so the stable sort leaves insertion order untouched
        let at = Utc::now();

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..per_producer {
                        let value = (p * per_producer + i) as f64;
                        store.add_reading(temp("S", value, at)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total = producers * per_producer;
        let global: Vec<f64> = store.recent_readings(total).iter().map(|r| r.value).collect();
        let per_sensor: Vec<f64> = store.readings_by_sensor("S", total).iter().map(|r| r.value).collect();
        assert_eq!(global.len(), total);
        assert_eq!(global, per_sensor);
    }
}
