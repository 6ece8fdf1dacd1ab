// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Database module for optional persistent storage
//!
//! The in-memory store stays the authority. The repository is written behind it and
//! read through a short-lived cache, so it is allowed to lag.

mod cache;
mod write_behind;

pub use cache::CachedRepository;
pub use write_behind::{WriteBehind, WriteBehindWorker};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

use crate::analysis::{Alert, SensorStatistics, Severity};
use crate::error::CollaboratorResult;
use crate::sensors::{Reading, SensorType};

/// One pending write
#[derive(Debug, Clone)]
pub enum PersistOp {
    Reading(Reading),
    Statistics(SensorStatistics),
    Alert(Alert),
}

impl PersistOp {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistOp::Reading(_) => "reading",
            PersistOp::Statistics(_) => "statistics",
            PersistOp::Alert(_) => "alert",
        }
    }
}

/// Persistent backing for readings, statistics rows and alerts
pub trait SensorRepository: Send + Sync {
    /// Returns the new row id
    fn save_reading(&self, reading: &Reading) -> CollaboratorResult<i64>;

    /// Insert or replace the row keyed by (sensor id, type)
    fn save_statistics(&self, stats: &SensorStatistics) -> CollaboratorResult<()>;

    /// Returns the autoincrement row id
    fn save_alert(&self, alert: &Alert) -> CollaboratorResult<i64>;

    /// Newest `n` readings, ascending by timestamp
    fn query_recent_readings(&self, n: usize) -> CollaboratorResult<Vec<Reading>>;

    fn query_readings_by_sensor(&self, sensor_id: &str, n: usize) -> CollaboratorResult<Vec<Reading>>;

    fn query_statistics(&self, sensor_id: &str) -> CollaboratorResult<Option<SensorStatistics>>;

    fn query_all_statistics(&self) -> CollaboratorResult<Vec<SensorStatistics>>;

    /// Newest `n` alerts, ascending by timestamp
    fn query_recent_alerts(&self, n: usize) -> CollaboratorResult<Vec<Alert>>;

    fn count_readings(&self) -> CollaboratorResult<usize>;

    /// Delete readings and alerts stamped before `cutoff`; returns rows removed
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> CollaboratorResult<usize>;

    /// Apply a batch of writes, returning how many were applied
    fn save_batch(&self, ops: &[PersistOp]) -> CollaboratorResult<usize> {
        for op in ops {
            match op {
                PersistOp::Reading(r) => {
                    self.save_reading(r)?;
                }
                PersistOp::Statistics(s) => self.save_statistics(s)?,
                PersistOp::Alert(a) => {
                    self.save_alert(a)?;
                }
            }
        }
        Ok(ops.len())
    }
}

/// SQLite-backed repository
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database
    pub fn open(path: &Path) -> CollaboratorResult<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| crate::error::CollaboratorError::Unavailable(format!("{:?}: {}", parent, e)))?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for performance
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self::with_connection(conn)?;
        info!("Database opened at {:?}", path);
        Ok(db)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> CollaboratorResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CollaboratorResult<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Create database tables
    fn create_tables(&self) -> CollaboratorResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                latitude REAL,
                longitude REAL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
            CREATE INDEX IF NOT EXISTS idx_readings_sensor ON readings(sensor_id, timestamp);

            CREATE TABLE IF NOT EXISTS statistics (
                sensor_id TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                count INTEGER NOT NULL,
                average REAL NOT NULL,
                variance REAL NOT NULL,
                standard_deviation REAL NOT NULL,
                min REAL NOT NULL,
                max REAL NOT NULL,
                last_update TEXT,
                PRIMARY KEY (sensor_id, sensor_type)
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                value REAL NOT NULL,
                expected_value REAL NOT NULL,
                deviation REAL NOT NULL,
                threshold REAL NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
        "#,
        )?;

        Ok(())
    }
}

const READING_COLUMNS: &str = "timestamp, sensor_id, sensor_type, value, unit, latitude, longitude";
const STATISTICS_COLUMNS: &str =
    "sensor_id, sensor_type, count, average, variance, standard_deviation, min, max, last_update";
const ALERT_COLUMNS: &str =
    "alert_id, timestamp, sensor_id, sensor_type, value, expected_value, deviation, threshold, severity, message";

/// Fixed-width UTC text so timestamps compare correctly as strings
/// Orders statistics rows the way `SensorType` orders, not alphabetically
fn type_rank() -> String {
    let arms: String = SensorType::ALL
        .iter()
        .enumerate()
        .map(|(rank, t)| format!(" WHEN '{}' THEN {}", t.as_str(), rank))
        .collect();
    format!("CASE sensor_type{} ELSE {} END", arms, SensorType::ALL.len())
}

fn stamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_stamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<SensorType> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| conversion_error(idx, e))
}

fn parse_severity(row: &Row<'_>, idx: usize) -> rusqlite::Result<Severity> {
    let text: String = row.get(idx)?;
    match text.as_str() {
        "Low" => Ok(Severity::Low),
        "Medium" => Ok(Severity::Medium),
        "High" => Ok(Severity::High),
        "Critical" => Ok(Severity::Critical),
        other => Err(conversion_error(idx, format!("unknown severity '{}'", other))),
    }
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        timestamp: parse_stamp(row, 0)?,
        sensor_id: row.get(1)?,
        sensor_type: parse_type(row, 2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
    })
}

fn statistics_from_row(row: &Row<'_>) -> rusqlite::Result<SensorStatistics> {
    let last_update: Option<String> = row.get(8)?;
    let last_update = match last_update {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| conversion_error(8, e))?,
        ),
        None => None,
    };
    Ok(SensorStatistics {
        sensor_id: row.get(0)?,
        sensor_type: Some(parse_type(row, 1)?),
        count: row.get::<_, i64>(2)? as u64,
        average: row.get(3)?,
        variance: row.get(4)?,
        standard_deviation: row.get(5)?,
        min: row.get(6)?,
        max: row.get(7)?,
        last_update,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        timestamp: parse_stamp(row, 1)?,
        sensor_id: row.get(2)?,
        sensor_type: parse_type(row, 3)?,
        value: row.get(4)?,
        expected_value: row.get(5)?,
        deviation: row.get(6)?,
        threshold: row.get(7)?,
        severity: parse_severity(row, 8)?,
        message: row.get(9)?,
    })
}

fn insert_reading(conn: &Connection, reading: &Reading) -> rusqlite::Result<i64> {
    conn.execute(
        &format!("INSERT INTO readings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", READING_COLUMNS),
        params![
            stamp(&reading.timestamp),
            reading.sensor_id,
            reading.sensor_type.as_str(),
            reading.value,
            reading.unit,
            reading.latitude,
            reading.longitude
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_statistics(conn: &Connection, stats: &SensorStatistics) -> rusqlite::Result<()> {
    // A series without a type has nothing to key the row on
    let Some(sensor_type) = stats.sensor_type else {
        return Ok(());
    };
    conn.execute(
        &format!(
            "INSERT INTO statistics ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(sensor_id, sensor_type) DO UPDATE SET
                count = excluded.count,
                average = excluded.average,
                variance = excluded.variance,
                standard_deviation = excluded.standard_deviation,
                min = excluded.min,
                max = excluded.max,
                last_update = excluded.last_update",
            STATISTICS_COLUMNS
        ),
        params![
            stats.sensor_id,
            sensor_type.as_str(),
            stats.count as i64,
            stats.average,
            stats.variance,
            stats.standard_deviation,
            stats.min,
            stats.max,
            stats.last_update.as_ref().map(stamp)
        ],
    )?;
    Ok(())
}

fn insert_alert(conn: &Connection, alert: &Alert) -> rusqlite::Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO alerts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            ALERT_COLUMNS
        ),
        params![
            alert.id,
            stamp(&alert.timestamp),
            alert.sensor_id,
            alert.sensor_type.as_str(),
            alert.value,
            alert.expected_value,
            alert.deviation,
            alert.threshold,
            alert.severity.as_str(),
            alert.message
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl SensorRepository for Database {
    fn save_reading(&self, reading: &Reading) -> CollaboratorResult<i64> {
        let conn = self.conn.lock();
        Ok(insert_reading(&conn, reading)?)
    }

    fn save_statistics(&self, stats: &SensorStatistics) -> CollaboratorResult<()> {
        let conn = self.conn.lock();
        Ok(upsert_statistics(&conn, stats)?)
    }

    fn save_alert(&self, alert: &Alert) -> CollaboratorResult<i64> {
        let conn = self.conn.lock();
        Ok(insert_alert(&conn, alert)?)
    }

    fn query_recent_readings(&self, n: usize) -> CollaboratorResult<Vec<Reading>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM readings ORDER BY timestamp DESC, id DESC LIMIT ?1",
            READING_COLUMNS
        ))?;
        let mut readings = stmt
            .query_map(params![n as i64], reading_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        readings.reverse();
        Ok(readings)
    }

    fn query_readings_by_sensor(&self, sensor_id: &str, n: usize) -> CollaboratorResult<Vec<Reading>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM readings WHERE sensor_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
            READING_COLUMNS
        ))?;
        let mut readings = stmt
            .query_map(params![sensor_id, n as i64], reading_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        readings.reverse();
        Ok(readings)
    }

    fn query_statistics(&self, sensor_id: &str) -> CollaboratorResult<Option<SensorStatistics>> {
        let conn = self.conn.lock();
        let stats = conn
            .query_row(
                &format!(
                    "SELECT {} FROM statistics WHERE sensor_id = ?1 ORDER BY {} LIMIT 1",
                    STATISTICS_COLUMNS,
                    type_rank()
                ),
                params![sensor_id],
                statistics_from_row,
            )
            .optional()?;
        Ok(stats)
    }

    fn query_all_statistics(&self) -> CollaboratorResult<Vec<SensorStatistics>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statistics ORDER BY sensor_id, {}",
            STATISTICS_COLUMNS,
            type_rank()
        ))?;
        let stats = stmt
            .query_map([], statistics_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    fn query_recent_alerts(&self, n: usize) -> CollaboratorResult<Vec<Alert>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts ORDER BY timestamp DESC, id DESC LIMIT ?1",
            ALERT_COLUMNS
        ))?;
        let mut alerts = stmt
            .query_map(params![n as i64], alert_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        alerts.reverse();
        Ok(alerts)
    }

    fn count_readings(&self) -> CollaboratorResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> CollaboratorResult<usize> {
        let conn = self.conn.lock();
        let cutoff = stamp(&cutoff);

        let deleted_readings = conn.execute("DELETE FROM readings WHERE timestamp < ?1", params![cutoff])?;
        let deleted_alerts = conn.execute("DELETE FROM alerts WHERE timestamp < ?1", params![cutoff])?;

        Ok(deleted_readings + deleted_alerts)
    }

    fn save_batch(&self, ops: &[PersistOp]) -> CollaboratorResult<usize> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        for op in ops {
            match op {
                PersistOp::Reading(r) => {
                    insert_reading(&tx, r)?;
                }
                PersistOp::Statistics(s) => upsert_statistics(&tx, s)?,
                PersistOp::Alert(a) => {
                    insert_alert(&tx, a)?;
                }
            }
        }

        tx.commit()?;
        Ok(ops.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{RunningStats, StatsKey};
    use chrono::Duration;

    fn reading(id: &str, value: f64, at: DateTime<Utc>) -> Reading {
        Reading::new(id, SensorType::Humidity, value, at).with_location(40.71, -74.0)
    }

    fn alert(at: DateTime<Utc>) -> Alert {
        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            sensor_id: "HUM_001".to_string(),
            sensor_type: SensorType::Humidity,
            value: 99.0,
            expected_value: 50.0,
            deviation: 49.0,
            threshold: 12.0,
            severity: Severity::Critical,
            message: "spike".to_string(),
            timestamp: at,
        }
    }

    #[test]
    fn test_readings_come_back_ascending() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();
        for i in 0..5 {
            db.save_reading(&reading("HUM_001", i as f64, base + Duration::seconds(i))).unwrap();
        }
        db.save_reading(&reading("HUM_002", 10.0, base)).unwrap();

        let recent: Vec<f64> = db.query_recent_readings(3).unwrap().iter().map(|r| r.value).collect();
        assert_eq!(recent, vec![2.0, 3.0, 4.0]);

        let by_sensor = db.query_readings_by_sensor("HUM_002", 10).unwrap();
        assert_eq!(by_sensor.len(), 1);
        assert_eq!(by_sensor[0].latitude, Some(40.71));
        assert_eq!(by_sensor[0].sensor_type, SensorType::Humidity);
        assert_eq!(db.count_readings().unwrap(), 6);
    }

    #[test]
    fn test_statistics_upsert_by_key() {
        let db = Database::open_in_memory().unwrap();
        let key = StatsKey::new("HUM_001", SensorType::Humidity);
        let mut stats = RunningStats::default();
        stats.push(40.0, Utc::now());
        db.save_statistics(&SensorStatistics::from_running(&key, &stats)).unwrap();
        stats.push(60.0, Utc::now());
        db.save_statistics(&SensorStatistics::from_running(&key, &stats)).unwrap();

        let all = db.query_all_statistics().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].count, 2);
        assert_eq!(all[0].average, 50.0);
        assert_eq!(db.query_statistics("HUM_001").unwrap().unwrap().max, 60.0);
        assert!(db.query_statistics("nope").unwrap().is_none());
    }

    #[test]
    fn test_statistics_follow_sensor_type_order() {
        let db = Database::open_in_memory().unwrap();
        let engine = crate::analysis::StatisticsEngine::new();
        let now = Utc::now();
        for t in [SensorType::AirQuality, SensorType::Humidity, SensorType::Temperature] {
            let key = StatsKey::new("MULTI_001", t);
            let mut stats = RunningStats::default();
            stats.push(1.0, now);
            db.save_statistics(&SensorStatistics::from_running(&key, &stats)).unwrap();
            engine.update(&key, 1.0, now);
        }

        let first = db.query_statistics("MULTI_001").unwrap().unwrap();
        assert_eq!(first.sensor_type, Some(SensorType::Temperature));
        assert_eq!(first.sensor_type, engine.for_sensor("MULTI_001").sensor_type);

        let types: Vec<_> = db.query_all_statistics().unwrap().iter().map(|s| s.sensor_type).collect();
        let expected: Vec<_> = engine.snapshot().iter().map(|s| s.sensor_type).collect();
        assert_eq!(types, expected);
    }

    #[test]
    fn test_alert_ids_autoincrement() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let first = db.save_alert(&alert(now)).unwrap();
        let second = db.save_alert(&alert(now + Duration::seconds(1))).unwrap();
        assert_eq!(second, first + 1);

        let alerts = db.query_recent_alerts(10).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].severity, Severity::Critical);
        assert!(alerts[0].timestamp <= alerts[1].timestamp);
    }

    #[test]
    fn test_purge_and_batch() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let ops = vec![
            PersistOp::Reading(reading("HUM_001", 1.0, now - Duration::hours(30))),
            PersistOp::Reading(reading("HUM_001", 2.0, now)),
            PersistOp::Alert(alert(now - Duration::hours(30))),
        ];
        assert_eq!(db.save_batch(&ops).unwrap(), 3);

        assert_eq!(db.purge_older_than(now - Duration::hours(24)).unwrap(), 2);
        assert_eq!(db.purge_older_than(now - Duration::hours(24)).unwrap(), 0);
        assert_eq!(db.count_readings().unwrap(), 1);
    }

    #[test]
    fn test_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sensorflow.db");
        {
            let db = Database::open(&path).unwrap();
            db.save_reading(&reading("HUM_009", 70.0, Utc::now())).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_readings().unwrap(), 1);
    }
}
