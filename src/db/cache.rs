// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Short-lived read-through cache over a repository

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::SensorRepository;
use crate::analysis::{Alert, SensorStatistics};
use crate::core::SnapshotSource;
use crate::error::CollaboratorResult;
use crate::sensors::Reading;

/// Alerts are always fetched in one block of this size and sliced per request
const ALERT_BLOCK: usize = 100;

struct Entry<T> {
    value: T,
    /// How many items were asked for when this was fetched
    depth: usize,
    fetched_at: Instant,
}

impl<T> Entry<T> {
    fn fresh(&self, ttl: Duration, depth: usize) -> bool {
        self.fetched_at.elapsed() < ttl && self.depth >= depth
    }
}

#[derive(Default)]
struct Slots {
    readings: Option<Entry<Vec<Reading>>>,
    statistics: Option<Entry<Vec<SensorStatistics>>>,
    alerts: Option<Entry<Vec<Alert>>>,
    total: Option<Entry<usize>>,
}

/// Serves snapshot queries from the repository, reusing each answer for `ttl`.
/// Results may be up to `ttl` stale.
pub struct CachedRepository {
    repository: Arc<dyn SensorRepository>,
    ttl: Duration,
    slots: Mutex<Slots>,
}

impl CachedRepository {
    pub fn new(repository: Arc<dyn SensorRepository>, ttl: Duration) -> Self {
        Self {
            repository,
            ttl,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn SensorRepository> {
        &self.repository
    }

    /// Forget everything cached
    pub fn invalidate(&self) {
        *self.slots.lock() = Slots::default();
    }
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

impl SnapshotSource for CachedRepository {
    fn recent_readings(&self, n: usize) -> CollaboratorResult<Vec<Reading>> {
        if let Some(entry) = &self.slots.lock().readings {
            if entry.fresh(self.ttl, n) {
                return Ok(tail(&entry.value, n));
            }
        }

        debug!("Reading cache miss ({} requested)", n);
        let readings = self.repository.query_recent_readings(n)?;
        self.slots.lock().readings = Some(Entry {
            value: readings.clone(),
            depth: n,
            fetched_at: Instant::now(),
        });
        Ok(readings)
    }

    fn all_statistics(&self) -> CollaboratorResult<Vec<SensorStatistics>> {
        if let Some(entry) = &self.slots.lock().statistics {
            if entry.fresh(self.ttl, 0) {
                return Ok(entry.value.clone());
            }
        }

        let statistics = self.repository.query_all_statistics()?;
        self.slots.lock().statistics = Some(Entry {
            value: statistics.clone(),
            depth: 0,
            fetched_at: Instant::now(),
        });
        Ok(statistics)
    }

    fn recent_alerts(&self, n: usize) -> CollaboratorResult<Vec<Alert>> {
        let depth = n.max(ALERT_BLOCK);
        if let Some(entry) = &self.slots.lock().alerts {
            if entry.fresh(self.ttl, depth) {
                return Ok(tail(&entry.value, n));
            }
        }

        let alerts = self.repository.query_recent_alerts(depth)?;
        let result = tail(&alerts, n);
        self.slots.lock().alerts = Some(Entry {
            value: alerts,
            depth,
            fetched_at: Instant::now(),
        });
        Ok(result)
    }

    fn total_count(&self) -> CollaboratorResult<usize> {
        if let Some(entry) = &self.slots.lock().total {
            if entry.fresh(self.ttl, 0) {
                return Ok(entry.value);
            }
        }

        let total = self.repository.count_readings()?;
        self.slots.lock().total = Some(Entry {
            value: total,
            depth: 0,
            fetched_at: Instant::now(),
        });
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::sensors::SensorType;
    use chrono::Utc;

    fn light(value: f64) -> Reading {
        Reading::new("LIGHT_003", SensorType::Light, value, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_stale_until_ttl() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = CachedRepository::new(db.clone(), Duration::from_secs(5));

        db.save_reading(&light(100.0)).unwrap();
        assert_eq!(cache.recent_readings(10).unwrap().len(), 1);
        assert_eq!(cache.total_count().unwrap(), 1);

        db.save_reading(&light(200.0)).unwrap();
        assert_eq!(cache.recent_readings(10).unwrap().len(), 1);
        // A smaller request is answered from the cached block
        assert_eq!(cache.recent_readings(1).unwrap()[0].value, 100.0);
        assert_eq!(cache.total_count().unwrap(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.recent_readings(10).unwrap().len(), 2);
        assert_eq!(cache.total_count().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deeper_request_bypasses_cache() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = CachedRepository::new(db.clone(), Duration::from_secs(5));
        for i in 0..5 {
            db.save_reading(&light(i as f64)).unwrap();
        }

        assert_eq!(cache.recent_readings(2).unwrap().len(), 2);
        assert_eq!(cache.recent_readings(5).unwrap().len(), 5);

        db.save_reading(&light(9.0)).unwrap();
        cache.invalidate();
        assert_eq!(cache.total_count().unwrap(), 6);
    }
}
