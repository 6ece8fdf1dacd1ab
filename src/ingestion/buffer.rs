// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Append-only bounded logs with oldest-first eviction

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::analysis::Alert;
use crate::sensors::Reading;

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for Reading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for Alert {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Drop down to 90% of the cap in one go once it is exceeded
    Batch,
    /// Drop one item per overflow
    Single,
}

/// FIFO log in insertion order. Only the front is ever removed by eviction; purges
/// keep survivors in their original order.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    items: VecDeque<T>,
    cap: usize,
    eviction: Eviction,
}

impl<T: Timestamped + Clone> BoundedLog<T> {
    pub fn new(cap: usize, eviction: Eviction) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
            eviction,
        }
    }

    /// Append and evict if the cap is exceeded. Returns how many items were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        if self.items.len() <= self.cap {
            return 0;
        }

        let target = match self.eviction {
            Eviction::Batch => self.cap - self.cap / 10,
            Eviction::Single => self.cap,
        };
        let excess = self.items.len() - target;
        self.items.drain(..excess);
        excess
    }

    /// The `n` most recently appended items, ascending by timestamp
    pub fn latest(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        let mut out: Vec<T> = self.items.iter().skip(skip).cloned().collect();
        out.sort_by_key(|item| item.timestamp());
        out
    }

    /// Remove everything stamped before `cutoff`. Returns how many were removed.
    pub fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.timestamp() >= cutoff);
        before - self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorType;
    use chrono::Duration;

    fn reading_at(i: i64, base: DateTime<Utc>) -> Reading {
        Reading::new("SND_001", SensorType::Sound, i as f64, base + Duration::milliseconds(i))
    }

    #[test]
    fn test_batch_eviction_keeps_newest() {
        let base = Utc::now();
        let mut log = BoundedLog::new(1_000, Eviction::Batch);
        let mut evicted = 0;
        for i in 0..1_001 {
            evicted += log.push(reading_at(i, base));
        }
        assert_eq!(evicted, 101);
        assert_eq!(log.len(), 900);
        assert_eq!(log.iter().next().unwrap().value, 101.0);
        assert_eq!(log.iter().last().unwrap().value, 1_000.0);
    }

    #[test]
    fn test_single_eviction() {
        let base = Utc::now();
        let mut log = BoundedLog::new(3, Eviction::Single);
        for i in 0..5 {
            log.push(reading_at(i, base));
        }
        let values: Vec<f64> = log.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_latest_is_sorted_by_timestamp() {
        let base = Utc::now();
        let mut log = BoundedLog::new(10, Eviction::Batch);
        // Appended out of timestamp order
        for i in [3, 1, 2, 5, 4] {
            log.push(reading_at(i, base));
        }
        let latest: Vec<f64> = log.latest(3).iter().map(|r| r.value).collect();
        assert_eq!(latest, vec![2.0, 4.0, 5.0]);
        assert_eq!(log.latest(100).len(), 5);
        assert!(log.latest(0).is_empty());
    }

    #[test]
    fn test_purge_keeps_order_and_is_idempotent() {
        let base = Utc::now();
        let mut log = BoundedLog::new(100, Eviction::Batch);
        for i in 0..20 {
            log.push(reading_at(i, base));
        }
        let cutoff = base + Duration::milliseconds(10);
        assert_eq!(log.purge_older_than(cutoff), 10);
        let first: Vec<f64> = log.iter().map(|r| r.value).collect();
        assert_eq!(log.purge_older_than(cutoff), 0);
        let second: Vec<f64> = log.iter().map(|r| r.value).collect();
        assert_eq!(first, second);
        assert_eq!(first, (10..20).map(|i| i as f64).collect::<Vec<_>>());
    }
}
