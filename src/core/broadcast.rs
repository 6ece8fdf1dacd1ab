// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Periodic snapshot broadcast

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, warn};

use super::{PeriodicTask, SnapshotEvent, SnapshotSink, SnapshotSource, StatisticsUpdate};
use crate::analysis::Alert;
use crate::config::BroadcastConfig;
use crate::error::CollaboratorResult;
use crate::sensors::Reading;

/// How one step of a tick went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Published,
    /// Nothing to send, or not due yet
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub readings: StepOutcome,
    pub statistics: StepOutcome,
    pub alerts: StepOutcome,
}

/// Pushes recent readings and alerts every tick, and a statistics snapshot whenever
/// the statistics interval has elapsed since the last successful one. Each step is
/// isolated: a failing step is logged and the others still run.
pub struct BroadcastScheduler {
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn SnapshotSink>,
    tick: Duration,
    stats_interval: Duration,
    readings_per_tick: usize,
    alerts_per_tick: usize,
    last_stats: Option<Instant>,
    ticks: u64,
}

impl BroadcastScheduler {
    pub fn new(config: &BroadcastConfig, source: Arc<dyn SnapshotSource>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self {
            source,
            sink,
            tick: config.tick(),
            stats_interval: config.stats_interval(),
            readings_per_tick: config.readings_per_tick,
            alerts_per_tick: config.alerts_per_tick,
            last_stats: None,
            ticks: 0,
        }
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn stats_due(&self, now: Instant) -> bool {
        self.last_stats
            .map_or(true, |last| now.duration_since(last) >= self.stats_interval)
    }

    /// Run one broadcast cycle as of `now`, reading the source on the calling thread
    pub fn run_once(&mut self, now: Instant) -> TickReport {
        let fetched = Fetched::collect(
            self.source.as_ref(),
            self.readings_per_tick,
            self.alerts_per_tick,
            self.stats_due(now),
        );
        self.publish(fetched, now)
    }

    fn publish(&mut self, fetched: Fetched, now: Instant) -> TickReport {
        self.ticks += 1;

        let readings = self.step("readings", || {
            let readings = fetched.readings?;
            self.publish_if_any(readings, SnapshotEvent::NewReadings)
        });

        let statistics = match fetched.statistics {
            Some(update) => {
                let outcome = self.step("statistics", || {
                    self.sink.publish(SnapshotEvent::StatisticsUpdate(update?))?;
                    Ok(StepOutcome::Published)
                });
                if outcome == StepOutcome::Published {
                    self.last_stats = Some(now);
                }
                outcome
            }
            None => StepOutcome::Skipped,
        };

        let alerts = self.step("alerts", || {
            let alerts = fetched.alerts?;
            self.publish_if_any(alerts, SnapshotEvent::NewAlerts)
        });

        TickReport {
            readings,
            statistics,
            alerts,
        }
    }

    fn step<F>(&self, what: &str, f: F) -> StepOutcome
    where
        F: FnOnce() -> CollaboratorResult<StepOutcome>,
    {
        match f() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Broadcast of {} failed: {}", what, e);
                StepOutcome::Failed
            }
        }
    }

    fn publish_if_any<T>(&self, items: Vec<T>, wrap: fn(Vec<T>) -> SnapshotEvent) -> CollaboratorResult<StepOutcome> {
        if items.is_empty() {
            return Ok(StepOutcome::Skipped);
        }
        self.sink.publish(wrap(items))?;
        Ok(StepOutcome::Published)
    }
}

/// Everything one tick reads from the source. Each part fails on its own.
struct Fetched {
    readings: CollaboratorResult<Vec<Reading>>,
    /// `None` when statistics are not due
    statistics: Option<CollaboratorResult<StatisticsUpdate>>,
    alerts: CollaboratorResult<Vec<Alert>>,
}

impl Fetched {
    fn collect(source: &dyn SnapshotSource, readings: usize, alerts: usize, with_stats: bool) -> Self {
        let statistics = with_stats.then(|| -> CollaboratorResult<StatisticsUpdate> {
            Ok(StatisticsUpdate {
                statistics: source.all_statistics()?,
                total_count: source.total_count()?,
                timestamp: Utc::now(),
            })
        });
        Self {
            readings: source.recent_readings(readings),
            statistics,
            alerts: source.recent_alerts(alerts),
        }
    }
}

#[async_trait]
impl PeriodicTask for BroadcastScheduler {
    fn name(&self) -> &str {
        "broadcast scheduler"
    }

    fn period(&self) -> Duration {
        self.tick
    }

    async fn tick(&mut self) {
        let now = Instant::now();
        let source = self.source.clone();
        let (readings, alerts, with_stats) = (self.readings_per_tick, self.alerts_per_tick, self.stats_due(now));

        // The source may be a database; keep its reads off the async workers
        let fetched = match tokio::task::spawn_blocking(move || {
            Fetched::collect(source.as_ref(), readings, alerts, with_stats)
        })
        .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("Broadcast fetch task failed: {}", e);
                return;
            }
        };

        let report = self.publish(fetched, now);
        if report.readings == StepOutcome::Failed
            && report.statistics == StepOutcome::Failed
            && report.alerts == StepOutcome::Failed
        {
            warn!("Broadcast tick {} failed in every step", self.ticks);
        }
    }
}
