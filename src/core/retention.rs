// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Age-based retention sweep

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::PeriodicTask;
use crate::config::RetentionConfig;
use crate::db::SensorRepository;
use crate::ingestion::{IngestionStore, PurgeReport};

/// Periodically drops readings and alerts older than the retention window, from the
/// store and from the backing repository when there is one.
pub struct RetentionPolicy {
    store: Arc<IngestionStore>,
    repository: Option<Arc<dyn SensorRepository>>,
    window: chrono::Duration,
    interval: Duration,
}

impl RetentionPolicy {
    pub fn new(config: &RetentionConfig, store: Arc<IngestionStore>) -> Self {
        Self {
            store,
            repository: None,
            window: config.window(),
            interval: config.sweep_interval(),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn SensorRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Run one sweep as of `now`
    pub fn sweep(&self, now: DateTime<Utc>) -> PurgeReport {
        let cutoff = self.cutoff(now);
        let report = self.store.purge_older_than(cutoff);

        if let Some(repository) = &self.repository {
            match repository.purge_older_than(cutoff) {
                Ok(removed) => info!("Purged {} stored rows older than {}", removed, cutoff.to_rfc3339()),
                Err(e) => error!("Repository purge failed, retrying next sweep: {}", e),
            }
        }

        report
    }
}

#[async_trait]
impl PeriodicTask for RetentionPolicy {
    fn name(&self) -> &str {
        "retention sweep"
    }

    fn period(&self) -> Duration {
        self.interval
    }

    fn fire_immediately(&self) -> bool {
        false
    }

    async fn tick(&mut self) {
        let report = self.sweep(Utc::now());
        info!(
            "Data purge completed: {} readings, {} alerts removed",
            report.readings, report.alerts
        );
    }
}
