// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Main pipeline engine - owns the store and drives every background task

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Utc;
use sysinfo::System;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{
    run_periodic, BroadcastScheduler, EventBus, HealthStatus, InitialData, RetentionPolicy, SnapshotEvent,
    SnapshotSource, SystemState,
};
use crate::analysis::{Alert, AnomalyDetector, SensorStatistics, StatisticsEngine};
use crate::config::Config;
use crate::db::{CachedRepository, Database, SensorRepository, WriteBehind, WriteBehindWorker};
use crate::error::{CollaboratorResult, ValidationError};
use crate::ingestion::{IngestionStore, Ingested, PurgeReport};
use crate::sensors::{Reading, ReadingSink, WorkloadSimulator};
use crate::streaming::WebSocketServer;

/// Front door for readings: the store, plus the write-behind queue when persistence
/// is on
pub struct Pipeline {
    store: Arc<IngestionStore>,
    persistence: Option<WriteBehind>,
}

impl Pipeline {
    pub fn new(store: Arc<IngestionStore>, persistence: Option<WriteBehind>) -> Self {
        Self { store, persistence }
    }

    pub fn store(&self) -> &Arc<IngestionStore> {
        &self.store
    }

    pub fn add_reading(&self, reading: Reading) -> Result<Ingested, ValidationError> {
        let copy = self.persistence.as_ref().map(|_| reading.clone());
        let ingested = self.store.add_reading(reading)?;

        if let (Some(queue), Some(reading)) = (&self.persistence, copy) {
            queue.record(reading, &ingested);
        }
        Ok(ingested)
    }

    /// Writes lost to a full persistence queue
    pub fn dropped_writes(&self) -> u64 {
        self.persistence.as_ref().map_or(0, |q| q.dropped())
    }
}

impl ReadingSink for Pipeline {
    fn submit(&self, reading: Reading) -> Result<(), ValidationError> {
        self.add_reading(reading).map(|_| ())
    }
}

/// Main SensorFlow engine
pub struct Engine {
    pub config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    bus: Arc<EventBus>,
    repository: Option<Arc<dyn SensorRepository>>,
    cache: Option<Arc<CachedRepository>>,
    source: Arc<dyn SnapshotSource>,
    writer: Option<WriteBehindWorker>,
    websocket: Option<WebSocketServer>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    simulators: Vec<JoinHandle<u64>>,
    state: Arc<RwLock<SystemState>>,
    start_time: Option<Instant>,
}

impl Engine {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let statistics = Arc::new(StatisticsEngine::new());
        let detector = AnomalyDetector::new(config.detection.min_samples, config.detection.sigma_threshold);
        let store = Arc::new(IngestionStore::new(&config.ingestion, detector, statistics));

        let mut repository: Option<Arc<dyn SensorRepository>> = None;
        let mut cache = None;
        let mut writer = None;
        let mut persistence = None;
        let mut source: Arc<dyn SnapshotSource> = store.clone();

        if config.database.enabled {
            let db: Arc<dyn SensorRepository> = Arc::new(Database::open(&config.database.path)?);
            let (queue, worker) = WriteBehind::new(db.clone(), config.database.write_queue_capacity);
            let cached = Arc::new(CachedRepository::new(db.clone(), config.database.cache_ttl()));

            source = cached.clone();
            cache = Some(cached);
            writer = Some(worker);
            persistence = Some(queue);
            repository = Some(db);
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            pipeline: Arc::new(Pipeline::new(store, persistence)),
            bus: Arc::new(EventBus::new(config.broadcast.channel_capacity)),
            repository,
            cache,
            source,
            writer,
            websocket: None,
            shutdown_tx,
            tasks: Vec::new(),
            simulators: Vec::new(),
            state: Arc::new(RwLock::new(SystemState::default())),
            start_time: None,
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.start_time.is_some() {
            bail!("engine is already running");
        }
        info!("Starting SensorFlow engine...");

        let retention = self.retention_policy();
        let rx = self.shutdown_tx.subscribe();
        self.tasks.push((
            "retention",
            tokio::spawn(async move {
                run_periodic(retention, rx).await;
            }),
        ));

        let scheduler = BroadcastScheduler::new(&self.config.broadcast, self.source.clone(), self.bus.clone());
        let rx = self.shutdown_tx.subscribe();
        self.tasks.push((
            "broadcast",
            tokio::spawn(async move {
                run_periodic(scheduler, rx).await;
            }),
        ));

        if let Some(worker) = self.writer.take() {
            let rx = self.shutdown_tx.subscribe();
            self.tasks.push((
                "write-behind",
                tokio::spawn(async move {
                    worker.run(rx).await;
                }),
            ));
        }

        let mut websocket_addr = None;
        if self.config.streaming.websocket_enabled {
            let server = WebSocketServer::new(
                &self.config.streaming,
                &self.config.broadcast,
                self.bus.clone(),
                self.source.clone(),
            );
            let (addr, handle) = server.start(self.shutdown_tx.subscribe()).await?;
            self.tasks.push(("websocket", handle));
            self.websocket = Some(server);
            websocket_addr = Some(addr);
        }

        let mut simulated_sensors = 0;
        if self.config.simulation.enabled {
            let workload = WorkloadSimulator::new(&self.config.simulation, self.pipeline.clone());
            simulated_sensors = workload.len();
            self.simulators = workload.spawn(&self.shutdown_tx);
        }

        self.start_time = Some(Instant::now());
        {
            let mut state = self.state.write().await;
            state.running = true;
            state.simulated_sensors = simulated_sensors;
            state.websocket_addr = websocket_addr.map(|a| a.to_string());
            state.started_at = Some(Utc::now());
        }

        info!("SensorFlow engine started");
        Ok(())
    }

    /// Signal every task and wait for them to finish. Nothing is flushed beyond what
    /// the write-behind worker drains on its own.
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping SensorFlow engine...");

        // No receivers just means nothing was started
        let _ = self.shutdown_tx.send(());

        for (name, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("{} task ended abnormally: {}", name, e);
            }
        }

        let mut submitted = 0;
        for task in self.simulators.drain(..) {
            match task.await {
                Ok(n) => submitted += n,
                Err(e) => error!("Simulator task ended abnormally: {}", e),
            }
        }
        if submitted > 0 {
            info!("Simulated sensors submitted {} readings", submitted);
        }

        self.websocket = None;
        self.start_time = None;
        {
            let mut state = self.state.write().await;
            state.running = false;
        }

        info!("SensorFlow engine stopped");
        Ok(())
    }

    fn retention_policy(&self) -> RetentionPolicy {
        let policy = RetentionPolicy::new(&self.config.retention, self.pipeline.store().clone());
        match &self.repository {
            Some(repository) => policy.with_repository(repository.clone()),
            None => policy,
        }
    }

    pub fn add_reading(&self, reading: Reading) -> Result<Ingested, ValidationError> {
        self.pipeline.add_reading(reading)
    }

    pub fn recent_readings(&self, n: usize) -> Vec<Reading> {
        self.pipeline.store().recent_readings(n)
    }

    pub fn readings_by_sensor(&self, sensor_id: &str, n: usize) -> Vec<Reading> {
        self.pipeline.store().readings_by_sensor(sensor_id, n)
    }

    /// Zero-value view when the sensor has never reported
    pub fn statistics(&self, sensor_id: &str) -> SensorStatistics {
        self.pipeline.store().statistics().for_sensor(sensor_id)
    }

    pub fn all_statistics(&self) -> Vec<SensorStatistics> {
        self.pipeline.store().statistics().snapshot()
    }

    pub fn recent_alerts(&self, n: usize) -> Vec<Alert> {
        self.pipeline.store().recent_alerts(n)
    }

    pub fn total_count(&self) -> usize {
        self.pipeline.store().total_count()
    }

    /// Run the retention sweep now
    pub fn purge(&self) -> PurgeReport {
        let report = self.retention_policy().sweep(Utc::now());
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
        report
    }

    /// The snapshot handed to a new subscriber
    pub fn initial_data(&self) -> CollaboratorResult<InitialData> {
        self.source
            .initial_data(self.config.broadcast.initial_readings, self.config.broadcast.initial_alerts)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn websocket_addr(&self) -> Option<SocketAddr> {
        self.state
            .read()
            .await
            .websocket_addr
            .as_deref()
            .and_then(|a| a.parse().ok())
    }

    pub async fn state(&self) -> SystemState {
        self.state.read().await.clone()
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn health(&self) -> HealthStatus {
        let store = self.pipeline.store();
        let counters = store.counters();

        let dropped = self.pipeline.dropped_writes();
        if dropped > 0 {
            warn!("{} writes dropped by the persistence queue so far", dropped);
        }

        HealthStatus {
            status: if self.start_time.is_some() { "Healthy" } else { "Stopped" }.to_string(),
            timestamp: Utc::now(),
            total_readings: store.total_count(),
            active_sensors: store.sensor_ids().len(),
            recent_alerts: store.alert_count(),
            ingested: counters.ingested,
            rejected: counters.rejected,
            alerts_raised: counters.alerts_raised,
            subscribers: self.bus.subscriber_count(),
            memory_bytes: process_memory(),
            uptime_seconds: self.uptime(),
            storage: if self.repository.is_some() { "sqlite" } else { "in-memory" }.to_string(),
        }
    }
}

fn process_memory() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map(|p| p.memory())
}

impl ReadingSink for Engine {
    fn submit(&self, reading: Reading) -> Result<(), ValidationError> {
        self.pipeline.submit(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorType;
    use chrono::Duration;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.simulation.enabled = false;
        config.streaming.websocket_enabled = false;
        config
    }

    #[tokio::test]
    async fn test_query_surface() {
        let engine = Engine::new(quiet_config()).await.unwrap();
        let now = Utc::now();
        engine
            .add_reading(Reading::new("MOT_001", SensorType::Motion, 1.0, now))
            .unwrap();
        engine
            .add_reading(Reading::new("MOT_001", SensorType::Motion, 3.0, now + Duration::seconds(1)))
            .unwrap();
        assert!(engine.add_reading(Reading::new("MOT_001", SensorType::Motion, f64::NAN, now)).is_err());

        assert_eq!(engine.total_count(), 2);
        assert_eq!(engine.statistics("MOT_001").average, 2.0);
        assert_eq!(engine.statistics("unknown").count, 0);
        assert_eq!(engine.all_statistics().len(), 1);
        assert_eq!(engine.readings_by_sensor("MOT_001", 1)[0].value, 3.0);

        let initial = engine.initial_data().unwrap();
        assert_eq!(initial.total_count, 2);
        assert_eq!(initial.readings.len(), 2);

        let health = engine.health();
        assert_eq!(health.status, "Stopped");
        assert_eq!(health.rejected, 1);
        assert_eq!(health.storage, "in-memory");
    }

    #[tokio::test]
    async fn test_start_broadcasts_and_stops() {
        let mut config = quiet_config();
        config.broadcast.tick_ms = 20;
        let mut engine = Engine::new(config).await.unwrap();
        let mut events = engine.subscribe();

        engine
            .add_reading(Reading::new("SND_002", SensorType::Sound, 55.0, Utc::now()))
            .unwrap();
        engine.start().await.unwrap();
        assert!(engine.start().await.is_err());
        assert!(engine.state().await.running);

        let first = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.name(), "NewReadings");

        engine.stop().await.unwrap();
        assert!(!engine.state().await.running);
        assert_eq!(engine.health().status, "Stopped");
    }

    #[tokio::test]
    async fn test_persistence_is_written_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config();
        config.database.enabled = true;
        config.database.path = dir.path().join("engine.db");

        let mut engine = Engine::new(config.clone()).await.unwrap();
        engine.start().await.unwrap();
        for i in 0..10 {
            engine
                .add_reading(Reading::new("AQ_007", SensorType::AirQuality, 80.0 + i as f64, Utc::now()))
                .unwrap();
        }
        engine.stop().await.unwrap();
        assert_eq!(engine.health().storage, "sqlite");

        let db = Database::open(&config.database.path).unwrap();
        assert_eq!(db.count_readings().unwrap(), 10);
        assert_eq!(db.query_statistics("AQ_007").unwrap().unwrap().count, 10);
    }
}
