// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Workload simulator - one independent generator task per virtual sensor

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use super::simulator::{default_fleet, SensorProfile, SensorSimulator};
use super::ReadingSink;
use crate::config::SimulationConfig;

/// Pause after a rejected submission before the next attempt
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Feeds a reading sink from a fleet of simulated sensors. Generators share nothing
/// but the sink.
pub struct WorkloadSimulator {
    simulators: Vec<SensorSimulator>,
    sink: Arc<dyn ReadingSink>,
    period: Duration,
}

impl WorkloadSimulator {
    /// Build the default fleet described by `config`
    pub fn new(config: &SimulationConfig, sink: Arc<dyn ReadingSink>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let profiles = default_fleet(config.sensors_per_type, &mut rng);
        Self::with_profiles(config, profiles, sink)
    }

    pub fn with_profiles(config: &SimulationConfig, profiles: Vec<SensorProfile>, sink: Arc<dyn ReadingSink>) -> Self {
        let simulators = profiles
            .into_iter()
            .enumerate()
            .map(|(i, profile)| {
                let rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64 + 1)),
                    None => StdRng::from_entropy(),
                };
                SensorSimulator::new(profile, config, rng)
            })
            .collect();

        Self {
            simulators,
            sink,
            period: config.period(),
        }
    }

    pub fn profiles(&self) -> Vec<&SensorProfile> {
        self.simulators.iter().map(|s| s.profile()).collect()
    }

    pub fn len(&self) -> usize {
        self.simulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simulators.is_empty()
    }

    /// Start one task per sensor. Each resolves to the number of readings it
    /// submitted once `shutdown` fires.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<u64>> {
        info!("Starting {} simulated sensors", self.simulators.len());

        self.simulators
            .into_iter()
            .map(|simulator| {
                let sink = self.sink.clone();
                tokio::spawn(run_sensor(simulator, sink, self.period, shutdown.subscribe()))
            })
            .collect()
    }
}

async fn run_sensor(
    mut simulator: SensorSimulator,
    sink: Arc<dyn ReadingSink>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> u64 {
    let mut submitted = 0;

    loop {
        let reading = simulator.next_reading(Utc::now());
        let pause = match sink.submit(reading) {
            Ok(()) => {
                submitted += 1;
                period
            }
            Err(e) => {
                error!("Error simulating sensor {}: {}", simulator.profile().sensor_id, e);
                RETRY_DELAY
            }
        };

        tokio::select! {
            _ = sleep(pause) => {}
            _ = shutdown.recv() => break,
        }
    }

    submitted
}
