// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Sensor simulator for demo/load generation

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use super::{Reading, SensorType};
use crate::config::SimulationConfig;

/// Static description of one virtual sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorProfile {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub unit: String,
    /// Starting point of the random walk
    pub base_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Full width of the per-step drift, centered on zero
    pub drift_range: f64,
    /// Full width of the per-step noise, centered on zero
    pub noise_range: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

struct FleetTemplate {
    sensor_type: SensorType,
    prefix: &'static str,
    base_low: f64,
    base_span: f64,
    min_value: f64,
    max_value: f64,
    drift_range: f64,
    noise_range: f64,
}

const FLEET: [FleetTemplate; 5] = [
    FleetTemplate {
        sensor_type: SensorType::Temperature,
        prefix: "TEMP",
        base_low: 20.0,
        base_span: 10.0,
        min_value: -10.0,
        max_value: 50.0,
        drift_range: 0.5,
        noise_range: 0.2,
    },
    FleetTemplate {
        sensor_type: SensorType::Humidity,
        prefix: "HUM",
        base_low: 40.0,
        base_span: 40.0,
        min_value: 0.0,
        max_value: 100.0,
        drift_range: 2.0,
        noise_range: 1.0,
    },
    FleetTemplate {
        sensor_type: SensorType::Pressure,
        prefix: "PRES",
        base_low: 1013.0,
        base_span: 20.0,
        min_value: 950.0,
        max_value: 1050.0,
        drift_range: 1.0,
        noise_range: 0.5,
    },
    FleetTemplate {
        sensor_type: SensorType::Light,
        prefix: "LIGHT",
        base_low: 200.0,
        base_span: 800.0,
        min_value: 0.0,
        max_value: 2000.0,
        drift_range: 50.0,
        noise_range: 20.0,
    },
    FleetTemplate {
        sensor_type: SensorType::AirQuality,
        prefix: "AQ",
        base_low: 50.0,
        base_span: 100.0,
        min_value: 0.0,
        max_value: 500.0,
        drift_range: 5.0,
        noise_range: 2.0,
    },
];

/// New York, Los Angeles, Chicago, Houston, Phoenix
pub const CITIES: [(f64, f64); 5] = [
    (40.7128, -74.0060),
    (34.0522, -118.2437),
    (41.8781, -87.6298),
    (29.7604, -95.3698),
    (33.4484, -112.0740),
];

/// Sensors are placed within this many degrees of their city on each axis
pub const LOCATION_JITTER: f64 = 0.05;

/// Uniform sample from `[-range/2, range/2)`; zero when the range is empty
fn centered(rng: &mut impl Rng, range: f64) -> f64 {
    if range > 0.0 {
        rng.gen_range(-range / 2.0..range / 2.0)
    } else {
        0.0
    }
}

/// The demo fleet: `per_type` sensors of each simulated type, each type clustered
/// around one city
pub fn default_fleet(per_type: usize, rng: &mut impl Rng) -> Vec<SensorProfile> {
    let mut fleet = Vec::with_capacity(FLEET.len() * per_type);

    for (template, (lat, lon)) in FLEET.iter().zip(CITIES) {
        for i in 1..=per_type {
            fleet.push(SensorProfile {
                sensor_id: format!("{}_{:03}", template.prefix, i),
                sensor_type: template.sensor_type,
                unit: template.sensor_type.default_unit().to_string(),
                base_value: template.base_low + rng.gen::<f64>() * template.base_span,
                min_value: template.min_value,
                max_value: template.max_value,
                drift_range: template.drift_range,
                noise_range: template.noise_range,
                latitude: Some(lat + centered(rng, LOCATION_JITTER * 2.0)),
                longitude: Some(lon + centered(rng, LOCATION_JITTER * 2.0)),
            });
        }
    }

    fleet
}

/// Zero-centered step distribution, `None` for an empty range
fn step(range: f64) -> Option<Uniform<f64>> {
    (range > 0.0).then(|| Uniform::new(-range / 2.0, range / 2.0))
}

/// Bounded random walk for one virtual sensor
pub struct SensorSimulator {
    profile: SensorProfile,
    last_value: f64,
    rng: StdRng,
    drift: Option<Uniform<f64>>,
    noise: Option<Uniform<f64>>,
    anomaly_probability: f64,
    spike_multiplier: f64,
    dip_multiplier: f64,
    transient_anomalies: bool,
    injected: u64,
}

impl SensorSimulator {
    pub fn new(profile: SensorProfile, config: &SimulationConfig, rng: StdRng) -> Self {
        Self {
            last_value: profile.base_value,
            drift: step(profile.drift_range),
            noise: step(profile.noise_range),
            profile,
            rng,
            anomaly_probability: config.anomaly_probability,
            spike_multiplier: config.spike_multiplier,
            dip_multiplier: config.dip_multiplier,
            transient_anomalies: config.transient_anomalies,
            injected: 0,
        }
    }

    pub fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Anomalies injected so far
    pub fn injected(&self) -> u64 {
        self.injected
    }

    /// Advance the walk one step and stamp the result with `now`
    pub fn next_reading(&mut self, now: DateTime<Utc>) -> Reading {
        let drift = self.drift.map_or(0.0, |d| self.rng.sample(d));
        let noise = self.noise.map_or(0.0, |d| self.rng.sample(d));
        let clamped = (self.last_value + drift + noise).clamp(self.profile.min_value, self.profile.max_value);

        let mut value = clamped;
        if self.rng.gen::<f64>() < self.anomaly_probability {
            value *= if self.rng.gen::<bool>() {
                self.spike_multiplier
            } else {
                self.dip_multiplier
            };
            self.injected += 1;
        }

        self.last_value = if self.transient_anomalies { clamped } else { value };

        let mut reading = Reading::new(self.profile.sensor_id.clone(), self.profile.sensor_type, round2(value), now)
            .with_unit(self.profile.unit.clone());
        if let (Some(lat), Some(lon)) = (self.profile.latitude, self.profile.longitude) {
            reading = reading.with_location(lat, lon);
        }
        reading
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_profile(base: f64) -> SensorProfile {
        SensorProfile {
            sensor_id: "SND_001".to_string(),
            sensor_type: SensorType::Sound,
            unit: "dB".to_string(),
            base_value: base,
            min_value: 0.0,
            max_value: 1000.0,
            drift_range: 0.0,
            noise_range: 0.0,
            latitude: None,
            longitude: None,
        }
    }

    fn always_spike(transient: bool) -> SimulationConfig {
        SimulationConfig {
            anomaly_probability: 1.0,
            spike_multiplier: 3.0,
            dip_multiplier: 3.0,
            transient_anomalies: transient,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_fleet_layout() {
        let mut rng = StdRng::seed_from_u64(7);
        let fleet = default_fleet(10, &mut rng);
        assert_eq!(fleet.len(), 50);
        assert_eq!(fleet[0].sensor_id, "TEMP_001");
        assert_eq!(fleet[49].sensor_id, "AQ_010");

        for (i, profile) in fleet.iter().enumerate() {
            let (lat, lon) = CITIES[i / 10];
            assert!((profile.latitude.unwrap() - lat).abs() <= LOCATION_JITTER + 1e-9);
            assert!((profile.longitude.unwrap() - lon).abs() <= LOCATION_JITTER + 1e-9);
            assert!(profile.base_value >= profile.min_value && profile.base_value <= profile.max_value);
        }
        assert_eq!(fleet[20].unit, "hPa");
    }

    #[test]
    fn test_walk_stays_in_range_and_rounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = SimulationConfig {
            anomaly_probability: 0.0,
            ..SimulationConfig::default()
        };
        let profile = default_fleet(1, &mut rng).remove(3);
        let mut sim = SensorSimulator::new(profile, &config, StdRng::seed_from_u64(1));

        for _ in 0..5_000 {
            let reading = sim.next_reading(Utc::now());
            assert!(reading.value >= 0.0 && reading.value <= 2000.0);
            assert_eq!(reading.value, round2(reading.value));
            assert_eq!(reading.sensor_type, SensorType::Light);
            assert!(reading.latitude.is_some());
        }
        assert_eq!(sim.injected(), 0);
    }

    #[test]
    fn test_same_seed_same_series() {
        let config = SimulationConfig::default();
        let now = Utc::now();
        let mut a = SensorSimulator::new(flat_profile(50.0), &config, StdRng::seed_from_u64(9));
        let mut b = SensorSimulator::new(flat_profile(50.0), &config, StdRng::seed_from_u64(9));
        for _ in 0..100 {
            assert_eq!(a.next_reading(now), b.next_reading(now));
        }
    }

    #[test]
    fn test_anomaly_carried_forward_by_default() {
        let mut sim = SensorSimulator::new(flat_profile(100.0), &always_spike(false), StdRng::seed_from_u64(3));
        assert_eq!(sim.next_reading(Utc::now()).value, 300.0);
        assert_eq!(sim.last_value(), 300.0);
        assert_eq!(sim.next_reading(Utc::now()).value, 900.0);
        assert_eq!(sim.next_reading(Utc::now()).value, 2700.0);
        // Clamped before the multiplier is applied
        assert_eq!(sim.next_reading(Utc::now()).value, 3000.0);
    }

    #[test]
    fn test_transient_anomalies_do_not_shift_walk() {
        let mut sim = SensorSimulator::new(flat_profile(100.0), &always_spike(true), StdRng::seed_from_u64(3));
        for _ in 0..3 {
            assert_eq!(sim.next_reading(Utc::now()).value, 300.0);
            assert_eq!(sim.last_value(), 100.0);
        }
        assert_eq!(sim.injected(), 3);
    }
}
