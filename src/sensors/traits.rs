// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Sensor traits and common types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sensor types supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorType {
    Temperature,
    Humidity,
    Pressure,
    Light,
    Motion,
    Sound,
    AirQuality,
}

impl SensorType {
    pub const ALL: [SensorType; 7] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Pressure,
        SensorType::Light,
        SensorType::Motion,
        SensorType::Sound,
        SensorType::AirQuality,
    ];

    pub fn default_unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Humidity => "%",
            SensorType::Pressure => "hPa",
            SensorType::Light => "lux",
            SensorType::Motion => "events",
            SensorType::Sound => "dB",
            SensorType::AirQuality => "AQI",
        }
    }

    /// Stable name used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
            SensorType::Pressure => "Pressure",
            SensorType::Light => "Light",
            SensorType::Motion => "Motion",
            SensorType::Sound => "Sound",
            SensorType::AirQuality => "AirQuality",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown sensor type '{}'", s))
    }
}

/// A single timestamped measurement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Reading {
    /// Build a reading with the type's default unit and no location
    pub fn new(sensor_id: impl Into<String>, sensor_type: SensorType, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
            unit: sensor_type.default_unit().to_string(),
            sensor_type,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Check the reading can enter the pipeline
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sensor_id.trim().is_empty() {
            return Err(ValidationError::EmptySensorId);
        }
        if !self.value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                sensor_id: self.sensor_id.clone(),
                value: self.value,
            });
        }
        for (axis, coordinate) in [("latitude", self.latitude), ("longitude", self.longitude)] {
            if matches!(coordinate, Some(c) if !c.is_finite()) {
                return Err(ValidationError::NonFiniteCoordinate {
                    sensor_id: self.sensor_id.clone(),
                    axis,
                });
            }
        }
        Ok(())
    }
}

/// Anything readings can be submitted to: the bare store, or the engine that also
/// persists behind it.
pub trait ReadingSink: Send + Sync {
    fn submit(&self, reading: Reading) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_malformed_readings() {
        let now = Utc::now();
        assert_eq!(
            Reading::new("", SensorType::Light, 1.0, now).validate(),
            Err(ValidationError::EmptySensorId)
        );
        assert!(matches!(
            Reading::new("LIGHT_001", SensorType::Light, f64::INFINITY, now).validate(),
            Err(ValidationError::NonFiniteValue { .. })
        ));
        assert!(matches!(
            Reading::new("LIGHT_001", SensorType::Light, 1.0, now)
                .with_location(f64::NAN, 0.0)
                .validate(),
            Err(ValidationError::NonFiniteCoordinate { axis: "latitude", .. })
        ));
        assert!(Reading::new("LIGHT_001", SensorType::Light, 1.0, now).validate().is_ok());
    }

    #[test]
    fn test_reading_wire_format() {
        let reading = Reading::new("HUM_002", SensorType::Humidity, 55.5, Utc::now());
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["sensorId"], "HUM_002");
        assert_eq!(json["type"], "Humidity");
        assert_eq!(json["unit"], "%");
        assert!(json.get("latitude").is_none());
    }

    #[test]
    fn test_sensor_type_parses_its_own_name() {
        for t in SensorType::ALL {
            assert_eq!(t.as_str().parse::<SensorType>(), Ok(t));
        }
        assert!("Radiation".parse::<SensorType>().is_err());
    }
}
