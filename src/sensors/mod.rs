//! Sensor module - reading model and simulated sensors

mod manager;
mod simulator;
mod traits;

pub use manager::WorkloadSimulator;
pub use simulator::{default_fleet, SensorProfile, SensorSimulator, CITIES, LOCATION_JITTER};
pub use traits::{Reading, ReadingSink, SensorType};
