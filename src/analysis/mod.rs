// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Analysis module - running statistics and anomaly detection

mod anomaly;
mod statistics;

pub use anomaly::*;
pub use statistics::*;
