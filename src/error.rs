// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Error taxonomy shared by the ingestion pipeline and its collaborators

use thiserror::Error;

/// A reading that can never be ingested. Nothing is mutated when this is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("sensor id is required")]
    EmptySensorId,

    #[error("sensor {sensor_id} reported a non-finite value ({value})")]
    NonFiniteValue { sensor_id: String, value: f64 },

    #[error("sensor {sensor_id} reported a non-finite {axis}")]
    NonFiniteCoordinate { sensor_id: String, axis: &'static str },
}

/// Failure of something outside the in-memory core, such as the database or a
/// snapshot source. Always transient from the core's point of view: the caller
/// logs it and the next natural cycle tries again.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("write-behind queue is full, dropped {0}")]
    QueueFull(&'static str),

    #[error("{0} channel is closed")]
    Closed(&'static str),

    #[error("{0} is unavailable")]
    Unavailable(String),
}

/// Shorthand for results crossing a collaborator boundary
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;
