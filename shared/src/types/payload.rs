//! Server payload: everything the daemon needs to run one sampling session

use crate::types::spec::MeasurementSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The sampling request a client pushes ahead of `start`.
///
/// Immutable; travels the wire as one serialized blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPayload {
    /// Delay between consecutive measurement ticks.
    pub sample_period: Duration,
    /// What to measure each tick.
    pub spec: MeasurementSpec,
}

impl ServerPayload {
    pub fn new(sample_period: Duration, spec: MeasurementSpec) -> Self {
        Self {
            sample_period,
            spec,
        }
    }
}
