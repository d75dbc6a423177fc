//! Shared types and wire protocol for Periscope
//!
//! This crate contains the measurement data model (values, deferred calls,
//! measurement specs, traces) and the wire protocol used between the sampling
//! daemon and its clients.

pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use types::{payload::*, spec::*, trace::*, value::*};
