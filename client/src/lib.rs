//! Client driver for the Periscope sampling daemon
//!
//! Deliberately synchronous (plain `std::net`) so that callers need no async
//! runtime: a measurement client usually wraps one workload invocation, and
//! the daemon side owns all the concurrency.

pub mod connection;
pub mod driver;

pub use connection::{ClientError, Connection};
pub use driver::{run, sample_for, RunOptions, RunOutcome};
