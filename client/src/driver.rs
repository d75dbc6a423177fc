//! The full request/response choreography around one measured workload
//!
//! `run` performs: connect, liveness check, payload push, start, optional
//! idle delay, workload, optional idle delay, stop, trace fetch. Each step
//! aborts the whole operation on failure — in particular a failed workload
//! is propagated immediately and no `stop`/trace fetch is attempted.

use crate::connection::{ClientError, Connection};
use anyhow::{Context, Result};
use periscope_shared::{ServerPayload, Trace};
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wait this long after `start` and again after the workload, letting the
    /// sampler record baseline ticks around the load.
    pub idle_delay: Option<Duration>,

    /// Connection attempts before giving up.
    pub connect_attempts: u32,

    /// Initial delay between connection attempts (doubles per attempt).
    pub connect_backoff: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            idle_delay: None,
            connect_attempts: 3,
            connect_backoff: Duration::from_millis(100),
        }
    }
}

/// What `run` hands back.
#[derive(Debug)]
pub struct RunOutcome<T> {
    /// The sampled time series.
    pub trace: Trace,
    /// The workload's own return value.
    pub output: T,
    /// Wall-clock duration of the workload call only (idle delays and the
    /// protocol handshake excluded).
    pub elapsed: Duration,
}

/// Run `workload` while the daemon at `addr` samples `payload`'s spec.
pub fn run<A, T, F>(
    addr: A,
    payload: &ServerPayload,
    options: &RunOptions,
    workload: F,
) -> Result<RunOutcome<T>>
where
    A: ToSocketAddrs,
    F: FnOnce() -> Result<T>,
{
    let mut conn = connect_with_backoff(&addr, options.connect_attempts, options.connect_backoff)
        .context("failed to connect to sampling daemon")?;

    if !conn.ping().context("liveness check failed")? {
        anyhow::bail!("daemon did not echo the liveness check");
    }

    conn.send_payload(payload)
        .context("failed to send payload")?;
    conn.start().context("failed to start sampling")?;

    if let Some(delay) = options.idle_delay {
        std::thread::sleep(delay);
    }

    let started = Instant::now();
    let output = workload()?;
    let elapsed = started.elapsed();
    debug!(?elapsed, "workload finished");

    if let Some(delay) = options.idle_delay {
        std::thread::sleep(delay);
    }

    conn.stop().context("failed to stop sampling")?;
    let trace = conn
        .receive_trace()
        .context("failed to receive trace")?;

    Ok(RunOutcome {
        trace,
        output,
        elapsed,
    })
}

/// Convenience wrapper when only the trace is wanted: samples for
/// `duration` with no workload.
pub fn sample_for<A: ToSocketAddrs>(
    addr: A,
    payload: &ServerPayload,
    duration: Duration,
) -> Result<Trace> {
    let outcome = run(addr, payload, &RunOptions::default(), || {
        std::thread::sleep(duration);
        Ok(())
    })?;
    Ok(outcome.trace)
}

fn connect_with_backoff<A: ToSocketAddrs>(
    addr: &A,
    max_attempts: u32,
    initial_delay: Duration,
) -> Result<Connection, ClientError> {
    let max_attempts = max_attempts.max(1);
    let mut delay = initial_delay;
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match Connection::connect(addr) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "connect failed (attempt {}/{}): {}",
                    attempt, max_attempts, e
                );
                last_err = Some(e);
                if attempt < max_attempts {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    Err(last_err.unwrap())
}
