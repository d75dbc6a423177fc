//! Sampling engine
//!
//! Runs the timed measurement loop for one session, concurrently with a stop
//! watcher reading lines from the same connection. The two tasks share one
//! completion flag: the watcher sets it, the sample loop checks it only after
//! finishing the in-flight tick, so worst-case shutdown latency is one full
//! sample period plus one measurement round. The first tick lands one full
//! period after start; sampling is periodic, not clock-aligned.

use crate::probe::MaterializedSpec;
use anyhow::Result;
use periscope_shared::protocol::Command;
use periscope_shared::{Tick, Trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Why the sampling loop stopped. On a clean `stop` the watcher hands the
/// buffered reader back so the session can resume command processing.
pub enum StopCause<R> {
    StopCommand(R),
    Disconnected,
}

/// Run one sampling session to completion.
///
/// Returns the finalized trace (ticks strictly ordered by index) and what
/// ended the session. There is no timeout: a peer that never sends `stop`
/// keeps the session running indefinitely.
pub async fn run_session<R>(
    reader: R,
    materialized: &mut MaterializedSpec,
    period: Duration,
) -> Result<(Trace, StopCause<R>)>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let watcher = tokio::spawn(watch_for_stop(reader, stop_flag.clone()));

    let started = Instant::now();
    let mut trace = Trace::new();
    let mut index = 0u64;

    loop {
        tokio::time::sleep(period).await;

        let samples = match materialized.snapshot() {
            Ok(samples) => samples,
            Err(e) => {
                watcher.abort();
                let _ = watcher.await;
                return Err(e);
            }
        };
        trace.ticks.push(Tick {
            index,
            elapsed_us: started.elapsed().as_micros() as u64,
            samples,
        });
        index += 1;

        // stop is honored only at tick boundaries
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }
    }

    debug!(ticks = trace.len(), "sampling loop finished");

    let cause = match watcher.await {
        Ok(cause) => cause,
        Err(e) => {
            warn!("stop watcher task failed: {}", e);
            StopCause::Disconnected
        }
    };
    Ok((trace, cause))
}

/// Read lines until `stop` or the stream ends, then raise the flag. Any other
/// line during a session is unhandled; log it and keep watching.
async fn watch_for_stop<R>(mut reader: R, stop_flag: Arc<AtomicBool>) -> StopCause<R>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("peer closed connection during sampling session");
                stop_flag.store(true, Ordering::SeqCst);
                return StopCause::Disconnected;
            }
            Ok(_) => match Command::parse(&line) {
                Some(Command::Stop) => {
                    stop_flag.store(true, Ordering::SeqCst);
                    return StopCause::StopCommand(reader);
                }
                _ => warn!(
                    line = periscope_shared::protocol::strip_line_ending(&line),
                    "unhandled line during sampling session"
                ),
            },
            Err(e) => {
                debug!("read failed during sampling session: {}", e);
                stop_flag.store(true, Ordering::SeqCst);
                return StopCause::Disconnected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeRegistry;
    use periscope_shared::MeasurementSpec;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn counter_spec() -> MaterializedSpec {
        let registry = ProbeRegistry::with_builtins();
        let spec = MeasurementSpec::builder()
            .deferred("c", "counter", vec![], vec![])
            .build()
            .unwrap();
        registry.materialize(&spec).unwrap()
    }

    #[tokio::test]
    async fn test_stop_mid_sleep_still_completes_the_tick() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut materialized = counter_spec();

        // stop arrives well before the first tick completes
        client.write_all(b"stop\n").await.unwrap();

        let (trace, cause) = run_session(
            BufReader::new(server),
            &mut materialized,
            Duration::from_millis(30),
        )
        .await
        .unwrap();

        assert!(matches!(cause, StopCause::StopCommand(_)));
        assert!((1..=2).contains(&trace.len()), "got {} ticks", trace.len());
        assert_eq!(trace.ticks[0].index, 0);
    }

    #[tokio::test]
    async fn test_ticks_are_ordered_and_periodic() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut materialized = counter_spec();
        let period = Duration::from_millis(20);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(110)).await;
            client.write_all(b"stop\n").await.unwrap();
            client
        });

        let (trace, cause) = run_session(BufReader::new(server), &mut materialized, period)
            .await
            .unwrap();
        let _ = stopper.await.unwrap();

        assert!(matches!(cause, StopCause::StopCommand(_)));
        assert!(trace.len() >= 3, "expected several ticks, got {}", trace.len());

        for (i, window) in trace.ticks.windows(2).enumerate() {
            assert_eq!(window[1].index, window[0].index + 1);
            let gap = window[1].elapsed_us - window[0].elapsed_us;
            assert!(
                gap >= 15_000,
                "tick {} followed after only {}us",
                i + 1,
                gap
            );
        }
    }

    #[tokio::test]
    async fn test_unhandled_lines_are_tolerated() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut materialized = counter_spec();

        client.write_all(b"ping\nnonsense\nstop\n").await.unwrap();

        let (trace, cause) = run_session(
            BufReader::new(server),
            &mut materialized,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert!(matches!(cause, StopCause::StopCommand(_)));
        assert!(!trace.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_ends_the_session() {
        let (client, server) = tokio::io::duplex(256);
        let mut materialized = counter_spec();

        drop(client);

        let (trace, cause) = run_session(
            BufReader::new(server),
            &mut materialized,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert!(matches!(cause, StopCause::Disconnected));
        assert!(!trace.is_empty());
    }
}
