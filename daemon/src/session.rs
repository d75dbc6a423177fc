//! Per-connection command processing
//!
//! One accepted connection runs one command loop: read a line, dispatch,
//! repeat until the peer sends `exit` or disconnects. `payload` stores a
//! pending sampling request; `start` consumes it and runs the sampling
//! engine on this same connection. A session failure (bad frame, failed
//! materialization, I/O error mid-reply) closes this connection only; the
//! server keeps accepting.

use crate::probe::ProbeRegistry;
use crate::sampler::{self, StopCause};
use anyhow::{Context, Result};
use periscope_shared::protocol::wire::{PayloadMessage, TraceMessage};
use periscope_shared::protocol::{frame, strip_line_ending, Command};
use periscope_shared::ServerPayload;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// How a connection's command loop ended.
pub enum SessionEnd {
    /// Peer went away (clean close or reset); the server accepts the next one.
    Disconnected,
    /// Peer sent `exit`; the server shuts down.
    Exit,
}

pub async fn handle_connection(stream: TcpStream, registry: &ProbeRegistry) -> Result<SessionEnd> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut pending: Option<ServerPayload> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let n = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(e) => {
                debug!("connection read failed: {}", e);
                return Ok(SessionEnd::Disconnected);
            }
        };
        if n == 0 {
            return Ok(SessionEnd::Disconnected);
        }

        match Command::parse(&line) {
            Some(Command::Ping) => {
                writer.write_all(b"ping\n").await?;
                writer.flush().await?;
            }
            Some(Command::Payload) => {
                let body = read_frame(&mut reader).await?;
                let message =
                    PayloadMessage::from_bytes(&body).context("undecodable payload frame")?;
                debug!(
                    period = ?message.payload.sample_period,
                    entries = message.payload.spec.len(),
                    "pending payload stored"
                );
                pending = Some(message.payload);
            }
            Some(Command::Start) => match pending.take() {
                None => warn!("start with no pending payload, ignoring"),
                Some(payload) => {
                    reader = match run_sampling(reader, &mut writer, payload, registry).await? {
                        Some(reader) => reader,
                        None => return Ok(SessionEnd::Disconnected),
                    };
                }
            },
            Some(Command::Stop) => {
                warn!("stop outside a sampling session, ignoring");
            }
            Some(Command::Exit) => {
                info!("exit received");
                return Ok(SessionEnd::Exit);
            }
            None => {
                warn!(line = strip_line_ending(&line), "unrecognized command");
            }
        }
    }
}

type SessionReader = BufReader<tokio::net::tcp::OwnedReadHalf>;

/// Materialize the payload's spec, run the sampling engine, send the trace,
/// release probe handles. Returns the reader for further commands, or `None`
/// when the peer disconnected mid-session (the trace is discarded).
async fn run_sampling(
    reader: SessionReader,
    writer: &mut OwnedWriteHalf,
    payload: ServerPayload,
    registry: &ProbeRegistry,
) -> Result<Option<SessionReader>> {
    if payload.sample_period.is_zero() {
        anyhow::bail!("sample period must be non-zero");
    }

    let mut materialized = registry
        .materialize(&payload.spec)
        .context("failed to materialize measurement spec")?;
    let probes = materialized.probe_count();
    info!(
        probes,
        period = ?payload.sample_period,
        "sampling session started"
    );

    let (trace, cause) =
        sampler::run_session(reader, &mut materialized, payload.sample_period).await?;

    match cause {
        StopCause::StopCommand(reader) => {
            let body = TraceMessage::new(trace).to_bytes()?;
            let mut framed = Vec::with_capacity(body.len() + 4);
            frame::write_frame(&mut framed, &body)?;
            writer.write_all(&framed).await?;
            writer.flush().await?;

            drop(materialized);
            debug!(released = probes, "probe handles released");
            Ok(Some(reader))
        }
        StopCause::Disconnected => {
            debug!("peer disconnected mid-session, trace discarded");
            Ok(None)
        }
    }
}

/// Read one length-prefixed frame from the connection.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;
    let len = frame::validate_len(u32::from_le_bytes(prefix))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
