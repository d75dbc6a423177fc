//! Connection to the sampling daemon
//!
//! Wraps one TCP connection and speaks the command/frame protocol: ASCII
//! command lines out, the `ping` echo line in, and length-prefixed binary
//! frames in both directions. Command/response pairing is strictly
//! sequential; there are no request IDs and no pipelining.

use periscope_shared::protocol::frame::{self, FrameError};
use periscope_shared::protocol::wire::{PayloadMessage, TraceMessage};
use periscope_shared::protocol::{strip_line_ending, Command};
use periscope_shared::{ServerPayload, Trace};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("connection closed by daemon")]
    ConnectionClosed,
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("failed to decode daemon reply: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug)]
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    ping_timeout: Option<Duration>,
}

impl Connection {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Connection> {
        let writer = TcpStream::connect(addr)?;
        // stop lines should reach the daemon promptly
        let _ = writer.set_nodelay(true);
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Connection {
            reader,
            writer,
            ping_timeout: None,
        })
    }

    /// Configure a liveness-check timeout. Currently advisory: `ping`
    /// performs a plain blocking read.
    pub fn set_ping_timeout(&mut self, timeout: Option<Duration>) {
        self.ping_timeout = timeout;
    }

    pub fn ping_timeout(&self) -> Option<Duration> {
        self.ping_timeout
    }

    /// Liveness check: true iff the daemon echoed the literal `ping` line.
    pub fn ping(&mut self) -> Result<bool> {
        self.send_command(Command::Ping)?;
        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(strip_line_ending(&reply) == Command::Ping.as_str())
    }

    /// Push a sampling request; the daemon holds it until `start`.
    pub fn send_payload(&mut self, payload: &ServerPayload) -> Result<()> {
        let body = PayloadMessage::new(payload.clone())
            .to_bytes()
            .map_err(|e| ClientError::Encode(e.to_string()))?;
        self.send_command(Command::Payload)?;
        frame::write_frame(&mut self.writer, &body)?;
        Ok(())
    }

    /// Begin sampling the pending payload.
    pub fn start(&mut self) -> Result<()> {
        self.send_command(Command::Start)
    }

    /// End the running sampling session; the daemon replies with one trace
    /// frame, collected via [`Connection::receive_trace`].
    pub fn stop(&mut self) -> Result<()> {
        self.send_command(Command::Stop)
    }

    /// Ask the daemon process to shut down.
    pub fn shutdown(&mut self) -> Result<()> {
        self.send_command(Command::Exit)
    }

    /// Blocking read of one serialized trace.
    pub fn receive_trace(&mut self) -> Result<Trace> {
        let body = frame::read_frame(&mut self.reader)?;
        let message =
            TraceMessage::from_bytes(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(message.trace)
    }

    fn send_command(&mut self, command: Command) -> Result<()> {
        trace!(command = command.as_str(), "sending command");
        self.writer.write_all(command.as_str().as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
