//! Wire protocol definitions
//!
//! This module defines the protocol spoken between the sampling daemon and
//! its clients: newline-terminated ASCII command lines, plus length-prefixed
//! binary frames for the payload and trace blobs.

pub mod frame;
pub mod wire;

/// A recognized command line.
///
/// Commands are case-sensitive ASCII, one per line. Anything else is a
/// protocol violation the daemon logs and tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness check; the receiver echoes the literal line back.
    Ping,
    /// One serialized payload frame follows immediately.
    Payload,
    /// Begin the sampling session for the pending payload.
    Start,
    /// End the running sampling session (only meaningful mid-session).
    Stop,
    /// Shut the daemon down.
    Exit,
}

impl Command {
    /// Parse a raw line as read from the stream (trailing `\n`/`\r\n` allowed).
    pub fn parse(line: &str) -> Option<Command> {
        match strip_line_ending(line) {
            "ping" => Some(Command::Ping),
            "payload" => Some(Command::Payload),
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "exit" => Some(Command::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Payload => "payload",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Exit => "exit",
        }
    }
}

/// Strip one trailing line ending, leaving the command text untouched.
pub fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}
