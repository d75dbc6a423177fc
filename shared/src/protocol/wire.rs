//! Wire encoding for payload and trace blobs.
//!
//! Uses bincode with an explicit config so daemon and client always use the
//! same encoding (fixint for lengths and enum tags), avoiding version/skew
//! mismatches. Both blob kinds travel inside a versioned envelope; decoding
//! rejects a version it does not speak rather than misreading the body.

use crate::types::payload::ServerPayload;
use crate::types::trace::Trace;
use anyhow::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Single bincode config for the wire format: fixint encoding so vec lengths
/// and enum tags have a fixed size and cannot be misinterpreted across builds
/// or bincode versions.
fn wire_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Envelope for the client → daemon sampling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub version: u32,
    pub payload: ServerPayload,
}

impl PayloadMessage {
    pub fn new(payload: ServerPayload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_bincode().serialize(self).map_err(Into::into)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let msg: Self = wire_bincode()
            .deserialize(bytes)
            .map_err(|e| anyhow::anyhow!("failed to decode payload message: {}", e))?;
        if msg.version != PROTOCOL_VERSION {
            anyhow::bail!(
                "payload message version mismatch: got {}, expected {}",
                msg.version,
                PROTOCOL_VERSION
            );
        }
        Ok(msg)
    }
}

/// Envelope for the daemon → client trace result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceMessage {
    pub version: u32,
    pub trace: Trace,
}

impl TraceMessage {
    pub fn new(trace: Trace) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            trace,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_bincode().serialize(self).map_err(Into::into)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let msg: Self = wire_bincode()
            .deserialize(bytes)
            .map_err(|e| anyhow::anyhow!("failed to decode trace message: {}", e))?;
        if msg.version != PROTOCOL_VERSION {
            anyhow::bail!(
                "trace message version mismatch: got {}, expected {}",
                msg.version,
                PROTOCOL_VERSION
            );
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::spec::MeasurementSpec;
    use crate::types::trace::Tick;
    use crate::types::value::Value;
    use std::time::Duration;

    fn sample_payload() -> ServerPayload {
        let spec = MeasurementSpec::builder()
            .deferred("t", "timestamp", vec![], vec![])
            .literal("n", 5i64)
            .build()
            .unwrap();
        ServerPayload::new(Duration::from_millis(100), spec)
    }

    #[test]
    fn test_payload_roundtrip() {
        let msg = PayloadMessage::new(sample_payload());
        let bytes = msg.to_bytes().unwrap();
        let decoded = PayloadMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn test_payload_roundtrip_preserves_spec_order() {
        let spec = MeasurementSpec::builder()
            .literal("zeta", 1i64)
            .literal("alpha", 2i64)
            .literal("mid", 3i64)
            .build()
            .unwrap();
        let msg = PayloadMessage::new(ServerPayload::new(Duration::from_millis(10), spec));
        let decoded = PayloadMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        let names: Vec<&str> = decoded.payload.spec.names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_trace_roundtrip() {
        let trace = Trace {
            ticks: vec![Tick {
                index: 0,
                elapsed_us: 1000,
                samples: vec![("t".to_string(), Value::Int(42))],
            }],
        };
        let msg = TraceMessage::new(trace.clone());
        let decoded = TraceMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.trace, trace);
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let bytes = vec![0xFF; 20];
        assert!(PayloadMessage::from_bytes(&bytes).is_err());
        assert!(TraceMessage::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut msg = TraceMessage::new(Trace::new());
        msg.version = PROTOCOL_VERSION + 1;
        let bytes = wire_bincode().serialize(&msg).unwrap();
        assert!(TraceMessage::from_bytes(&bytes).is_err());
    }
}
