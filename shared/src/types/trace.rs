//! Sampled traces
//!
//! A trace is what a sampling session produces: one tick per sample period,
//! each tick holding one value per measurement source in spec order.

use crate::types::value::Value;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One measurement snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Zero-based tick number; strictly increasing within a trace.
    pub index: u64,
    /// Microseconds since the session started sampling.
    pub elapsed_us: u64,
    /// One value per measurement source, in spec order.
    pub samples: Vec<(String, Value)>,
}

/// Ordered sequence of per-tick measurement records from one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub ticks: Vec<Tick>,
}

impl Trace {
    pub fn new() -> Self {
        Self { ticks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// All values recorded for one measurement name, in tick order.
    pub fn samples_for(&self, name: &str) -> Vec<&Value> {
        self.ticks
            .iter()
            .filter_map(|tick| {
                tick.samples
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
            })
            .collect()
    }

    /// Convert to a JSON value for export; sample order follows spec order.
    pub fn to_json(&self) -> serde_json::Value {
        let ticks: Vec<serde_json::Value> = self
            .ticks
            .iter()
            .map(|tick| {
                let samples: serde_json::Map<String, serde_json::Value> = tick
                    .samples
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                serde_json::json!({
                    "index": tick.index,
                    "elapsed_us": tick.elapsed_us,
                    "samples": samples,
                })
            })
            .collect();
        serde_json::json!({ "ticks": ticks })
    }

    /// Write the trace as pretty-printed JSON.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_json())
            .context("failed to serialize trace to JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace() -> Trace {
        Trace {
            ticks: vec![
                Tick {
                    index: 0,
                    elapsed_us: 100,
                    samples: vec![
                        ("t".to_string(), Value::Int(1)),
                        ("n".to_string(), Value::Int(5)),
                    ],
                },
                Tick {
                    index: 1,
                    elapsed_us: 200,
                    samples: vec![
                        ("t".to_string(), Value::Int(2)),
                        ("n".to_string(), Value::Int(5)),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_samples_for_collects_in_tick_order() {
        let trace = sample_trace();
        let values = trace.samples_for("t");
        assert_eq!(values, vec![&Value::Int(1), &Value::Int(2)]);
        assert!(trace.samples_for("missing").is_empty());
    }

    #[test]
    fn test_json_export_is_valid_and_ordered() {
        let trace = sample_trace();
        let mut buf = Vec::new();
        trace.write_json(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["ticks"].as_array().unwrap().len(), 2);
        // "t" was recorded before "n" and must be exported first
        assert!(text.find("\"t\"").unwrap() < text.find("\"n\"").unwrap());
    }
}
