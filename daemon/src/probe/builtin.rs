//! Builtin probes
//!
//! A small set of measurement sources the daemon ships with so it is usable
//! without external probe crates: wall-clock and monotonic time, plus two
//! trivial sources (`constant`, `counter`) that mostly earn their keep in
//! integration tests and smoke checks.

use super::{Probe, ProbeRegistry};
use anyhow::{Context, Result};
use periscope_shared::{DeferredCall, Value};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Register the builtin probe set under their well-known names.
pub fn register_builtins(registry: &mut ProbeRegistry) {
    registry.register("timestamp", |call| {
        reject_args("timestamp", call)?;
        Ok(Box::new(TimestampProbe) as Box<dyn Probe>)
    });
    registry.register("monotonic_ns", |call| {
        reject_args("monotonic_ns", call)?;
        Ok(Box::new(MonotonicProbe {
            origin: Instant::now(),
        }) as Box<dyn Probe>)
    });
    registry.register("constant", |call| {
        let value = call
            .kwarg("value")
            .context("constant requires a `value` keyword argument")?
            .clone();
        Ok(Box::new(ConstantProbe { value }) as Box<dyn Probe>)
    });
    registry.register("counter", |call| {
        let start = match call.args.first() {
            Some(v) => v
                .as_int()
                .context("counter start must be an integer")?,
            None => 0,
        };
        let step = match call.kwarg("step") {
            Some(v) => v.as_int().context("counter step must be an integer")?,
            None => 1,
        };
        Ok(Box::new(CounterProbe { next: start, step }) as Box<dyn Probe>)
    });
}

fn reject_args(name: &str, call: &DeferredCall) -> Result<()> {
    if !call.args.is_empty() || !call.kwargs.is_empty() {
        anyhow::bail!("{} takes no arguments", name);
    }
    Ok(())
}

/// Wall-clock microseconds since the Unix epoch.
#[derive(Debug)]
struct TimestampProbe;

impl Probe for TimestampProbe {
    fn measure(&mut self) -> Result<Value> {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before Unix epoch")?
            .as_micros() as i64;
        Ok(Value::Int(micros))
    }
}

/// Nanoseconds since this probe was constructed (session-relative origin).
#[derive(Debug)]
struct MonotonicProbe {
    origin: Instant,
}

impl Probe for MonotonicProbe {
    fn measure(&mut self) -> Result<Value> {
        Ok(Value::Int(self.origin.elapsed().as_nanos() as i64))
    }
}

#[derive(Debug)]
struct ConstantProbe {
    value: Value,
}

impl Probe for ConstantProbe {
    fn measure(&mut self) -> Result<Value> {
        Ok(self.value.clone())
    }
}

#[derive(Debug)]
struct CounterProbe {
    next: i64,
    step: i64,
}

impl Probe for CounterProbe {
    fn measure(&mut self) -> Result<Value> {
        let current = self.next;
        self.next = self.next.wrapping_add(self.step);
        Ok(Value::Int(current))
    }
}
