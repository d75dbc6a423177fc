//! Probe capability layer
//!
//! A probe is any measurement source exposing one uniform operation: take one
//! measurement now. The sampling engine depends only on this trait, never on
//! probe-specific code.
//!
//! Clients describe probes as [`DeferredCall`]s — a registered constructor
//! name plus arguments — because the handles themselves often require
//! privileges or process state that only exist inside the daemon. The
//! [`ProbeRegistry`] resolves those descriptions into live handles at session
//! start.

pub mod builtin;

use anyhow::{Context, Result};
use periscope_shared::{DeferredCall, MeasurementSpec, Source, Value};
use std::collections::HashMap;

/// A live measurement source.
pub trait Probe: Send + std::fmt::Debug {
    /// Take one measurement.
    fn measure(&mut self) -> Result<Value>;
}

type Constructor = Box<dyn Fn(&DeferredCall) -> Result<Box<dyn Probe>> + Send + Sync>;

/// Maps constructor names to probe constructors.
pub struct ProbeRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ProbeRegistry {
    /// An empty registry; probes must be registered before any spec that
    /// names them can be materialized.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry pre-populated with the builtin probe set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&DeferredCall) -> Result<Box<dyn Probe>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Invoke the constructor a deferred call names, with its stored
    /// arguments. The constructor's own failure propagates.
    pub fn construct(&self, call: &DeferredCall) -> Result<Box<dyn Probe>> {
        let constructor = self
            .constructors
            .get(&call.target)
            .with_context(|| format!("unknown probe constructor: {:?}", call.target))?;
        constructor(call).with_context(|| format!("constructor {:?} failed", call.target))
    }

    /// Resolve every deferred call in a spec to a live handle, recursively.
    /// Literals pass through unchanged.
    pub fn materialize(&self, spec: &MeasurementSpec) -> Result<MaterializedSpec> {
        let entries = spec
            .entries()
            .iter()
            .map(|(name, source)| Ok((name.clone(), self.materialize_source(source)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(MaterializedSpec { entries })
    }

    fn materialize_source(&self, source: &Source) -> Result<MaterializedSource> {
        match source {
            Source::Literal(value) => Ok(MaterializedSource::Literal(value.clone())),
            Source::Call(call) => Ok(MaterializedSource::Probe(self.construct(call)?)),
            Source::Group(spec) => Ok(MaterializedSource::Group(self.materialize(spec)?)),
        }
    }
}

/// One materialized measurement source.
#[derive(Debug)]
pub enum MaterializedSource {
    Literal(Value),
    Probe(Box<dyn Probe>),
    Group(MaterializedSpec),
}

impl MaterializedSource {
    /// Measure this source once. Literals return themselves; groups return a
    /// map of their members' measurements.
    pub fn measure_once(&mut self) -> Result<Value> {
        match self {
            MaterializedSource::Literal(value) => Ok(value.clone()),
            MaterializedSource::Probe(probe) => probe.measure(),
            MaterializedSource::Group(spec) => Ok(Value::Map(spec.snapshot()?)),
        }
    }
}

/// A spec with every deferred call resolved to a live handle.
///
/// Owned exclusively by one sampling session; dropping it releases all probe
/// handles.
#[derive(Debug)]
pub struct MaterializedSpec {
    entries: Vec<(String, MaterializedSource)>,
}

impl MaterializedSpec {
    /// Measure every source in spec order.
    pub fn snapshot(&mut self) -> Result<Vec<(String, Value)>> {
        self.entries
            .iter_mut()
            .map(|(name, source)| Ok((name.clone(), source.measure_once()?)))
            .collect()
    }

    /// Number of live probe handles, counting nested groups.
    pub fn probe_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, source)| match source {
                MaterializedSource::Literal(_) => 0,
                MaterializedSource::Probe(_) => 1,
                MaterializedSource::Group(spec) => spec.probe_count(),
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
