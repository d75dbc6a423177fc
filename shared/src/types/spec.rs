//! Deferred calls and measurement specs
//!
//! A client cannot (and must not) construct privileged probe handles in its
//! own process. Instead it describes *what to construct*: a [`DeferredCall`]
//! names a constructor registered in the daemon plus the arguments to invoke
//! it with. A [`MeasurementSpec`] is the named, ordered collection of
//! measurement sources a sampling session will read each tick; it is built
//! once on the client side, validated before anything touches the network,
//! and resolved to live probe handles only inside the daemon.

use crate::types::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pending constructor invocation: registered constructor name plus
/// positional and named arguments.
///
/// Constructing one has no side effects; the call happens when the daemon
/// materializes the spec. Equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredCall {
    pub target: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl DeferredCall {
    pub fn new(
        target: impl Into<String>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Self {
        Self {
            target: target.into(),
            args,
            kwargs,
        }
    }

    /// A call with no arguments, the common case for probe constructors.
    pub fn no_args(target: impl Into<String>) -> Self {
        Self::new(target, Vec::new(), Vec::new())
    }

    /// Look up a named argument.
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// One measurement source in a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// A plain value, passed through materialization unchanged.
    Literal(Value),
    /// A constructor to invoke inside the daemon.
    Call(DeferredCall),
    /// A nested spec, materialized recursively.
    Group(MeasurementSpec),
}

/// Invalid measurement spec shape, detected at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("duplicate measurement name: {0:?}")]
    DuplicateName(String),
    #[error("measurement names must not be empty")]
    EmptyName,
}

/// Named, ordered collection of measurement sources.
///
/// Entry order is preserved end to end: it is the iteration order during
/// sampling and the reporting order of the resulting trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSpec {
    entries: Vec<(String, Source)>,
}

impl MeasurementSpec {
    pub fn builder() -> SpecBuilder {
        SpecBuilder {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[(String, Source)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`MeasurementSpec`].
///
/// Whether an entry is a literal or a deferred call is decided by which
/// constructor the caller picks, not by inspecting the value.
pub struct SpecBuilder {
    entries: Vec<(String, Source)>,
}

impl SpecBuilder {
    pub fn literal(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((name.into(), Source::Literal(value.into())));
        self
    }

    pub fn deferred(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Self {
        self.entries.push((
            name.into(),
            Source::Call(DeferredCall::new(target, args, kwargs)),
        ));
        self
    }

    pub fn call(mut self, name: impl Into<String>, call: DeferredCall) -> Self {
        self.entries.push((name.into(), Source::Call(call)));
        self
    }

    pub fn group(mut self, name: impl Into<String>, spec: MeasurementSpec) -> Self {
        self.entries.push((name.into(), Source::Group(spec)));
        self
    }

    /// Validate and finish. Fails fast, before any network activity.
    pub fn build(self) -> Result<MeasurementSpec, SpecError> {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &self.entries {
            if name.is_empty() {
                return Err(SpecError::EmptyName);
            }
            if !seen.insert(name.clone()) {
                return Err(SpecError::DuplicateName(name.clone()));
            }
        }
        Ok(MeasurementSpec {
            entries: self.entries,
        })
    }
}
