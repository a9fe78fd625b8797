//! ExperimentState - the shared store of current variable bindings

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::value::Literal;

/// Current values of all experiment variables
///
/// Passed explicitly to everything that reads or writes variables. Loops
/// write their cycle bindings here before each trial; child items and
/// expression substitution read from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExperimentState {
    vars: BTreeMap<String, Literal>,
}

impl ExperimentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.vars.get(name)
    }

    /// Bind a variable, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Literal>) {
        let name = name.into();
        let value = value.into();
        trace!(%name, %value, "ExperimentState::set: called");
        self.vars.insert(name, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Literal)> + '_ {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
