//! CycleMatrix - per-cycle variable assignments of a loop

use std::collections::BTreeMap;

use tracing::debug;

use crate::value::Value;

/// Variables of a loop, keyed by cycle index
///
/// Cycle indices need not be contiguous. Within a cycle, variables keep the
/// order in which they were first set and names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleMatrix {
    cycles: BTreeMap<usize, Vec<(String, Value)>>,
}

impl CycleMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one variable for one cycle from raw definition text
    ///
    /// The text is coerced once, here, into an int, float, string or
    /// expression. A previous value for the same pair is overwritten.
    pub fn set_cycle_variable(&mut self, cycle: usize, name: &str, raw: &str) {
        debug!(cycle, %name, %raw, "CycleMatrix::set_cycle_variable: called");
        self.set_value(cycle, name, Value::coerce(raw));
    }

    /// Set one variable for one cycle to an already typed value
    pub fn set_value(&mut self, cycle: usize, name: &str, value: Value) {
        let vars = self.cycles.entry(cycle).or_default();
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => vars.push((name.to_string(), value)),
        }
    }

    /// Variables of a cycle, if the cycle is defined
    pub fn cycle(&self, cycle: usize) -> Option<&[(String, Value)]> {
        self.cycles.get(&cycle).map(Vec::as_slice)
    }

    /// Look up a single value
    pub fn get(&self, cycle: usize, name: &str) -> Option<&Value> {
        self.cycle(cycle)?.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Indices of all defined cycles, ascending
    pub fn cycles_defined(&self) -> impl Iterator<Item = usize> + '_ {
        self.cycles.keys().copied()
    }

    pub fn contains_cycle(&self, cycle: usize) -> bool {
        self.cycles.contains_key(&cycle)
    }

    /// Every `(cycle, name, value)` entry, cycles ascending
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str, &Value)> + '_ {
        self.cycles
            .iter()
            .flat_map(|(cycle, vars)| vars.iter().map(move |(name, value)| (*cycle, name.as_str(), value)))
    }

    /// Distinct display values of every variable across all cycles
    ///
    /// Variables and values are listed in the order they are first seen.
    pub fn variable_summaries(&self) -> Vec<(String, Vec<String>)> {
        debug!(entries = self.len(), "CycleMatrix::variable_summaries: called");
        let mut summaries: Vec<(String, Vec<String>)> = Vec::new();
        for (_, name, value) in self.entries() {
            let shown = value.to_string();
            let idx = match summaries.iter().position(|(n, _)| n == name) {
                Some(idx) => idx,
                None => {
                    summaries.push((name.to_string(), Vec::new()));
                    summaries.len() - 1
                }
            };
            let values = &mut summaries[idx].1;
            if !values.contains(&shown) {
                values.push(shown);
            }
        }
        summaries
    }

    /// Number of `(cycle, name)` entries
    pub fn len(&self) -> usize {
        self.cycles.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}
