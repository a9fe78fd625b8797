//! Variable substitution: replaces `[name]` references with state values

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::expr::ExprError;
use crate::state::ExperimentState;

static VAR_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z_][A-Za-z0-9_]*)\]").expect("variable reference pattern is valid"));

/// How references are substituted
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstituteOptions {
    /// Leave unresolved references in place instead of failing
    pub soft_ignore: bool,
    /// Render string values as quoted expression literals
    pub quote_str: bool,
}

/// Substitute every `[name]` reference in `text` from `state`
pub fn resolve(text: &str, state: &ExperimentState, options: SubstituteOptions) -> Result<String, ExprError> {
    debug!(%text, ?options, "resolve: called");
    let mut missing = None;

    let out = VAR_REF.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        match state.get(name) {
            Some(value) if options.quote_str => value.to_source(),
            Some(value) => value.to_string(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(name) if !options.soft_ignore => Err(ExprError::UnresolvedVariable(name)),
        _ => Ok(out.into_owned()),
    }
}
