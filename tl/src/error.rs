//! Error types for definitions and execution

use thiserror::Error;

use crate::expr::ExprError;

/// Errors that abort a run
///
/// None of these are retried or swallowed: the first one raised ends the
/// current run and propagates to the caller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Could not find item '{item}', which is called by '{caller}'")]
    ItemNotFound { item: String, caller: String },

    #[error("Failed to prepare item '{item}', which is called by loop item '{caller}'")]
    PrepareFailed { item: String, caller: String },

    #[error("Failed to evaluate '{code}' in loop item '{caller}': {source}")]
    ExpressionFailed {
        code: String,
        caller: String,
        #[source]
        source: ExprError,
    },

    #[error("The escape key was pressed")]
    Interrupted,

    #[error("Loop item '{item}' would run more than {max} trials ({cycles} cycles, repeat {repeat})")]
    TooManyTrials {
        item: String,
        cycles: usize,
        repeat: f64,
        max: usize,
    },

    #[error("Item '{item}' is already running and cannot be entered again")]
    ItemBusy { item: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in item or script definitions
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Unbalanced quotes in line: {line}")]
    Quoting { line: String },

    #[error("Invalid cycle index '{value}' in loop item '{item}'")]
    InvalidCycleIndex { item: String, value: String },

    #[error("Invalid value '{value}' for '{key}' in item '{item}': {reason}")]
    InvalidSetting {
        item: String,
        key: String,
        value: String,
        reason: &'static str,
    },

    #[error("Unknown item type '{item_type}' for item '{name}'")]
    UnknownItemType { item_type: String, name: String },

    #[error("Item '{name}' is defined more than once")]
    DuplicateItem { name: String },

    #[error("Malformed define line: {line}")]
    MalformedDefine { line: String },
}
