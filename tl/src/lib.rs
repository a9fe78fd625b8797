//! trialloop - trial-loop execution engine for scripted experiments
//!
//! An experiment is a set of named items. A loop item repeatedly runs one
//! child item, setting per-cycle variables in the shared experiment state
//! before each trial. Variable values can be literals or expressions in a
//! small sandboxed language, evaluated against the current state.
//!
//! # Modules
//!
//! - [`value`] - literals and expression values, with coercion from text
//! - [`matrix`] - the cycle matrix of a loop
//! - [`state`] - experiment-wide variables
//! - [`substitute`] - `[name]` reference substitution
//! - [`expr`] - sandboxed expression language
//! - [`item`] - the `Runnable` trait and shared item parsing
//! - [`r#loop`] - the loop item
//! - [`logger`] - an item that records variables as JSON rows
//! - [`experiment`] / [`script`] - item registry and script loading
//! - [`input`] - input devices flushed before a loop starts
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```ignore
//! use trialloop::{Experiment, Script};
//!
//! let script = Script::parse(&std::fs::read_to_string("task.tl")?)?;
//! let mut exp = Experiment::from_script(&script)?.with_seed(7);
//! exp.run_item("block_loop")?;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod expr;
pub mod input;
pub mod item;
pub mod logger;
pub mod matrix;
pub mod script;
pub mod state;
pub mod substitute;
pub mod value;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use config::Config;
pub use error::{DefinitionError, RunError};
pub use experiment::Experiment;
pub use expr::ExprError;
pub use input::{InputDevice, NullInput, TerminalKeyboard};
pub use item::{ItemBase, ItemHandle, Runnable};
pub use logger::Logger;
pub use matrix::CycleMatrix;
pub use r#loop::{LoopController, Order, Trial};
pub use script::Script;
pub use state::ExperimentState;
pub use value::{Literal, Value};
