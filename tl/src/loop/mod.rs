//! Loop item for trialloop
//!
//! A loop runs one child item once per trial. Trials come from a cycle
//! matrix expanded by the repeat count and ordered sequentially or at
//! random; before each trial the cycle's variables are written into the
//! experiment state.

mod controller;
mod sequence;

pub use controller::LoopController;
pub use sequence::{MAX_TRIALS, Order, Trial, build_sequence, trial_count};
