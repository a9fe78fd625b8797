//! Trial sequence generation

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

/// Most trials a single loop run may have
pub const MAX_TRIALS: usize = 1 << 24;

/// Number of trials `cycles` and `repeat` expand to, if it fits in `usize`
pub fn trial_count(cycles: usize, repeat: f64) -> Option<usize> {
    if !repeat.is_finite() || repeat < 0.0 {
        return None;
    }
    if cycles == 0 {
        return Some(0);
    }
    if repeat >= usize::MAX as f64 {
        return None;
    }
    let whole = repeat.floor() as usize;
    let partial = (cycles as f64 * (repeat - whole as f64)).floor() as usize;
    cycles.checked_mul(whole)?.checked_add(partial)
}

/// How the trials of a loop are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Sequential,
    #[default]
    Random,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Sequential => write!(f, "sequential"),
            Order::Random => write!(f, "random"),
        }
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Order::Sequential),
            "random" => Ok(Order::Random),
            other => Err(format!("unknown order '{}'", other)),
        }
    }
}

/// One execution of the child item: which repeat, which cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trial {
    pub repeat: usize,
    pub cycle: usize,
}

impl fmt::Display for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.repeat, self.cycle)
    }
}

/// Expand cycles and repeats into the ordered list of trials
///
/// Whole repeats enumerate every cycle, repeat-major. A fractional part `f`
/// adds `floor(cycles * f)` distinct cycles drawn at random, tagged with the
/// next repeat index. The partial draw is random even for sequential loops.
/// Random order then shuffles the whole list.
///
/// Returns `None` when the sequence would exceed [`MAX_TRIALS`] trials.
pub fn build_sequence<R: Rng + ?Sized>(cycles: usize, repeat: f64, order: Order, rng: &mut R) -> Option<Vec<Trial>> {
    debug!(cycles, repeat, %order, "build_sequence: called");
    let total = trial_count(cycles, repeat).filter(|n| *n <= MAX_TRIALS)?;
    let whole = repeat.floor() as usize;
    let mut trials = Vec::with_capacity(total);

    for r in 0..whole {
        trials.extend((0..cycles).map(|c| Trial { repeat: r, cycle: c }));
    }

    let partial = repeat - whole as f64;
    if partial > 0.0 {
        let amount = (cycles as f64 * partial).floor() as usize;
        debug!(amount, "build_sequence: sampling partial repeat");
        trials.extend(
            rand::seq::index::sample(rng, cycles, amount)
                .into_iter()
                .map(|c| Trial { repeat: whole, cycle: c }),
        );
    }

    if order == Order::Random {
        trials.shuffle(rng);
    }
    Some(trials)
}
