//! Scenario tests for loop execution
//!
//! These tests drive loops through the public library API with a recorder
//! item that records the variable state it sees on every trial.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use trialloop::error::RunError;
use trialloop::experiment::Experiment;
use trialloop::input::InputDevice;
use trialloop::item::Runnable;
use trialloop::logger::Logger;
use trialloop::r#loop::{LoopController, Order};
use trialloop::script::Script;
use trialloop::state::ExperimentState;
use trialloop::value::Literal;

// =============================================================================
// Helpers
// =============================================================================

/// Child item that snapshots the state on every run
struct Recorder {
    name: String,
    seen: Rc<RefCell<Vec<ExperimentState>>>,
    prepares: usize,
    fail_prepare_on: Option<usize>,
}

impl Recorder {
    fn new(name: &str) -> (Self, Rc<RefCell<Vec<ExperimentState>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let recorder = Self {
            name: name.to_string(),
            seen: seen.clone(),
            prepares: 0,
            fail_prepare_on: None,
        };
        (recorder, seen)
    }

    /// Fail the n-th prepare (1-based)
    fn failing_on(mut self, n: usize) -> Self {
        self.fail_prepare_on = Some(n);
        self
    }
}

impl Runnable for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn item_type(&self) -> &str {
        "recorder"
    }

    fn prepare(&mut self, _exp: &mut Experiment) -> bool {
        self.prepares += 1;
        self.fail_prepare_on != Some(self.prepares)
    }

    fn run(&mut self, exp: &mut Experiment) -> Result<(), RunError> {
        self.seen.borrow_mut().push(exp.state().clone());
        Ok(())
    }

    fn to_definition(&self) -> String {
        format!("define recorder {}\n", self.name)
    }

    fn var_info(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Input device with scripted flush results
struct ScriptedInput {
    flushes: Rc<RefCell<usize>>,
    interrupt: bool,
}

impl InputDevice for ScriptedInput {
    fn flush(&mut self) -> Result<bool, RunError> {
        *self.flushes.borrow_mut() += 1;
        if self.interrupt {
            return Err(RunError::Interrupted);
        }
        Ok(true)
    }
}

fn values(seen: &Rc<RefCell<Vec<ExperimentState>>>, var: &str) -> Vec<Option<Literal>> {
    seen.borrow().iter().map(|s| s.get(var).cloned()).collect()
}

fn ints(xs: &[i64]) -> Vec<Option<Literal>> {
    xs.iter().map(|x| Some(Literal::Int(*x))).collect()
}

fn simple_loop(name: &str, child: &str, cycles: usize, repeat: f64, order: Order) -> LoopController {
    let mut lp = LoopController::new(name);
    lp.set_cycles(cycles);
    lp.set_repeat(repeat).unwrap();
    lp.set_order(order);
    lp.set_item(child);
    for c in 0..cycles {
        lp.matrix_mut().set_cycle_variable(c, "x", &(c + 1).to_string());
    }
    lp
}

// =============================================================================
// Basic execution
// =============================================================================

#[test]
fn test_sequential_loop_sets_cycle_variables() {
    let mut exp = Experiment::new().with_seed(1);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 2, 1.0, Order::Sequential)).unwrap();

    exp.run_item("block").unwrap();

    assert_eq!(values(&seen, "x"), ints(&[1, 2]));
    assert_eq!(exp.state().get("x"), Some(&Literal::Int(2)));
}

#[test]
fn test_whole_repeats_run_every_cycle_again() {
    let mut exp = Experiment::new().with_seed(1);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 3, 2.0, Order::Sequential)).unwrap();

    exp.run_item("block").unwrap();

    assert_eq!(values(&seen, "x"), ints(&[1, 2, 3, 1, 2, 3]));
}

#[test]
fn test_random_order_runs_each_trial_once() {
    let mut exp = Experiment::new().with_seed(42);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 10, 2.0, Order::Random)).unwrap();

    exp.run_item("block").unwrap();

    let mut observed: Vec<i64> = values(&seen, "x")
        .into_iter()
        .map(|v| match v {
            Some(Literal::Int(i)) => i,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    observed.sort();
    let expected: Vec<i64> = (1..=10).flat_map(|x| [x, x]).collect();
    assert_eq!(observed, expected);
}

#[test]
fn test_fractional_repeat_adds_partial_pass() {
    let mut exp = Experiment::new().with_seed(5);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 4, 1.5, Order::Sequential)).unwrap();

    exp.run_item("block").unwrap();

    let xs = values(&seen, "x");
    assert_eq!(xs.len(), 6);
    assert_eq!(&xs[..4], ints(&[1, 2, 3, 4]).as_slice());
    assert_ne!(xs[4], xs[5]);
}

#[test]
fn test_zero_cycles_runs_nothing() {
    let mut exp = Experiment::new();
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 0, 3.0, Order::Random)).unwrap();

    exp.run_item("block").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_sparse_cycles_keep_previous_values() {
    let mut exp = Experiment::new();
    exp.state_mut().set("x", 0i64);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();

    let mut lp = LoopController::new("block");
    lp.set_cycles(3);
    lp.set_order(Order::Sequential);
    lp.set_item("trial");
    lp.matrix_mut().set_cycle_variable(1, "x", "9");
    exp.register(lp).unwrap();

    exp.run_item("block").unwrap();
    assert_eq!(values(&seen, "x"), ints(&[0, 9, 9]));
}

#[test]
fn test_expressions_see_earlier_variables_of_the_cycle() {
    let mut exp = Experiment::new().with_seed(3);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();

    let mut lp = simple_loop("block", "trial", 2, 1.0, Order::Sequential);
    lp.matrix_mut().set_cycle_variable(0, "y", "=[x] * 10");
    lp.matrix_mut().set_cycle_variable(1, "y", "=[x] * 10");
    exp.register(lp).unwrap();

    exp.run_item("block").unwrap();
    assert_eq!(values(&seen, "y"), ints(&[10, 20]));
}

// =============================================================================
// Failure behavior
// =============================================================================

#[test]
fn test_missing_child_fails_before_any_assignment() {
    let mut exp = Experiment::new();
    exp.register(simple_loop("block", "nowhere", 2, 1.0, Order::Sequential)).unwrap();

    let err = exp.run_item("block").unwrap_err();
    match err {
        RunError::ItemNotFound { item, caller } => {
            assert_eq!(item, "nowhere");
            assert_eq!(caller, "block");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!exp.state().contains("x"));
}

#[test]
fn test_missing_child_fails_even_without_cycles() {
    let mut exp = Experiment::new();
    exp.register(simple_loop("block", "nowhere", 0, 1.0, Order::Sequential)).unwrap();
    assert!(matches!(exp.run_item("block"), Err(RunError::ItemNotFound { .. })));
}

#[test]
fn test_prepare_failure_aborts_after_assignment() {
    let mut exp = Experiment::new();
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder.failing_on(2)).unwrap();
    exp.register(simple_loop("block", "trial", 3, 1.0, Order::Sequential)).unwrap();

    let err = exp.run_item("block").unwrap_err();
    assert!(matches!(err, RunError::PrepareFailed { ref item, ref caller } if item == "trial" && caller == "block"));
    assert_eq!(values(&seen, "x"), ints(&[1]));
    assert_eq!(exp.state().get("x"), Some(&Literal::Int(2)));
}

#[test]
fn test_expression_failure_aborts_loop() {
    let mut exp = Experiment::new();
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();

    let mut lp = simple_loop("block", "trial", 3, 1.0, Order::Sequential);
    lp.matrix_mut().set_cycle_variable(1, "y", "=math.sqrt(-1)");
    exp.register(lp).unwrap();

    let err = exp.run_item("block").unwrap_err();
    match &err {
        RunError::ExpressionFailed { code, caller, .. } => {
            assert_eq!(code, "math.sqrt(-1)");
            assert_eq!(caller, "block");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(seen.borrow().len(), 1);
    assert!(!exp.state().contains("y"));
}

#[test]
fn test_interrupt_during_flush_runs_nothing() {
    let flushes = Rc::new(RefCell::new(0));
    let mut exp = Experiment::new().with_input(Box::new(ScriptedInput {
        flushes: flushes.clone(),
        interrupt: true,
    }));
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 2, 1.0, Order::Sequential)).unwrap();

    assert!(matches!(exp.run_item("block"), Err(RunError::Interrupted)));
    assert_eq!(*flushes.borrow(), 1);
    assert!(seen.borrow().is_empty());
    assert!(!exp.state().contains("x"));
}

#[test]
fn test_pending_input_is_flushed_once_per_loop() {
    let flushes = Rc::new(RefCell::new(0));
    let mut exp = Experiment::new().with_input(Box::new(ScriptedInput {
        flushes: flushes.clone(),
        interrupt: false,
    }));
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();
    exp.register(simple_loop("block", "trial", 4, 1.0, Order::Sequential)).unwrap();

    exp.run_item("block").unwrap();
    assert_eq!(*flushes.borrow(), 1);
    assert_eq!(seen.borrow().len(), 4);
}

// =============================================================================
// Composition
// =============================================================================

#[test]
fn test_nested_loops() {
    let mut exp = Experiment::new().with_seed(8);
    let (recorder, seen) = Recorder::new("trial");
    exp.register(recorder).unwrap();

    let mut outer = LoopController::new("blocks");
    outer.set_cycles(2);
    outer.set_order(Order::Sequential);
    outer.set_item("trials");
    outer.matrix_mut().set_cycle_variable(0, "block", "a");
    outer.matrix_mut().set_cycle_variable(1, "block", "b");
    exp.register(outer).unwrap();
    exp.register(simple_loop("trials", "trial", 3, 1.0, Order::Sequential)).unwrap();

    exp.run_item("blocks").unwrap();

    let pairs: Vec<(String, String)> = seen
        .borrow()
        .iter()
        .map(|s| {
            (
                s.get("block").map(ToString::to_string).unwrap_or_default(),
                s.get("x").map(ToString::to_string).unwrap_or_default(),
            )
        })
        .collect();
    let expected: Vec<(String, String)> = ["a", "b"]
        .iter()
        .flat_map(|b| (1..=3).map(move |x| (b.to_string(), x.to_string())))
        .collect();
    assert_eq!(pairs, expected);
}

#[test]
fn test_loop_running_itself_is_rejected() {
    let mut exp = Experiment::new();
    exp.register(simple_loop("block", "block", 1, 1.0, Order::Sequential)).unwrap();
    assert!(matches!(exp.run_item("block"), Err(RunError::ItemBusy { ref item }) if item == "block"));
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = |seed: u64| {
        let mut exp = Experiment::new().with_seed(seed);
        let (recorder, seen) = Recorder::new("trial");
        exp.register(recorder).unwrap();
        let mut lp = simple_loop("block", "trial", 5, 2.5, Order::Random);
        lp.matrix_mut().set_cycle_variable(0, "jitter", "=random.uniform(0, 1)");
        lp.matrix_mut().set_cycle_variable(3, "soa", "=random.choice([100, 200, 300])");
        exp.register(lp).unwrap();
        exp.run_item("block").unwrap();
        let out = seen.borrow().clone();
        out
    };
    assert_eq!(run(17), run(17));
}

// =============================================================================
// Scripts
// =============================================================================

/// Sink that shares its buffer with the test
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const SCRIPT: &str = "\
set start block_loop
set subject_nr 7

define loop block_loop
\tset cycles 2
\tset order sequential
\tsetcycle 0 cue left
\tsetcycle 0 soa 100
\tsetcycle 1 cue right
\tsetcycle 1 soa \"=[soa] + 50\"
\trun trial_sequence
";

#[test]
fn test_script_loop_drives_logger() {
    let script = Script::parse(SCRIPT).unwrap();
    let mut exp = Experiment::from_script(&script).unwrap().with_seed(1);

    let buf = SharedBuf::default();
    let mut logger = Logger::new("trial_sequence").with_sink(Box::new(buf.clone()));
    logger.log_var("cue");
    logger.log_var("soa");
    logger.log_var("subject_nr");
    exp.register(logger).unwrap();

    let start = exp.start().unwrap();
    exp.run_item(&start).unwrap();

    let out = String::from_utf8(buf.0.borrow().clone()).unwrap();
    let rows: Vec<serde_json::Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["cue"], "left");
    assert_eq!(rows[0]["soa"], 100);
    assert_eq!(rows[1]["cue"], "right");
    assert_eq!(rows[1]["soa"], 150);
    assert_eq!(rows[1]["subject_nr"], 7);
}

#[test]
fn test_script_format_round_trip() {
    let full = format!("{}\ndefine logger trial_sequence\n\tlog cue soa\n", SCRIPT);
    let exp = Experiment::from_script(&Script::parse(&full).unwrap()).unwrap();
    let text = exp.to_script();

    let again = Experiment::from_script(&Script::parse(&text).unwrap()).unwrap();
    assert_eq!(again.to_script(), text);
}
