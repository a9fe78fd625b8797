//! LoopController - runs one child item once per trial of a cycle matrix

use rand::Rng;
use tracing::{debug, info, trace};

use crate::error::{DefinitionError, RunError};
use crate::experiment::Experiment;
use crate::expr;
use crate::item::{ItemBase, Runnable, enter, quote_arg, split_line};
use crate::matrix::CycleMatrix;
use crate::substitute::{self, SubstituteOptions};
use crate::value::{Literal, Value};

use super::sequence::{MAX_TRIALS, Order, Trial, build_sequence, trial_count};

/// A loop item
///
/// Holds the cycle matrix, how often to repeat it and in which order, and
/// the name of the child item to run. The child is looked up only when the
/// loop runs, so it may be defined anywhere in the experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopController {
    base: ItemBase,
    cycles: usize,
    repeat: f64,
    order: Order,
    item: String,
    matrix: CycleMatrix,
}

impl LoopController {
    pub const ITEM_TYPE: &'static str = "loop";

    /// A loop with one cycle, one repeat, random order and no child
    pub fn new(name: impl Into<String>) -> Self {
        let mut lp = Self {
            base: ItemBase::new(name, "Repeatedly runs another item"),
            cycles: 1,
            repeat: 1.0,
            order: Order::Random,
            item: String::new(),
            matrix: CycleMatrix::new(),
        };
        lp.set_cycles(1);
        lp.base.set_var("repeat", Literal::Int(1));
        lp.set_order(Order::Random);
        lp
    }

    /// Parse a loop body
    ///
    /// Every line first goes through the generic `set` handling; `set
    /// cycles|repeat|order` also update the loop's typed settings. Then
    /// `run <item>` and `setcycle <cycle> <name> <value>` are recognized.
    /// Anything else is ignored.
    pub fn from_definition(name: &str, text: &str) -> Result<Self, DefinitionError> {
        debug!(%name, "LoopController::from_definition: called");
        let mut lp = Self::new(name);

        for line in text.lines() {
            let tokens = split_line(line)?;
            if let Some((key, value)) = lp.base.parse_tokens(&tokens) {
                lp.apply_setting(&key, &value)?;
                continue;
            }
            match tokens.as_slice() {
                [cmd, item, ..] if cmd == "run" => lp.item = item.clone(),
                [cmd, cycle, var, value, ..] if cmd == "setcycle" => {
                    let cycle = cycle.parse::<usize>().map_err(|_| DefinitionError::InvalidCycleIndex {
                        item: name.to_string(),
                        value: cycle.clone(),
                    })?;
                    lp.matrix.set_cycle_variable(cycle, var, value);
                }
                [] => {}
                _ => trace!(loop_name = %name, line, "LoopController::from_definition: ignoring line"),
            }
        }

        if !lp.trial_count_ok(lp.cycles, lp.repeat) {
            return Err(lp.too_many_trials(&Literal::Float(lp.repeat)));
        }

        debug!(
            loop_name = %name,
            cycles = lp.cycles,
            repeat = lp.repeat,
            order = %lp.order,
            entries = lp.matrix.len(),
            "LoopController::from_definition: parsed"
        );
        Ok(lp)
    }

    fn apply_setting(&mut self, key: &str, value: &Literal) -> Result<(), DefinitionError> {
        let invalid = |reason: &'static str| DefinitionError::InvalidSetting {
            item: self.base.name().to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };
        match key {
            "cycles" => match value {
                Literal::Int(n) if *n >= 0 => self.cycles = *n as usize,
                _ => return Err(invalid("expected a non-negative integer")),
            },
            "repeat" => match value {
                Literal::Int(n) if *n >= 0 => self.repeat = *n as f64,
                Literal::Float(f) if *f >= 0.0 => self.repeat = *f,
                _ => return Err(invalid("expected a non-negative number")),
            },
            "order" => {
                self.order = value
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid("expected 'sequential' or 'random'"))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn trial_count_ok(&self, cycles: usize, repeat: f64) -> bool {
        trial_count(cycles, repeat).is_some_and(|n| n <= MAX_TRIALS)
    }

    fn too_many_trials(&self, repeat: &Literal) -> DefinitionError {
        DefinitionError::InvalidSetting {
            item: self.base.name().to_string(),
            key: "repeat".to_string(),
            value: repeat.to_string(),
            reason: "too many trials for the number of cycles",
        }
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn set_cycles(&mut self, cycles: usize) {
        self.cycles = cycles;
        self.base.set_var("cycles", Literal::Int(cycles as i64));
    }

    pub fn repeat(&self) -> f64 {
        self.repeat
    }

    /// Set the repeat count; must be a non-negative finite number
    pub fn set_repeat(&mut self, repeat: f64) -> Result<(), DefinitionError> {
        let value = if repeat.fract() == 0.0 && repeat.abs() < i64::MAX as f64 {
            Literal::Int(repeat as i64)
        } else {
            Literal::Float(repeat)
        };
        if !repeat.is_finite() {
            return Err(DefinitionError::InvalidSetting {
                item: self.base.name().to_string(),
                key: "repeat".to_string(),
                value: value.to_string(),
                reason: "expected a non-negative number",
            });
        }
        if repeat >= 0.0 && !self.trial_count_ok(self.cycles, repeat) {
            return Err(self.too_many_trials(&value));
        }
        self.apply_setting("repeat", &value)?;
        self.base.set_var("repeat", value);
        Ok(())
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn set_order(&mut self, order: Order) {
        self.order = order;
        self.base.set_var("order", Literal::Str(order.to_string()));
    }

    /// Name of the child item
    pub fn item_name(&self) -> &str {
        &self.item
    }

    pub fn set_item(&mut self, item: impl Into<String>) {
        self.item = item.into();
    }

    pub fn matrix(&self) -> &CycleMatrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut CycleMatrix {
        &mut self.matrix
    }

    /// Generate the ordered trials for one run
    pub fn sequence<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Trial>, RunError> {
        build_sequence(self.cycles, self.repeat, self.order, rng).ok_or_else(|| RunError::TooManyTrials {
            item: self.name().to_string(),
            cycles: self.cycles,
            repeat: self.repeat,
            max: MAX_TRIALS,
        })
    }

    /// Run the child item once per trial
    ///
    /// Input is flushed once up front. The child is resolved before any
    /// variable is written. Each trial applies its cycle's variables, then
    /// prepares and runs the child; the first failure aborts the loop.
    pub fn execute(&self, exp: &mut Experiment) -> Result<(), RunError> {
        let sequence = self.sequence(exp.rng_mut())?;
        info!(
            loop_name = %self.name(),
            item = %self.item,
            trials = sequence.len(),
            order = %self.order,
            "Starting loop"
        );

        exp.flush_input()?;

        let handle = exp.item(&self.item).ok_or_else(|| RunError::ItemNotFound {
            item: self.item.clone(),
            caller: self.name().to_string(),
        })?;

        for trial in &sequence {
            trace!(loop_name = %self.name(), %trial, "LoopController::execute: trial");
            self.apply_cycle(trial.cycle, exp)?;
            let mut child = enter(&handle, &self.item)?;
            if !child.prepare(exp) {
                return Err(RunError::PrepareFailed {
                    item: self.item.clone(),
                    caller: self.name().to_string(),
                });
            }
            child.run(exp)?;
        }

        info!(loop_name = %self.name(), trials = sequence.len(), "Loop complete");
        Ok(())
    }

    /// Write a cycle's variables into the experiment state
    ///
    /// Undefined cycles leave the state untouched. Expressions are
    /// substituted against the current state and evaluated; a failure
    /// aborts with [`RunError::ExpressionFailed`].
    pub fn apply_cycle(&self, cycle: usize, exp: &mut Experiment) -> Result<(), RunError> {
        let Some(vars) = self.matrix.cycle(cycle) else {
            trace!(loop_name = %self.name(), cycle, "LoopController::apply_cycle: cycle not defined");
            return Ok(());
        };
        for (name, value) in vars {
            let resolved = match value {
                Value::Literal(literal) => literal.clone(),
                Value::Expression(text) => self.evaluate(text, exp)?,
            };
            exp.state_mut().set(name.clone(), resolved);
        }
        Ok(())
    }

    fn evaluate(&self, text: &str, exp: &mut Experiment) -> Result<Literal, RunError> {
        let options = SubstituteOptions {
            soft_ignore: true,
            quote_str: true,
        };
        let code = substitute::resolve(text, exp.state(), options).map_err(|source| RunError::ExpressionFailed {
            code: text.to_string(),
            caller: self.name().to_string(),
            source,
        })?;
        debug!(loop_name = %self.name(), %code, "evaluating");
        expr::evaluate(&code, exp.rng_mut()).map_err(|source| RunError::ExpressionFailed {
            code,
            caller: self.name().to_string(),
            source,
        })
    }
}

impl Runnable for LoopController {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn item_type(&self) -> &str {
        Self::ITEM_TYPE
    }

    fn run(&mut self, exp: &mut Experiment) -> Result<(), RunError> {
        self.execute(exp)
    }

    /// Base `set` lines, one `setcycle` line per matrix entry, then `run`
    fn to_definition(&self) -> String {
        let mut s = self.base.to_definition(Self::ITEM_TYPE);
        for (cycle, name, value) in self.matrix.entries() {
            s.push_str(&format!("\tsetcycle {} {} {}\n", cycle, name, quote_arg(&value.to_string())));
        }
        s.push_str(&format!("\trun {}\n", self.item));
        s
    }

    fn var_info(&self) -> Vec<(String, String)> {
        let mut info = self.base.var_info();
        info.extend(
            self.matrix
                .variable_summaries()
                .into_iter()
                .map(|(name, values)| (name, format!("[{}]", values.join(", ")))),
        );
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = "\
set description \"Block loop\"
set cycles 2
set repeat 1.5
set order sequential
setcycle 0 soa 100
setcycle 0 side left
setcycle 1 soa \"=random.randint(1, 6) * 100\"
setcycle 1 side \"far right\"
run trial
";

    #[test]
    fn test_from_definition() {
        let lp = LoopController::from_definition("block", DEFINITION).unwrap();
        assert_eq!(lp.cycles(), 2);
        assert_eq!(lp.repeat(), 1.5);
        assert_eq!(lp.order(), Order::Sequential);
        assert_eq!(lp.item_name(), "trial");
        assert_eq!(lp.matrix().get(0, "soa"), Some(&Value::Literal(Literal::Int(100))));
        assert_eq!(
            lp.matrix().get(1, "soa"),
            Some(&Value::Expression("random.randint(1, 6) * 100".into()))
        );
        assert_eq!(
            lp.matrix().get(1, "side"),
            Some(&Value::Literal(Literal::Str("far right".into())))
        );
    }

    #[test]
    fn test_defaults() {
        let lp = LoopController::from_definition("block", "").unwrap();
        assert_eq!(lp.cycles(), 1);
        assert_eq!(lp.repeat(), 1.0);
        assert_eq!(lp.order(), Order::Random);
        assert_eq!(lp.item_name(), "");
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            LoopController::from_definition("b", "set cycles -1"),
            Err(DefinitionError::InvalidSetting { .. })
        ));
        assert!(matches!(
            LoopController::from_definition("b", "set cycles 2.5"),
            Err(DefinitionError::InvalidSetting { .. })
        ));
        assert!(matches!(
            LoopController::from_definition("b", "set repeat lots"),
            Err(DefinitionError::InvalidSetting { .. })
        ));
        assert!(matches!(
            LoopController::from_definition("b", "set order shuffled"),
            Err(DefinitionError::InvalidSetting { .. })
        ));
        assert!(matches!(
            LoopController::from_definition("b", "setcycle x soa 1"),
            Err(DefinitionError::InvalidCycleIndex { .. })
        ));
        assert!(matches!(
            LoopController::from_definition("b", "setcycle -1 soa 1"),
            Err(DefinitionError::InvalidCycleIndex { .. })
        ));
    }

    #[test]
    fn test_short_lines_ignored() {
        let lp = LoopController::from_definition("b", "run\nsetcycle 0 soa\nwhatever else").unwrap();
        assert_eq!(lp.item_name(), "");
        assert!(lp.matrix().is_empty());
    }

    #[test]
    fn test_to_definition_round_trip() {
        let lp = LoopController::from_definition("block", DEFINITION).unwrap();
        let text = lp.to_definition();
        assert!(text.starts_with("define loop block\n"));
        assert!(text.contains("\tsetcycle 1 soa \"=random.randint(1, 6) * 100\"\n"));
        assert!(text.ends_with("\trun trial\n"));

        let body: String = text.lines().skip(1).map(|l| format!("{}\n", l)).collect();
        let parsed = LoopController::from_definition("block", &body).unwrap();
        assert_eq!(parsed, lp);
    }

    #[test]
    fn test_var_info_includes_summaries() {
        let lp = LoopController::from_definition("block", DEFINITION).unwrap();
        let info = lp.var_info();
        assert!(info.contains(&("cycles".to_string(), "2".to_string())));
        assert!(info.contains(&("side".to_string(), "[left, far right]".to_string())));
        assert!(info.contains(&("soa".to_string(), "[100, =random.randint(1, 6) * 100]".to_string())));
    }

    #[test]
    fn test_setters_update_definition() {
        let mut lp = LoopController::new("block");
        lp.set_cycles(3);
        lp.set_repeat(0.5).unwrap();
        lp.set_order(Order::Sequential);
        lp.set_item("trial");
        lp.matrix_mut().set_cycle_variable(2, "x", "7");
        assert!(lp.set_repeat(-1.0).is_err());
        assert!(lp.set_repeat(f64::NAN).is_err());

        let body: String = lp.to_definition().lines().skip(1).map(|l| format!("{}\n", l)).collect();
        let parsed = LoopController::from_definition("block", &body).unwrap();
        assert_eq!(parsed.cycles(), 3);
        assert_eq!(parsed.repeat(), 0.5);
        assert_eq!(parsed.order(), Order::Sequential);
        assert_eq!(parsed.item_name(), "trial");
        assert_eq!(parsed.matrix().get(2, "x"), Some(&Value::Literal(Literal::Int(7))));
    }

    #[test]
    fn test_apply_undefined_cycle_is_noop() {
        let lp = LoopController::from_definition("block", DEFINITION).unwrap();
        let mut exp = Experiment::new().with_seed(1);
        exp.state_mut().set("soa", 5i64);
        let before = exp.state().clone();
        lp.apply_cycle(9, &mut exp).unwrap();
        assert_eq!(exp.state(), &before);
    }

    #[test]
    fn test_apply_cycle_evaluates_expressions() {
        let lp = LoopController::from_definition("block", DEFINITION).unwrap();
        let mut exp = Experiment::new().with_seed(1);
        lp.apply_cycle(1, &mut exp).unwrap();
        match exp.state().get("soa") {
            Some(Literal::Int(v)) => assert!([100, 200, 300, 400, 500, 600].contains(v)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(exp.state().get("side"), Some(&Literal::Str("far right".into())));
    }

    #[test]
    fn test_expression_sees_state() {
        let mut lp = LoopController::new("block");
        lp.matrix_mut().set_cycle_variable(0, "label", "=[side] + '-' + str([soa])");
        let mut exp = Experiment::new();
        exp.state_mut().set("side", "left");
        exp.state_mut().set("soa", 100i64);
        lp.apply_cycle(0, &mut exp).unwrap();
        assert_eq!(exp.state().get("label"), Some(&Literal::Str("left-100".into())));
    }

    #[test]
    fn test_expression_failure() {
        let mut lp = LoopController::new("block");
        lp.matrix_mut().set_cycle_variable(0, "x", "=1 / 0");
        let mut exp = Experiment::new();
        let err = lp.apply_cycle(0, &mut exp).unwrap_err();
        match err {
            RunError::ExpressionFailed { code, caller, source } => {
                assert_eq!(code, "1 / 0");
                assert_eq!(caller, "block");
                assert_eq!(source, expr::ExprError::DivisionByZero);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!exp.state().contains("x"));
    }

    #[test]
    fn test_unresolved_reference_fails_in_evaluation() {
        let mut lp = LoopController::new("block");
        lp.matrix_mut().set_cycle_variable(0, "x", "=[missing] + 1");
        let mut exp = Experiment::new();
        assert!(matches!(
            lp.apply_cycle(0, &mut exp),
            Err(RunError::ExpressionFailed { .. })
        ));
    }

    #[test]
    fn test_deeply_nested_expression_fails_cleanly() {
        let mut lp = LoopController::new("block");
        let code = format!("={}1{}", "(".repeat(3000), ")".repeat(3000));
        lp.matrix_mut().set_cycle_variable(0, "x", &code);
        let mut exp = Experiment::new();
        match lp.apply_cycle(0, &mut exp).unwrap_err() {
            RunError::ExpressionFailed { source, .. } => {
                assert!(matches!(source, expr::ExprError::Syntax { ref message, .. } if message.contains("nested too deeply")))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!exp.state().contains("x"));
    }

    #[test]
    fn test_oversized_string_fails_cleanly() {
        let mut lp = LoopController::new("block");
        lp.matrix_mut().set_cycle_variable(0, "x", "='ab' * 9223372036854775807");
        lp.matrix_mut().set_cycle_variable(1, "y", "=[1] * 10 ** 12");
        let mut exp = Experiment::new();
        for cycle in 0..2 {
            match lp.apply_cycle(cycle, &mut exp).unwrap_err() {
                RunError::ExpressionFailed { source, .. } => assert_eq!(source, expr::ExprError::Overflow),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_huge_repeat_is_rejected() {
        let err = LoopController::from_definition("block", "set repeat 1e30\nset cycles 1\nrun trial\n").unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidSetting { ref key, .. } if key == "repeat"));

        // No cycles means no trials, whatever the repeat
        let lp = LoopController::from_definition("block", "set cycles 0\nset repeat 1e30\n").unwrap();
        assert_eq!(lp.repeat(), 1e30);

        let mut lp = LoopController::new("block");
        lp.set_cycles(1000);
        assert!(lp.set_repeat(1e30).is_err());
        assert!(lp.set_repeat(f64::MAX).is_err());
        assert_eq!(lp.repeat(), 1.0);
        lp.set_repeat(2.5).unwrap();
    }

    #[test]
    fn test_too_many_trials_fails_at_run() {
        let mut lp = LoopController::new("block");
        lp.set_repeat(2.0).unwrap();
        lp.set_cycles(usize::MAX);
        let mut exp = Experiment::new().with_seed(1);
        match lp.execute(&mut exp).unwrap_err() {
            RunError::TooManyTrials { item, cycles, max, .. } => {
                assert_eq!(item, "block");
                assert_eq!(cycles, usize::MAX);
                assert_eq!(max, MAX_TRIALS);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(lp.sequence(&mut rand::rng()).is_err());
    }
}
