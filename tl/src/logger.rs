//! Logger item - records the current value of selected variables
//!
//! Each run writes one JSON object per line to the sink, so a loop driving
//! a logger produces one row per trial.

use std::io::Write;

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::error::{DefinitionError, RunError};
use crate::experiment::Experiment;
use crate::item::{ItemBase, Runnable, split_line};
use crate::value::Literal;

pub struct Logger {
    base: ItemBase,
    vars: Vec<String>,
    sink: Box<dyn Write>,
    rows: usize,
}

impl Logger {
    pub const ITEM_TYPE: &'static str = "logger";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ItemBase::new(name, "Logs experimental data"),
            vars: Vec::new(),
            sink: Box::new(std::io::stdout()),
            rows: 0,
        }
    }

    /// Parse a logger body: `set` lines and `log <var>...` lines
    pub fn from_definition(name: &str, text: &str) -> Result<Self, DefinitionError> {
        debug!(%name, "Logger::from_definition: called");
        let mut logger = Self::new(name);
        for line in text.lines() {
            let tokens = split_line(line)?;
            if logger.base.parse_tokens(&tokens).is_some() {
                continue;
            }
            if let [cmd, vars @ ..] = tokens.as_slice()
                && cmd == "log"
            {
                for var in vars {
                    logger.log_var(var);
                }
            }
        }
        Ok(logger)
    }

    pub fn with_sink(mut self, sink: Box<dyn Write>) -> Self {
        self.sink = sink;
        self
    }

    /// Add a variable to every logged row
    pub fn log_var(&mut self, name: &str) {
        if !self.vars.iter().any(|v| v == name) {
            self.vars.push(name.to_string());
        }
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Number of rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }
}

fn to_json(value: Option<&Literal>) -> Json {
    match value {
        None => Json::Null,
        Some(Literal::Bool(b)) => Json::from(*b),
        Some(Literal::Int(i)) => Json::from(*i),
        Some(Literal::Float(f)) => Json::from(*f),
        Some(Literal::Str(s)) => Json::from(s.as_str()),
    }
}

impl Runnable for Logger {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn item_type(&self) -> &str {
        Self::ITEM_TYPE
    }

    fn run(&mut self, exp: &mut Experiment) -> Result<(), RunError> {
        let row: Map<String, Json> = self
            .vars
            .iter()
            .map(|var| (var.clone(), to_json(exp.state().get(var))))
            .collect();
        writeln!(self.sink, "{}", Json::Object(row))?;
        self.sink.flush()?;
        self.rows += 1;
        debug!(logger = %self.name(), rows = self.rows, "Logger::run: row written");
        Ok(())
    }

    fn to_definition(&self) -> String {
        let mut s = self.base.to_definition(Self::ITEM_TYPE);
        for var in &self.vars {
            s.push_str(&format!("\tlog {}\n", var));
        }
        s
    }

    fn var_info(&self) -> Vec<(String, String)> {
        let mut info = self.base.var_info();
        info.extend(self.vars.iter().map(|v| (v.clone(), "[logged]".to_string())));
        info
    }
}
