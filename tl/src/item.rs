//! Runnable items and the shared item base

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use tracing::debug;

use crate::error::{DefinitionError, RunError};
use crate::experiment::Experiment;
use crate::value::Literal;

/// A unit of an experiment that can be prepared and run
///
/// Running is two-phase: `prepare` readies the item for the current
/// variable bindings and reports failure as `false`; `run` then executes
/// it. Items reach variables, other items and the input device through the
/// [`Experiment`] they are given.
pub trait Runnable {
    fn name(&self) -> &str;

    fn item_type(&self) -> &str;

    /// Prepare for the next run; `false` means the item cannot run
    fn prepare(&mut self, _exp: &mut Experiment) -> bool {
        true
    }

    fn run(&mut self, exp: &mut Experiment) -> Result<(), RunError>;

    /// Definition text that parses back into an equivalent item
    fn to_definition(&self) -> String;

    /// `(variable, description)` pairs describing what the item sets or uses
    fn var_info(&self) -> Vec<(String, String)>;
}

/// Shared handle to a registered item
pub type ItemHandle = Rc<RefCell<dyn Runnable>>;

/// Mutably borrow an item for running
///
/// Fails instead of panicking when the item is already running further up
/// the call stack, e.g. a loop that (indirectly) runs itself.
pub fn enter<'a>(handle: &'a ItemHandle, name: &str) -> Result<RefMut<'a, dyn Runnable + 'static>, RunError> {
    handle
        .try_borrow_mut()
        .map_err(|_| RunError::ItemBusy { item: name.to_string() })
}

/// Split a definition line into shell-style tokens
pub fn split_line(line: &str) -> Result<Vec<String>, DefinitionError> {
    shlex::split(line.trim()).ok_or_else(|| DefinitionError::Quoting {
        line: line.trim().to_string(),
    })
}

/// Quote a value for a definition line so that [`split_line`] restores it
pub fn quote_arg(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// State and parsing common to every item type
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBase {
    name: String,
    description: String,
    vars: Vec<(String, Literal)>,
}

impl ItemBase {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            vars: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn var(&self, key: &str) -> Option<&Literal> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set_var(&mut self, key: &str, value: Literal) {
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.vars.push((key.to_string(), value)),
        }
    }

    /// Parse one definition line, keeping it if it is a `set` line
    pub fn parse_variable(&mut self, line: &str) -> Result<Option<(String, Literal)>, DefinitionError> {
        let tokens = split_line(line)?;
        Ok(self.parse_tokens(&tokens))
    }

    /// Handle an already tokenized line; returns the setting for `set` lines
    pub fn parse_tokens(&mut self, tokens: &[String]) -> Option<(String, Literal)> {
        match tokens {
            [cmd, key, value, ..] if cmd == "set" => {
                debug!(item = %self.name, %key, %value, "ItemBase::parse_tokens: set");
                if key == "description" {
                    self.description = value.clone();
                    return Some((key.clone(), Literal::Str(value.clone())));
                }
                let literal = Literal::coerce(value);
                self.set_var(key, literal.clone());
                Some((key.clone(), literal))
            }
            _ => None,
        }
    }

    /// `define` header plus one `set` line per variable
    pub fn to_definition(&self, type_tag: &str) -> String {
        let mut s = format!("define {} {}\n", type_tag, self.name);
        s.push_str(&format!("\tset description {}\n", quote_arg(&self.description)));
        for (key, value) in &self.vars {
            s.push_str(&format!("\tset {} {}\n", key, quote_arg(&value.to_string())));
        }
        s
    }

    pub fn var_info(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect()
    }
}
