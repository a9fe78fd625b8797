//! Experiment script parsing
//!
//! A script is a list of top-level `set` lines followed by item blocks:
//!
//! ```text
//! set start block_loop
//!
//! define loop block_loop
//!     set cycles 2
//!     setcycle 0 soa 100
//!     run trial_logger
//! ```
//!
//! Block bodies are the indented lines following their `define` header and
//! are handed verbatim to the item type's own parser.

use tracing::debug;

use crate::error::DefinitionError;
use crate::item::split_line;

/// One `define <type> <name>` block
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub item_type: String,
    pub name: String,
    pub body: String,
}

/// A parsed, not yet instantiated, experiment script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    vars: Vec<(String, String)>,
    definitions: Vec<Definition>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        debug!(bytes = text.len(), "Script::parse: called");
        let mut script = Script::default();
        let mut current: Option<Definition> = None;

        for raw in text.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let indented = raw.starts_with(|c: char| c.is_whitespace());
            if indented && let Some(def) = current.as_mut() {
                def.body.push_str(trimmed);
                def.body.push('\n');
                continue;
            }

            let tokens = split_line(trimmed)?;
            match tokens.as_slice() {
                [cmd, rest @ ..] if cmd == "define" => {
                    let [item_type, name] = rest else {
                        return Err(DefinitionError::MalformedDefine {
                            line: trimmed.to_string(),
                        });
                    };
                    if let Some(done) = current.take() {
                        script.definitions.push(done);
                    }
                    current = Some(Definition {
                        item_type: item_type.clone(),
                        name: name.clone(),
                        body: String::new(),
                    });
                }
                [cmd, key, value, ..] if cmd == "set" => {
                    if let Some(done) = current.take() {
                        script.definitions.push(done);
                    }
                    script.vars.push((key.clone(), value.clone()));
                }
                _ => debug!(line = %trimmed, "Script::parse: ignoring unrecognized line"),
            }
        }

        if let Some(done) = current.take() {
            script.definitions.push(done);
        }
        Ok(script)
    }

    /// Top-level `set` lines, in order
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}
