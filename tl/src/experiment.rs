//! Experiment - the context every item runs in
//!
//! Owns the variable state, the registry of named items, the input device
//! and the random number generator. It is passed explicitly (`&mut`) to
//! every item so that nothing relies on global state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{DefinitionError, RunError};
use crate::input::{InputDevice, NullInput};
use crate::item::{ItemHandle, Runnable, enter, quote_arg};
use crate::logger::Logger;
use crate::r#loop::LoopController;
use crate::script::{Definition, Script};
use crate::state::ExperimentState;
use crate::value::Literal;

/// Name used as the caller when the experiment itself runs an item
pub const EXPERIMENT_CALLER: &str = "experiment";

pub struct Experiment {
    state: ExperimentState,
    items: HashMap<String, ItemHandle>,
    /// Item names in registration order
    order: Vec<String>,
    /// Top-level script variables, kept for serialization
    script_vars: Vec<(String, Literal)>,
    input: Box<dyn InputDevice>,
    rng: StdRng,
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new()
    }
}

impl Experiment {
    /// An empty experiment with no input device and an OS-seeded RNG
    pub fn new() -> Self {
        Self {
            state: ExperimentState::new(),
            items: HashMap::new(),
            order: Vec::new(),
            script_vars: Vec::new(),
            input: Box::new(NullInput),
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_input(mut self, input: Box<dyn InputDevice>) -> Self {
        self.input = input;
        self
    }

    /// Make every random draw (sequences and expressions) reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug!(seed, "Experiment::with_seed: called");
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Build an experiment from a parsed script
    pub fn from_script(script: &Script) -> Result<Self, DefinitionError> {
        let mut exp = Self::new();
        for (key, raw) in script.vars() {
            let value = Literal::coerce(raw);
            exp.state.set(key.clone(), value.clone());
            exp.script_vars.push((key.clone(), value));
        }
        for def in script.definitions() {
            let handle = build_item(def)?;
            exp.register_handle(handle)?;
        }
        info!(items = exp.order.len(), "Experiment built from script");
        Ok(exp)
    }

    /// Register an item under its own name
    pub fn register<T: Runnable + 'static>(&mut self, item: T) -> Result<ItemHandle, DefinitionError> {
        let handle: ItemHandle = Rc::new(RefCell::new(item));
        self.register_handle(handle.clone())?;
        Ok(handle)
    }

    pub fn register_handle(&mut self, handle: ItemHandle) -> Result<(), DefinitionError> {
        let name = handle.borrow().name().to_string();
        if self.items.contains_key(&name) {
            return Err(DefinitionError::DuplicateItem { name });
        }
        debug!(%name, "Experiment::register_handle: registered");
        self.order.push(name.clone());
        self.items.insert(name, handle);
        Ok(())
    }

    /// Look up an item by name
    pub fn item(&self, name: &str) -> Option<ItemHandle> {
        self.items.get(name).cloned()
    }

    /// All items in registration order
    pub fn items(&self) -> impl Iterator<Item = &ItemHandle> + '_ {
        self.order.iter().filter_map(|name| self.items.get(name))
    }

    pub fn state(&self) -> &ExperimentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ExperimentState {
        &mut self.state
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn flush_input(&mut self) -> Result<bool, RunError> {
        self.input.flush()
    }

    /// The item named by the `start` variable, if any
    pub fn start(&self) -> Option<String> {
        self.state.get("start").map(|v| v.to_string())
    }

    /// Prepare and run an item by name
    pub fn run_item(&mut self, name: &str) -> Result<(), RunError> {
        info!(item = %name, "Running item");
        let handle = self.item(name).ok_or_else(|| RunError::ItemNotFound {
            item: name.to_string(),
            caller: EXPERIMENT_CALLER.to_string(),
        })?;
        let mut item = enter(&handle, name)?;
        if !item.prepare(self) {
            return Err(RunError::PrepareFailed {
                item: name.to_string(),
                caller: EXPERIMENT_CALLER.to_string(),
            });
        }
        item.run(self)
    }

    /// Serialize top-level variables and all item definitions
    pub fn to_script(&self) -> String {
        let mut s = String::new();
        for (key, value) in &self.script_vars {
            s.push_str(&format!("set {} {}\n", key, quote_arg(&value.to_string())));
        }
        for handle in self.items() {
            s.push('\n');
            s.push_str(&handle.borrow().to_definition());
        }
        s
    }
}

/// Instantiate one definition block by item type
pub fn build_item(def: &Definition) -> Result<ItemHandle, DefinitionError> {
    debug!(item_type = %def.item_type, name = %def.name, "build_item: called");
    let handle: ItemHandle = match def.item_type.as_str() {
        LoopController::ITEM_TYPE => Rc::new(RefCell::new(LoopController::from_definition(&def.name, &def.body)?)),
        Logger::ITEM_TYPE => Rc::new(RefCell::new(Logger::from_definition(&def.name, &def.body)?)),
        other => {
            return Err(DefinitionError::UnknownItemType {
                item_type: other.to_string(),
                name: def.name.clone(),
            });
        }
    };
    Ok(handle)
}
