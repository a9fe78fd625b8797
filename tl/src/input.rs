//! Input devices the loop flushes before running its trials

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use tracing::{debug, warn};

use crate::error::RunError;

/// A source of queued participant input
pub trait InputDevice {
    /// Discard all pending input
    ///
    /// Returns whether anything was pending. A pending escape key aborts
    /// with [`RunError::Interrupted`].
    fn flush(&mut self) -> Result<bool, RunError>;
}

/// No input device attached; flushing is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInput;

impl InputDevice for NullInput {
    fn flush(&mut self) -> Result<bool, RunError> {
        Ok(false)
    }
}

/// Keyboard of the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalKeyboard;

impl TerminalKeyboard {
    pub fn new() -> Self {
        Self
    }
}

impl InputDevice for TerminalKeyboard {
    fn flush(&mut self) -> Result<bool, RunError> {
        debug!("TerminalKeyboard::flush: called");
        terminal::enable_raw_mode()?;
        let drained = drain_events();
        terminal::disable_raw_mode()?;
        let pressed = drained?;
        if pressed {
            warn!("Discarded pending key presses");
        }
        Ok(pressed)
    }
}

fn drain_events() -> Result<bool, RunError> {
    let mut pressed = false;
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if key.code == KeyCode::Esc {
                return Err(RunError::Interrupted);
            }
            pressed = true;
        }
    }
    Ok(pressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_input_never_pending() {
        let mut input = NullInput;
        assert!(!input.flush().unwrap());
        assert!(!input.flush().unwrap());
    }
}
