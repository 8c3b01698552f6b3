use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    error::ConfigurationError,
    key_mapping::{Action, Key, KeyMapping},
    modal::{Binding, ModalControl},
};

const ROOT_HEADER: &str = "~~~~~~~~~~ Root Directory ~~~~~~~~~";

/// What the root context offers when no modal is entered: the flat mappings
/// of every ON triggerable plugin followed by one entry per declared modal.
#[derive(Debug, Clone, Default)]
pub struct RootContext {
    pub mappings: Vec<KeyMapping>,
    pub modals: Vec<Rc<ModalControl>>,
}

impl RootContext {
    pub fn from_bindings(bindings: impl IntoIterator<Item = Binding>) -> Self {
        let mut context = Self::default();
        for binding in bindings {
            match binding {
                Binding::Mapping(mapping) => context.mappings.push(mapping),
                Binding::Modal(modal) => context.modals.push(modal),
            }
        }
        context
    }

    fn entries(&self) -> impl Iterator<Item = Binding> + '_ {
        self.mappings
            .iter()
            .cloned()
            .map(Binding::Mapping)
            .chain(self.modals.iter().cloned().map(Binding::Modal))
    }

    pub fn help_text(&self) -> String {
        let mut lines: Vec<String> = self.mappings.iter().map(KeyMapping::help_line).collect();
        lines.push(String::new());
        lines.extend(self.modals.iter().map(|modal| modal.entry_line()));
        format!("{ROOT_HEADER}\n\n{}", lines.join("\n"))
    }
}

/// Outcome of one key press. Actions are returned rather than run so the
/// caller can invoke them once every borrow of the dispatcher is released.
#[derive(Clone)]
pub enum Resolution {
    Direct(Action),
    Exited(Rc<ModalControl>),
    Invoke(Action),
    Entered(Rc<ModalControl>),
    Unmatched,
}

impl Resolution {
    pub fn matched(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Direct(action) | Self::Invoke(action) => Some(Rc::clone(action)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct"),
            Self::Exited(modal) => write!(f, "Exited({})", modal.name()),
            Self::Invoke(_) => f.write_str("Invoke"),
            Self::Entered(modal) => write!(f, "Entered({})", modal.name()),
            Self::Unmatched => f.write_str("Unmatched"),
        }
    }
}

struct DirectKey {
    key: Key,
    action: Action,
}

/// Stack-based modal key dispatch.
pub struct ModalDispatcher {
    stack: Vec<Rc<ModalControl>>,
    direct: Vec<DirectKey>,
    quit: Key,
}

impl Default for ModalDispatcher {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            direct: Vec::new(),
            quit: Key::quit(),
        }
    }
}

impl ModalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key handled before, and independently of, the modal stack.
    pub fn register_keypress(&mut self, key: impl Into<Key>, action: impl Fn() + 'static) {
        self.direct.push(DirectKey {
            key: key.into(),
            action: Rc::new(action),
        });
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn at_root(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn current(&self) -> Option<&Rc<ModalControl>> {
        self.stack.last()
    }

    pub fn push(&mut self, modal: Rc<ModalControl>) -> Result<(), ConfigurationError> {
        if self.stack.iter().any(|entered| Rc::ptr_eq(entered, &modal)) {
            return Err(ConfigurationError::ModalAlreadyActive {
                modal: modal.name(),
            });
        }
        debug!(modal = %modal.name(), depth = self.stack.len() + 1, "entering modal");
        self.stack.push(modal);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Rc<ModalControl>> {
        let popped = self.stack.pop();
        if let Some(modal) = &popped {
            debug!(modal = %modal.name(), depth = self.stack.len(), "leaving modal");
        }
        popped
    }

    /// Resolves a key press against direct keys, the quit key and then the
    /// current context, first match wins. `root` is only evaluated when no
    /// modal is entered.
    pub fn resolve(
        &mut self,
        pressed: &str,
        root: impl FnOnce() -> RootContext,
    ) -> Result<Resolution, ConfigurationError> {
        trace!(key = %pressed, depth = self.stack.len(), "dispatching key");
        if let Some(direct) = self.direct.iter().find(|direct| direct.key.matches(pressed)) {
            return Ok(Resolution::Direct(Rc::clone(&direct.action)));
        }
        if !self.stack.is_empty() && self.quit.matches(pressed) {
            return Ok(self.pop().map_or(Resolution::Unmatched, Resolution::Exited));
        }

        let found = match self.stack.last() {
            Some(modal) => modal
                .bindings()
                .iter()
                .find(|binding| binding.key().matches(pressed))
                .cloned(),
            None => root().entries().find(|binding| binding.key().matches(pressed)),
        };
        match found {
            Some(Binding::Mapping(mapping)) => Ok(Resolution::Invoke(mapping.action())),
            Some(Binding::Modal(modal)) => {
                self.push(Rc::clone(&modal))?;
                Ok(Resolution::Entered(modal))
            }
            None => Ok(Resolution::Unmatched),
        }
    }

    pub fn help_text(&self, root: impl FnOnce() -> RootContext) -> String {
        match self.stack.last() {
            Some(modal) => modal.help_text(&self.stack),
            None => root().help_text(),
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
