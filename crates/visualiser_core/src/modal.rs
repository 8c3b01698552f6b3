use std::{fmt, rc::Rc};

use crate::{
    error::ConfigurationError,
    key_mapping::{Key, KeyMapping, QUIT_KEY},
};

/// One entry of a plugin's or modal's binding list.
#[derive(Clone, Debug)]
pub enum Binding {
    Mapping(KeyMapping),
    Modal(Rc<ModalControl>),
}

impl Binding {
    pub fn key(&self) -> &Key {
        match self {
            Self::Mapping(mapping) => mapping.key(),
            Self::Modal(modal) => modal.key(),
        }
    }

    pub fn help_line(&self) -> String {
        match self {
            Self::Mapping(mapping) => mapping.help_line(),
            Self::Modal(modal) => modal.entry_line(),
        }
    }
}

impl From<KeyMapping> for Binding {
    fn from(value: KeyMapping) -> Self {
        Self::Mapping(value)
    }
}

impl From<Rc<ModalControl>> for Binding {
    fn from(value: Rc<ModalControl>) -> Self {
        Self::Modal(value)
    }
}

/// A named, stack-pushable set of bindings. Identity matters: the dispatcher
/// refuses to push the same instance twice, so instances live behind `Rc`.
pub struct ModalControl {
    key: Key,
    name: Option<String>,
    bindings: Vec<Binding>,
}

impl ModalControl {
    pub fn new(
        key: impl Into<Key>,
        bindings: impl IntoIterator<Item = Binding>,
    ) -> Result<Rc<Self>, ConfigurationError> {
        Self::build(key.into(), None, bindings.into_iter().collect())
    }

    pub fn named(
        key: impl Into<Key>,
        name: impl Into<String>,
        bindings: impl IntoIterator<Item = Binding>,
    ) -> Result<Rc<Self>, ConfigurationError> {
        Self::build(key.into(), Some(name.into()), bindings.into_iter().collect())
    }

    fn build(
        key: Key,
        name: Option<String>,
        bindings: Vec<Binding>,
    ) -> Result<Rc<Self>, ConfigurationError> {
        let quit = Key::quit();
        if bindings.iter().any(|binding| binding.key().overlaps(&quit)) {
            let modal = name.clone().unwrap_or_else(|| format!("[{key}]"));
            return Err(ConfigurationError::QuitKeyCollision {
                modal,
                quit_key: QUIT_KEY.to_string(),
            });
        }
        Ok(Rc::new(Self {
            key,
            name,
            bindings,
        }))
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("[{}]", self.key))
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn entry_line(&self) -> String {
        format!("Press [{}] to control Modal {}", self.key, self.name())
    }

    /// Help for this modal as the top of `stack`, headed by the breadcrumb of
    /// every modal currently entered.
    pub fn help_text(&self, stack: &[Rc<ModalControl>]) -> String {
        let breadcrumb = stack
            .iter()
            .map(|modal| modal.name())
            .collect::<Vec<_>>()
            .join(" > ");
        let lines = self
            .bindings
            .iter()
            .map(Binding::help_line)
            .collect::<Vec<_>>()
            .join("\n");
        format!(">>>>>  {breadcrumb}\n\n{lines}\n\n\n\nPress [{QUIT_KEY}] to exit current modal")
    }
}

impl fmt::Debug for ModalControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalControl")
            .field("key", &self.key)
            .field("name", &self.name())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Ordered bindings contributed by a triggerable plugin.
#[derive(Clone, Debug, Default)]
pub struct BindingSet {
    bindings: Vec<Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, binding: impl Into<Binding>) -> Self {
        self.add(binding);
        self
    }

    pub fn add(&mut self, binding: impl Into<Binding>) {
        self.bindings.push(binding.into());
    }

    pub fn add_front(&mut self, binding: impl Into<Binding>) {
        self.bindings.insert(0, binding.into());
    }

    /// Adds several bindings keeping their relative order, either after or
    /// before the existing ones.
    pub fn extend(&mut self, bindings: impl IntoIterator<Item = Binding>, front: bool) {
        if front {
            let mut incoming: Vec<Binding> = bindings.into_iter().collect();
            incoming.append(&mut self.bindings);
            self.bindings = incoming;
        } else {
            self.bindings.extend(bindings);
        }
    }

    pub fn replace_with(&mut self, bindings: impl IntoIterator<Item = Binding>) {
        self.bindings = bindings.into_iter().collect();
    }

    pub fn to_vec(&self) -> Vec<Binding> {
        self.bindings.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Moves every current binding into one new modal entered with `key`.
    pub fn nest_under(
        &mut self,
        key: impl Into<Key>,
        name: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        let current = std::mem::take(&mut self.bindings);
        let nested = match name {
            Some(name) => ModalControl::named(key, name, current.clone()),
            None => ModalControl::new(key, current.clone()),
        };
        match nested {
            Ok(modal) => {
                self.bindings = vec![Binding::Modal(modal)];
                Ok(())
            }
            Err(err) => {
                self.bindings = current;
                Err(err)
            }
        }
    }
}
