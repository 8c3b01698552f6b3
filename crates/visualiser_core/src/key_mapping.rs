use std::{borrow::Cow, fmt, rc::Rc};

/// Reserved for leaving the current modal. Never mappable inside one.
pub const QUIT_KEY: &str = "q";

pub type Action = Rc<dyn Fn()>;

/// A set of case-insensitive key aliases. An empty key matches nothing and is
/// used for display-only help lines.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    aliases: Vec<String>,
    display: Option<String>,
}

impl Key {
    pub fn new(alias: &str) -> Self {
        Self::any_of([alias])
    }

    pub fn any_of<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let aliases = aliases
            .into_iter()
            .map(|alias| alias.as_ref().to_uppercase())
            .filter(|alias| !alias.is_empty())
            .collect();
        Self {
            aliases,
            display: None,
        }
    }

    pub fn none() -> Self {
        Self {
            aliases: Vec::new(),
            display: None,
        }
    }

    pub fn quit() -> Self {
        Self::new(QUIT_KEY)
    }

    pub fn plus() -> Self {
        Self::any_of(["+", "="]).with_display("+")
    }

    pub fn minus() -> Self {
        Self::any_of(["-", "_"]).with_display("-")
    }

    /// Overrides how the key is printed in help text.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn matches(&self, pressed: &str) -> bool {
        if pressed.is_empty() {
            return false;
        }
        let pressed = pressed.to_uppercase();
        self.aliases.iter().any(|alias| *alias == pressed)
    }

    pub fn overlaps(&self, other: &Key) -> bool {
        self.aliases.iter().any(|alias| other.aliases.contains(alias))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<char> for Key {
    fn from(value: char) -> Self {
        Self::new(value.encode_utf8(&mut [0; 4]))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display {
            Some(display) => f.write_str(display),
            None => f.write_str(&self.aliases.join(",").to_lowercase()),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

/// Help text of a binding. Lazy descriptions are re-evaluated on every render
/// so they can reflect current state.
#[derive(Clone)]
pub enum Description {
    Static(Cow<'static, str>),
    Lazy(Rc<dyn Fn() -> String>),
}

impl Description {
    pub fn lazy(render: impl Fn() -> String + 'static) -> Self {
        Self::Lazy(Rc::new(render))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Static(text) => text.to_string(),
            Self::Lazy(render) => render(),
        }
    }
}

impl From<&'static str> for Description {
    fn from(value: &'static str) -> Self {
        Self::Static(Cow::Borrowed(value))
    }
}

impl From<String> for Description {
    fn from(value: String) -> Self {
        Self::Static(Cow::Owned(value))
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => write!(f, "Static({text:?})"),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

#[derive(Clone)]
pub struct KeyMapping {
    key: Key,
    description: Description,
    action: Action,
}

impl KeyMapping {
    pub fn new(
        key: impl Into<Key>,
        description: impl Into<Description>,
        action: impl Fn() + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            action: Rc::new(action),
        }
    }

    /// A help line with no key attached. Never matches a key press.
    pub fn display_only(description: impl Into<Description>) -> Self {
        Self::new(Key::none(), description, || {})
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn description(&self) -> String {
        self.description.render()
    }

    pub fn action(&self) -> Action {
        Rc::clone(&self.action)
    }

    pub fn invoke(&self) {
        (self.action)()
    }

    pub fn help_line(&self) -> String {
        if self.key.is_empty() {
            self.description()
        } else {
            format!("Press [{}] to {}", self.key, self.description())
        }
    }
}

impl fmt::Debug for KeyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMapping")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
