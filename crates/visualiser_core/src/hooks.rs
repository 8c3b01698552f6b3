use std::{
    borrow::Cow,
    cell::RefCell,
    fmt,
    rc::Rc,
};

use tracing::{trace, warn};

pub type HookResult = anyhow::Result<()>;
pub type HookCallback = Rc<dyn Fn() -> HookResult>;

/// Key of a hook entry. Callbacks added without an explicit id are keyed by
/// the address of their shared allocation: adding the same [`HookCallback`]
/// twice replaces the first entry, distinct callbacks always coexist.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum HookId {
    Named(Cow<'static, str>),
    Callback(usize),
}

impl HookId {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    /// Only stable while the callback is alive; entries hold theirs.
    pub fn of(callback: &HookCallback) -> Self {
        Self::Callback(Rc::as_ptr(callback) as *const () as usize)
    }
}

impl From<&'static str> for HookId {
    fn from(value: &'static str) -> Self {
        Self::named(value)
    }
}

impl From<String> for HookId {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

impl fmt::Debug for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Callback(address) => write!(f, "callback:{address:#x}"),
        }
    }
}

/// Insertion-ordered, id-keyed multicast callback list.
pub struct HookList {
    name: &'static str,
    entries: RefCell<Vec<(HookId, HookCallback)>>,
}

impl HookList {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_hook<F>(&self, callback: F) -> HookId
    where
        F: Fn() -> HookResult + 'static,
    {
        self.add_shared_hook(Rc::new(callback))
    }

    /// Keyed by the callback itself, so adding one `Rc` to the same list
    /// twice keeps a single entry.
    pub fn add_shared_hook(&self, callback: HookCallback) -> HookId {
        self.insert(HookId::of(&callback), callback)
    }

    /// Re-adding an existing id replaces its callback in place.
    pub fn add_hook_with_id<F>(&self, id: impl Into<HookId>, callback: F) -> HookId
    where
        F: Fn() -> HookResult + 'static,
    {
        self.insert(id.into(), Rc::new(callback))
    }

    fn insert(&self, id: HookId, callback: HookCallback) -> HookId {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = callback,
            None => entries.push((id.clone(), callback)),
        }
        id
    }

    pub fn remove_hook(&self, id: &HookId) -> Option<HookCallback> {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|(existing, _)| existing == id) {
            Some(index) => Some(entries.remove(index).1),
            None => {
                let available: Vec<&HookId> = entries.iter().map(|(id, _)| id).collect();
                warn!(hook = self.name, id = ?id, ?available, "hook id not registered; nothing removed");
                None
            }
        }
    }

    pub fn contains(&self, id: &HookId) -> bool {
        self.entries.borrow().iter().any(|(existing, _)| existing == id)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Fires every callback in insertion order and returns how many failed.
    /// A failing callback is logged and does not stop the rest.
    pub fn fire(&self) -> usize {
        let snapshot: Vec<(HookId, HookCallback)> = self.entries.borrow().clone();
        trace!(hook = self.name, callbacks = snapshot.len(), "firing hook");
        let mut failed = 0;
        for (id, callback) in snapshot {
            if let Err(err) = callback() {
                failed += 1;
                warn!(hook = self.name, id = ?id, error = %err, "hook callback failed");
            }
        }
        failed
    }
}

impl fmt::Debug for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookList")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

/// The named lifecycle buses shared by the runtime and its plugins.
#[derive(Debug)]
pub struct HookBus {
    pub init_finished: HookList,
    pub post_keypress: HookList,
    pub application_closing: HookList,
    pub periodic_tick: HookList,
    pub plugin_state_changed: HookList,
}

impl Default for HookBus {
    fn default() -> Self {
        Self {
            init_finished: HookList::new("init_finished"),
            post_keypress: HookList::new("post_keypress"),
            application_closing: HookList::new("application_closing"),
            periodic_tick: HookList::new("periodic_tick"),
            plugin_state_changed: HookList::new("plugin_state_changed"),
        }
    }
}
