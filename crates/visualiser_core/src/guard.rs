use std::{
    cell::Cell,
    fmt,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::SystemTime,
};

use tracing::trace;

/// Decides whether a plugin's periodic update may run this tick.
pub trait UpdateGuard {
    fn allow_update(&mut self) -> bool;
}

impl<F: FnMut() -> bool> UpdateGuard for F {
    fn allow_update(&mut self) -> bool {
        self()
    }
}

/// Guards evaluated in order with short-circuit AND.
#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn UpdateGuard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, guard: impl UpdateGuard + 'static) -> Self {
        self.push(guard);
        self
    }

    pub fn push(&mut self, guard: impl UpdateGuard + 'static) {
        self.guards.push(Box::new(guard));
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl UpdateGuard for GuardChain {
    fn allow_update(&mut self) -> bool {
        self.guards.iter_mut().all(|guard| guard.allow_update())
    }
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardChain")
            .field("guards", &self.guards.len())
            .finish()
    }
}

/// Passes only when the watched file's modification time moved forward since
/// the last pass. A missing file never passes.
#[derive(Debug, Clone)]
pub struct FileModifiedGuard {
    path: PathBuf,
    last_seen: Option<SystemTime>,
}

impl FileModifiedGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_exists(&self) -> bool {
        self.path.is_file()
    }
}

impl UpdateGuard for FileModifiedGuard {
    fn allow_update(&mut self) -> bool {
        let Ok(modified) = fs::metadata(&self.path).and_then(|meta| meta.modified()) else {
            return false;
        };
        if self.last_seen.is_some_and(|seen| seen >= modified) {
            return false;
        }
        trace!(path = %self.path.display(), "watched file changed");
        self.last_seen = Some(modified);
        true
    }
}

/// A shared on/off switch. Clones observe the same value, so whoever owns one
/// clone can pause the guarded plugin's updates.
#[derive(Debug, Clone)]
pub struct EnabledFlag(Rc<Cell<bool>>);

impl EnabledFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Rc::new(Cell::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.set(enabled);
    }

    pub fn get(&self) -> bool {
        self.0.get()
    }
}

impl UpdateGuard for EnabledFlag {
    fn allow_update(&mut self) -> bool {
        self.get()
    }
}
