//! Contract between the runtime and whatever renders it. The core never draws;
//! it mounts widgets, pushes text and range requests, and pumps raw events.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    KeyPress(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetHandle(pub String);

impl WidgetHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grid cell a widget occupies in the layout container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub row: u16,
    pub col: u16,
    pub row_span: u16,
    pub col_span: u16,
}

impl Placement {
    pub fn cell(row: u16, col: u16) -> Self {
        Self {
            row,
            col,
            row_span: 1,
            col_span: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSpec {
    pub handle: WidgetHandle,
    pub placement: Placement,
}

/// Axis bounds for a camera or viewport fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRange {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub z: Option<(f64, f64)>,
}

pub trait Backend {
    fn mount_widget(&mut self, widget: &WidgetSpec) -> anyhow::Result<()>;

    fn set_widget_text(&mut self, handle: &WidgetHandle, text: &str);

    fn set_range(&mut self, range: ViewRange);

    /// Drains the events raised since the last pump.
    fn process_events(&mut self) -> Vec<BackendEvent>;
}

/// Feeds events into a [`HeadlessBackend`] from any thread.
#[derive(Debug, Clone)]
pub struct EventFeed {
    events: Sender<BackendEvent>,
}

impl EventFeed {
    /// Returns `false` once the backend is gone.
    pub fn send(&self, event: BackendEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn key_press(&self, key: impl Into<String>) -> bool {
        self.send(BackendEvent::KeyPress(key.into()))
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    mounted: Vec<WidgetSpec>,
    texts: HashMap<WidgetHandle, String>,
    ranges: Vec<ViewRange>,
}

/// Backend with no window. Records what it is asked to show so tests and the
/// terminal host can inspect it; clones share the same state.
#[derive(Clone)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
    events: Receiver<BackendEvent>,
}

impl HeadlessBackend {
    pub fn new() -> (Self, EventFeed) {
        let (tx, rx) = unbounded();
        (
            Self {
                state: Rc::new(RefCell::new(HeadlessState::default())),
                events: rx,
            },
            EventFeed { events: tx },
        )
    }

    pub fn mounted(&self) -> Vec<WidgetSpec> {
        self.state.borrow().mounted.clone()
    }

    pub fn widget_text(&self, handle: &WidgetHandle) -> Option<String> {
        self.state.borrow().texts.get(handle).cloned()
    }

    pub fn last_range(&self) -> Option<ViewRange> {
        self.state.borrow().ranges.last().copied()
    }
}

impl Backend for HeadlessBackend {
    fn mount_widget(&mut self, widget: &WidgetSpec) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.mounted.iter().any(|w| w.placement == widget.placement) {
            anyhow::bail!(
                "layout cell ({}, {}) is already occupied",
                widget.placement.row,
                widget.placement.col
            );
        }
        debug!(widget = %widget.handle, "mounting widget");
        state.mounted.push(widget.clone());
        Ok(())
    }

    fn set_widget_text(&mut self, handle: &WidgetHandle, text: &str) {
        self.state
            .borrow_mut()
            .texts
            .insert(handle.clone(), text.to_string());
    }

    fn set_range(&mut self, range: ViewRange) {
        self.state.borrow_mut().ranges.push(range);
    }

    fn process_events(&mut self) -> Vec<BackendEvent> {
        self.events.try_iter().collect()
    }
}
