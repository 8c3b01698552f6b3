//! Small plugins that exercise the runtime from a terminal.

use std::{cell::Cell, rc::Rc};

use tracing::{info, warn};
use visualiser_core::{
    backend::{Placement, ViewRange, WidgetHandle, WidgetSpec},
    guard::{EnabledFlag, GuardChain, UpdateGuard},
    plugin::{Guardable, IntervalUpdatable, Toggleable, Triggerable, WidgetProducing},
    Binding, BindingSet, Description, Key, KeyMapping, Plugin, PluginInitialisationError,
    Visualiser, WeakVisualiser,
};

pub const AXES: &str = "axes";
pub const CAMERA: &str = "camera";
pub const FRAME_COUNTER: &str = "frame_counter";

/// Shows or hides the axes widget when toggled.
#[derive(Default)]
pub struct Axes {
    visualiser: Option<WeakVisualiser>,
    widget: Option<WidgetHandle>,
}

impl Axes {
    fn show(&self, text: &str) {
        let visualiser = self.visualiser.as_ref().and_then(WeakVisualiser::upgrade);
        if let (Some(visualiser), Some(widget)) = (visualiser, &self.widget) {
            visualiser.set_widget_text(widget, text);
        }
    }
}

impl Plugin for Axes {
    fn name(&self) -> &str {
        AXES
    }

    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        self.visualiser = Some(visualiser.downgrade());
        self.widget = Some(WidgetHandle::new(AXES));
        Ok(())
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        Some(self)
    }

    fn as_widget_producing(&mut self) -> Option<&mut dyn WidgetProducing> {
        Some(self)
    }
}

impl Toggleable for Axes {
    fn turn_on(&mut self) -> bool {
        self.show("axes: x y z");
        true
    }

    fn turn_off(&mut self) -> bool {
        self.show("axes: hidden");
        true
    }
}

impl WidgetProducing for Axes {
    fn widgets(&mut self) -> Vec<WidgetSpec> {
        vec![WidgetSpec {
            handle: WidgetHandle::new(AXES),
            placement: Placement::cell(0, 0),
        }]
    }
}

/// Zoom controls grouped under the `c` modal, plus a root key toggling the
/// axes plugin it depends on.
#[derive(Default)]
pub struct Camera {
    zoom: Rc<Cell<f64>>,
    bindings: BindingSet,
}

impl Camera {
    /// `None` resets the zoom.
    fn zoom_action(
        visualiser: WeakVisualiser,
        zoom: Rc<Cell<f64>>,
        factor: Option<f64>,
    ) -> impl Fn() {
        move || {
            let level = factor.map_or(1.0, |factor| zoom.get() * factor);
            zoom.set(level);
            if let Some(visualiser) = visualiser.upgrade() {
                let half = 10.0 / level;
                visualiser.set_range(ViewRange {
                    x: (-half, half),
                    y: (-half, half),
                    z: None,
                });
            }
            info!(zoom = level, "camera zoom changed");
        }
    }
}

impl Plugin for Camera {
    fn name(&self) -> &str {
        CAMERA
    }

    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        self.zoom.set(1.0);
        let weak = visualiser.downgrade();
        let zoom = Rc::clone(&self.zoom);
        let level = Rc::clone(&self.zoom);
        self.bindings.replace_with([
            Binding::from(KeyMapping::new(
                Key::plus(),
                "zoom in",
                Self::zoom_action(weak.clone(), Rc::clone(&zoom), Some(1.25)),
            )),
            Binding::from(KeyMapping::new(
                Key::minus(),
                "zoom out",
                Self::zoom_action(weak.clone(), Rc::clone(&zoom), Some(0.8)),
            )),
            Binding::from(KeyMapping::new(
                "r",
                "reset zoom",
                Self::zoom_action(weak, zoom, None),
            )),
            Binding::from(KeyMapping::display_only(Description::lazy(move || {
                format!("current zoom {:.2}x", level.get())
            }))),
        ]);
        self.bindings
            .nest_under("c", Some("camera"))
            .map_err(|err| PluginInitialisationError::new(CAMERA, err.to_string()))?;

        let axes = visualiser
            .plugin(AXES)
            .map_err(|err| PluginInitialisationError::new(CAMERA, err.to_string()))?;
        self.bindings.add_front(KeyMapping::new("a", "toggle axes", move || {
            if let Err(err) = axes.toggle() {
                warn!(error = %err, "failed to toggle axes");
            }
        }));
        Ok(())
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        Some(self)
    }

    fn as_triggerable(&self) -> Option<&dyn Triggerable> {
        Some(self)
    }
}

impl Toggleable for Camera {}

impl Triggerable for Camera {
    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

/// Counts loop ticks while not paused and shows the count every `every` ticks.
pub struct FrameCounter {
    every: u64,
    frames: u64,
    guards: GuardChain,
    bindings: BindingSet,
    visualiser: Option<WeakVisualiser>,
}

impl FrameCounter {
    pub fn new(every: u64) -> Self {
        let running = EnabledFlag::new(true);
        let toggle = running.clone();
        Self {
            every: every.max(1),
            frames: 0,
            guards: GuardChain::new().then(running),
            bindings: BindingSet::new().with(KeyMapping::new(
                "p",
                "pause or resume the frame counter",
                move || toggle.set(!toggle.get()),
            )),
            visualiser: None,
        }
    }
}

impl Plugin for FrameCounter {
    fn name(&self) -> &str {
        FRAME_COUNTER
    }

    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        self.visualiser = Some(visualiser.downgrade());
        Ok(())
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        Some(self)
    }

    fn as_triggerable(&self) -> Option<&dyn Triggerable> {
        Some(self)
    }

    fn as_interval_updatable(&mut self) -> Option<&mut dyn IntervalUpdatable> {
        Some(self)
    }

    fn as_guardable(&mut self) -> Option<&mut dyn Guardable> {
        Some(self)
    }

    fn as_widget_producing(&mut self) -> Option<&mut dyn WidgetProducing> {
        Some(self)
    }
}

impl Toggleable for FrameCounter {}

impl Triggerable for FrameCounter {
    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

impl Guardable for FrameCounter {
    fn on_update_guard(&mut self) -> bool {
        self.guards.allow_update()
    }
}

impl IntervalUpdatable for FrameCounter {
    fn on_update(&mut self) {
        self.frames += 1;
        if self.frames % self.every != 0 {
            return;
        }
        if let Some(visualiser) = self.visualiser.as_ref().and_then(WeakVisualiser::upgrade) {
            visualiser.set_widget_text(
                &WidgetHandle::new(FRAME_COUNTER),
                &format!("frames: {}", self.frames),
            );
        }
    }
}

impl WidgetProducing for FrameCounter {
    fn widgets(&mut self) -> Vec<WidgetSpec> {
        vec![WidgetSpec {
            handle: WidgetHandle::new(FRAME_COUNTER),
            placement: Placement::cell(0, 1),
        }]
    }
}
