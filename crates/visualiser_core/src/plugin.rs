//! Plugins and their lifecycle.
//!
//! A plugin is registered EMPTY, constructed at most once (which leaves it ON)
//! and afterwards alternates between ON and OFF. Optional behaviour is opted
//! into through capability traits that the runtime queries by accessor.

use std::{any::Any, cell::RefCell, fmt, rc::Rc};

use shared::domain::{PluginName, PluginState, PluginSummary};
use tracing::{debug, warn};

use crate::{
    backend::WidgetSpec,
    error::{ConfigurationError, PluginInitialisationError, VisualiserError},
    hooks::HookBus,
    modal::{Binding, BindingSet},
    visualiser::Visualiser,
};

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait Plugin: AsAny {
    /// Default registry key. Can be overridden at registration.
    fn name(&self) -> &str;

    /// Runs before widgets are mounted. Other plugins can be looked up here.
    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let _ = visualiser;
        Ok(())
    }

    /// Builds the plugin's visuals. The runtime calls this at most once.
    fn construct(&mut self) -> Result<(), PluginInitialisationError> {
        Ok(())
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        None
    }

    fn as_triggerable(&self) -> Option<&dyn Triggerable> {
        None
    }

    fn as_interval_updatable(&mut self) -> Option<&mut dyn IntervalUpdatable> {
        None
    }

    fn as_guardable(&mut self) -> Option<&mut dyn Guardable> {
        None
    }

    fn as_widget_producing(&mut self) -> Option<&mut dyn WidgetProducing> {
        None
    }
}

/// Attach/detach hooks. Returning `false` refuses the transition.
pub trait Toggleable {
    fn turn_on(&mut self) -> bool {
        true
    }

    fn turn_off(&mut self) -> bool {
        true
    }
}

pub trait Triggerable {
    fn bindings(&self) -> &BindingSet;
}

pub trait IntervalUpdatable {
    fn on_update(&mut self);
}

pub trait Guardable {
    fn on_update_guard(&mut self) -> bool;
}

pub trait WidgetProducing {
    fn widgets(&mut self) -> Vec<WidgetSpec>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PluginState,
    pub to: PluginState,
}

/// Registry-owned state machine around one plugin instance.
pub struct PluginSlot {
    name: PluginName,
    state: PluginState,
    construct_calls: u32,
    toggleable: bool,
    triggerable: bool,
    plugin: Box<dyn Plugin>,
}

impl PluginSlot {
    pub fn new(name: PluginName, mut plugin: Box<dyn Plugin>) -> Self {
        let toggleable = plugin.as_toggleable().is_some();
        let triggerable = plugin.as_triggerable().is_some();
        Self {
            name,
            state: PluginState::Empty,
            construct_calls: 0,
            toggleable,
            triggerable,
            plugin,
        }
    }

    pub fn name(&self) -> &PluginName {
        &self.name
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn construct_calls(&self) -> u32 {
        self.construct_calls
    }

    pub fn is_toggleable(&self) -> bool {
        self.toggleable
    }

    pub fn is_triggerable(&self) -> bool {
        self.triggerable
    }

    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            state: self.state,
            triggerable: self.triggerable,
            toggleable: self.toggleable,
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }

    pub fn downcast_ref<T: Plugin>(&self) -> Option<&T> {
        self.plugin().as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Plugin>(&mut self) -> Option<&mut T> {
        self.plugin_mut().as_any_mut().downcast_mut::<T>()
    }

    pub fn construct(&mut self) -> Result<Option<Transition>, PluginInitialisationError> {
        if self.state.is_built() {
            return Ok(None);
        }
        if self.construct_calls > 0 {
            return Err(PluginInitialisationError::new(
                self.name.as_str(),
                "construction already failed once",
            ));
        }
        self.construct_calls += 1;
        debug!(plugin = %self.name, "constructing plugin");
        self.plugin.construct()?;
        if let Some(toggleable) = self.plugin.as_toggleable() {
            if !toggleable.turn_on() {
                debug!(plugin = %self.name, "plugin declined to attach after construction");
            }
        }
        Ok(Some(self.set_state(PluginState::On)))
    }

    pub fn turn_on(&mut self) -> Result<Option<Transition>, VisualiserError> {
        match self.state {
            PluginState::Empty => Ok(self.construct()?),
            PluginState::On => Ok(None),
            PluginState::Off => {
                let accepted = self.toggleable_mut()?.turn_on();
                Ok(accepted.then(|| self.set_state(PluginState::On)))
            }
        }
    }

    pub fn turn_off(&mut self) -> Result<Option<Transition>, VisualiserError> {
        match self.state {
            PluginState::Empty | PluginState::Off => Ok(None),
            PluginState::On => {
                let accepted = self.toggleable_mut()?.turn_off();
                Ok(accepted.then(|| self.set_state(PluginState::Off)))
            }
        }
    }

    pub fn toggle(&mut self) -> Result<Option<Transition>, VisualiserError> {
        if !self.toggleable {
            return Err(ConfigurationError::NotToggleable {
                plugin: self.name.to_string(),
            }
            .into());
        }
        match self.state {
            PluginState::Empty => Ok(self.construct()?),
            PluginState::On => self.turn_off(),
            PluginState::Off => self.turn_on(),
        }
    }

    /// Runs the periodic update of an ON plugin. Guards are skipped when
    /// `force` is set. Returns whether the update ran.
    pub fn update(&mut self, force: bool) -> bool {
        if !self.state.is_on() {
            return false;
        }
        if !force {
            if let Some(guardable) = self.plugin.as_guardable() {
                if !guardable.on_update_guard() {
                    return false;
                }
            }
        }
        match self.plugin.as_interval_updatable() {
            Some(updatable) => {
                updatable.on_update();
                true
            }
            None => false,
        }
    }

    /// Bindings offered to the root dispatch context. OFF and unbuilt plugins
    /// offer none.
    pub fn root_bindings(&self) -> Vec<Binding> {
        if !self.state.is_on() {
            return Vec::new();
        }
        self.plugin
            .as_triggerable()
            .map(|triggerable| triggerable.bindings().to_vec())
            .unwrap_or_default()
    }

    fn toggleable_mut(&mut self) -> Result<&mut dyn Toggleable, ConfigurationError> {
        let plugin = self.name.to_string();
        self.plugin
            .as_toggleable()
            .ok_or(ConfigurationError::NotToggleable { plugin })
    }

    fn set_state(&mut self, to: PluginState) -> Transition {
        let from = std::mem::replace(&mut self.state, to);
        Transition { from, to }
    }
}

impl fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("construct_calls", &self.construct_calls)
            .finish_non_exhaustive()
    }
}

/// Shared reference to a registered plugin. Every state transition made
/// through a handle fires `plugin_state_changed` once the slot is released.
#[derive(Clone)]
pub struct PluginHandle {
    slot: Rc<RefCell<PluginSlot>>,
    hooks: Rc<HookBus>,
}

impl PluginHandle {
    pub(crate) fn new(slot: PluginSlot, hooks: Rc<HookBus>) -> Self {
        Self {
            slot: Rc::new(RefCell::new(slot)),
            hooks,
        }
    }

    pub fn name(&self) -> PluginName {
        self.slot.borrow().name().clone()
    }

    pub fn state(&self) -> PluginState {
        self.slot.borrow().state()
    }

    pub fn construct_calls(&self) -> u32 {
        self.slot.borrow().construct_calls()
    }

    pub fn summary(&self) -> PluginSummary {
        self.slot.borrow().summary()
    }

    pub fn construct(&self) -> Result<PluginState, PluginInitialisationError> {
        let transition = self.slot.borrow_mut().construct()?;
        self.announce(transition);
        Ok(self.state())
    }

    pub fn turn_on(&self) -> Result<PluginState, VisualiserError> {
        let transition = self.slot.borrow_mut().turn_on()?;
        self.announce(transition);
        Ok(self.state())
    }

    pub fn turn_off(&self) -> Result<PluginState, VisualiserError> {
        let transition = self.slot.borrow_mut().turn_off()?;
        self.announce(transition);
        Ok(self.state())
    }

    pub fn toggle(&self) -> Result<PluginState, VisualiserError> {
        let transition = self.slot.borrow_mut().toggle()?;
        self.announce(transition);
        Ok(self.state())
    }

    pub fn update(&self, force: bool) -> bool {
        self.slot.borrow_mut().update(force)
    }

    /// Turns the plugin on until the returned guard is dropped.
    pub fn scoped_on(&self) -> Result<ScopedOn, VisualiserError> {
        self.turn_on()?;
        Ok(ScopedOn {
            handle: self.clone(),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn Plugin) -> R) -> R {
        f(self.slot.borrow().plugin())
    }

    /// Runs `f` against the concrete plugin type, or `None` if it is another type.
    pub fn with_plugin<T: Plugin, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.borrow().downcast_ref::<T>().map(f)
    }

    pub fn with_plugin_mut<T: Plugin, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.slot.borrow_mut().downcast_mut::<T>().map(f)
    }

    /// Empty while the plugin itself is busy (mid-init or mid-transition).
    pub(crate) fn root_bindings(&self) -> Vec<Binding> {
        self.slot
            .try_borrow()
            .map(|slot| slot.root_bindings())
            .unwrap_or_default()
    }

    pub(crate) fn slot(&self) -> &RefCell<PluginSlot> {
        &self.slot
    }

    fn announce(&self, transition: Option<Transition>) {
        if let Some(Transition { from, to }) = transition {
            debug!(plugin = %self.name(), %from, %to, "plugin state changed");
            self.hooks.plugin_state_changed.fire();
        }
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.try_borrow() {
            Ok(slot) => fmt::Debug::fmt(&*slot, f),
            Err(_) => f.write_str("PluginHandle(<in use>)"),
        }
    }
}

pub struct ScopedOn {
    handle: PluginHandle,
}

impl Drop for ScopedOn {
    fn drop(&mut self) {
        if let Err(err) = self.handle.turn_off() {
            warn!(plugin = %self.handle.name(), error = %err, "failed to turn plugin off at scope end");
        }
    }
}

#[cfg(test)]
#[path = "tests/plugin_tests.rs"]
mod tests;
