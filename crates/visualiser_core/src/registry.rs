use std::collections::{BTreeSet, HashSet};

use shared::domain::PluginName;
use tracing::{debug, error};

use crate::{
    error::{ConfigurationError, CyclicDependencyError, PluginInitialisationError},
    plugin::PluginHandle,
    visualiser::Visualiser,
};

struct Registration {
    handle: PluginHandle,
    depends_on: BTreeSet<String>,
}

/// Owns every registered plugin and decides the order they are built in.
#[derive(Default)]
pub struct PluginRegistry {
    registrations: Vec<Registration>,
    initialised: bool,
    built: Vec<PluginName>,
    failures: Vec<PluginInitialisationError>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registrations
            .iter()
            .any(|registration| registration.handle.name().as_str() == name)
    }

    /// Buffers the plugin until [`PluginRegistry::resolve`]. Once initialised,
    /// the caller builds the plugin right away, so dependencies are refused.
    pub fn register(
        &mut self,
        handle: PluginHandle,
        depends_on: BTreeSet<String>,
    ) -> Result<(), ConfigurationError> {
        let name = handle.name();
        if self.initialised {
            if !depends_on.is_empty() {
                return Err(ConfigurationError::DependenciesAfterInitialise {
                    plugin: name.to_string(),
                });
            }
            if self.contains(name.as_str()) {
                return Err(ConfigurationError::DuplicatePlugin {
                    name: name.to_string(),
                });
            }
        }
        debug!(plugin = %name, ?depends_on, "plugin registered");
        self.registrations.push(Registration { handle, depends_on });
        Ok(())
    }

    /// Validates names and dependencies, then returns every plugin in build
    /// order. Nothing is built if this fails.
    pub fn resolve(&mut self) -> Result<Vec<PluginHandle>, ConfigurationError> {
        let mut names = HashSet::new();
        for registration in &self.registrations {
            let name = registration.handle.name().to_string();
            if !names.insert(name.clone()) {
                return Err(ConfigurationError::DuplicatePlugin { name });
            }
        }
        for registration in &self.registrations {
            if let Some(missing) = registration
                .depends_on
                .iter()
                .find(|dependency| !names.contains(*dependency))
            {
                return Err(ConfigurationError::MissingDependency {
                    plugin: registration.handle.name().to_string(),
                    dependency: missing.clone(),
                });
            }
        }

        let pending: Vec<(String, BTreeSet<String>)> = self
            .registrations
            .iter()
            .map(|registration| {
                (
                    registration.handle.name().to_string(),
                    registration.depends_on.clone(),
                )
            })
            .collect();
        let order = topological_sort(&pending)?;
        self.initialised = true;

        Ok(order
            .iter()
            .filter_map(|name| self.lookup(name).ok())
            .collect())
    }

    pub fn lookup(&self, name: &str) -> Result<PluginHandle, ConfigurationError> {
        self.registrations
            .iter()
            .find(|registration| registration.handle.name().as_str() == name)
            .map(|registration| registration.handle.clone())
            .ok_or_else(|| ConfigurationError::UnknownPlugin {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|registration| registration.handle.name().to_string())
            .collect()
    }

    /// Every plugin, in registration order.
    pub fn handles(&self) -> Vec<PluginHandle> {
        self.registrations
            .iter()
            .map(|registration| registration.handle.clone())
            .collect()
    }

    /// Plugins whose build succeeded, in the order they were built.
    pub fn built(&self) -> &[PluginName] {
        &self.built
    }

    pub fn failures(&self) -> &[PluginInitialisationError] {
        &self.failures
    }

    pub(crate) fn record_built(&mut self, name: PluginName) {
        self.built.push(name);
    }

    pub(crate) fn record_failure(&mut self, failure: PluginInitialisationError) {
        error!(plugin = %failure.plugin, reason = %failure.reason, "plugin failed to initialise");
        self.failures.push(failure);
    }
}

/// Kahn-style ordering: each pass emits, in input order, every pending entry
/// whose dependencies have all been emitted. A pass that emits nothing means
/// the remaining entries form a cycle.
pub fn topological_sort(
    pending: &[(String, BTreeSet<String>)],
) -> Result<Vec<String>, CyclicDependencyError> {
    let mut remaining: Vec<(&str, BTreeSet<&str>)> = pending
        .iter()
        .map(|(name, deps)| (name.as_str(), deps.iter().map(String::as_str).collect()))
        .collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|(_, deps)| deps.is_empty());
        if ready.is_empty() {
            return Err(CyclicDependencyError {
                stuck: blocked.iter().map(|(name, _)| name.to_string()).collect(),
            });
        }
        let emitted: Vec<&str> = ready.into_iter().map(|(name, _)| name).collect();
        remaining = blocked
            .into_iter()
            .map(|(name, mut deps)| {
                deps.retain(|dep| !emitted.contains(dep));
                (name, deps)
            })
            .collect();
        order.extend(emitted.into_iter().map(str::to_string));
    }
    Ok(order)
}

/// One plugin's build step: init, mount its widgets, construct. Runs with no
/// registry borrow held so the plugin may look others up.
pub(crate) fn build_plugin(
    handle: &PluginHandle,
    visualiser: &Visualiser,
) -> Result<(), PluginInitialisationError> {
    let name = handle.name();
    debug!(plugin = %name, "initialising plugin");
    handle.slot().borrow_mut().plugin_mut().on_init(visualiser)?;

    let widgets = handle
        .slot()
        .borrow_mut()
        .plugin_mut()
        .as_widget_producing()
        .map(|producer| producer.widgets())
        .unwrap_or_default();
    for widget in &widgets {
        visualiser
            .mount_widget(widget)
            .map_err(|err| PluginInitialisationError::new(name.as_str(), err.to_string()))?;
    }

    handle.construct()?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
