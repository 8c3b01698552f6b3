//! Orchestration core of the visualiser: plugin registry and lifecycle, modal
//! key dispatch, lifecycle hooks, the cooperative loop and the loop side of
//! remote control. Rendering is left to a [`backend::Backend`].

pub mod backend;
pub mod config;
pub mod datasource;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod key_mapping;
pub mod modal;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod remote;
pub mod scheduler;
mod visualiser;

pub use backend::{Backend, BackendEvent, EventFeed, HeadlessBackend};
pub use config::{load_settings, VisualiserConfig};
pub use error::{
    ConfigurationError, CyclicDependencyError, PluginInitialisationError, SettingsError,
    VisualiserError,
};
pub use hooks::{HookBus, HookCallback, HookId, HookList, HookResult};
pub use key_mapping::{Description, Key, KeyMapping, QUIT_KEY};
pub use modal::{Binding, BindingSet, ModalControl};
pub use plugin::{Plugin, PluginHandle};
pub use remote::{spawn_visualiser_thread, RemoteControlSource};
pub use scheduler::{Scheduler, ShutdownSignal};
pub use shared::domain::{PluginName, PluginState};
pub use visualiser::{Visualiser, WeakVisualiser};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
