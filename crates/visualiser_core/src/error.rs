use std::io;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic dependency detected among plugins {stuck:?}")]
pub struct CyclicDependencyError {
    /// Plugins still pending when a sort pass emitted nothing.
    pub stuck: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("plugin '{name}' is registered more than once")]
    DuplicatePlugin { name: String },
    #[error("dependency '{dependency}' of plugin '{plugin}' has not been registered")]
    MissingDependency { plugin: String, dependency: String },
    #[error("plugin '{plugin}' declares dependencies after initialisation; ordering can no longer be guaranteed")]
    DependenciesAfterInitialise { plugin: String },
    #[error("[{quit_key}] cannot be mapped inside modal {modal}")]
    QuitKeyCollision { modal: String, quit_key: String },
    #[error("modal {modal} is already on the modal stack")]
    ModalAlreadyActive { modal: String },
    #[error("plugin '{name}' has not been registered; valid options are {available:?}")]
    UnknownPlugin {
        name: String,
        available: Vec<String>,
    },
    #[error("plugin '{plugin}' cannot be toggled")]
    NotToggleable { plugin: String },
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependencyError),
}

/// Raised by a single plugin's init or construct step. Collected by the
/// registry and never fatal for the remaining plugins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to initialise {plugin}: {reason}")]
pub struct PluginInitialisationError {
    pub plugin: String,
    pub reason: String,
}

impl PluginInitialisationError {
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load visualiser settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid remote endpoint '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },
}

#[derive(Debug, Error)]
pub enum VisualiserError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Initialisation(#[from] PluginInitialisationError),
    #[error("visualiser runtime failed: {0}")]
    Runtime(#[from] io::Error),
}
