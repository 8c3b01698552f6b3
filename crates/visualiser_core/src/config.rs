use std::{path::Path, path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use remote_control::EndpointAddress;
use serde::Deserialize;

use crate::error::SettingsError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VisualiserConfig {
    pub title: String,
    /// Suspension between loop ticks, in microseconds.
    pub tick_interval_us: u64,
    pub auto_add_default_plugins: bool,
    pub remote: Option<RemoteSettings>,
}

impl Default for VisualiserConfig {
    fn default() -> Self {
        Self {
            title: "Visualiser".to_string(),
            tick_interval_us: 1,
            auto_add_default_plugins: true,
            remote: None,
        }
    }
}

impl VisualiserConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(self.tick_interval_us)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// `host:port`, optionally prefixed with `tcp://`.
    pub bind: Option<String>,
    pub unix_socket: Option<PathBuf>,
}

impl RemoteSettings {
    /// The endpoint to serve on. A Unix socket wins over a TCP bind address.
    pub fn endpoint(&self) -> Result<Option<EndpointAddress>, SettingsError> {
        if let Some(endpoint) = self.unix_endpoint() {
            return Ok(Some(endpoint));
        }
        match &self.bind {
            Some(address) => address
                .parse()
                .map(Some)
                .map_err(|err| SettingsError::InvalidEndpoint {
                    address: address.clone(),
                    reason: format!("{err}"),
                }),
            None => Ok(None),
        }
    }

    #[cfg(unix)]
    fn unix_endpoint(&self) -> Option<EndpointAddress> {
        self.unix_socket.clone().map(EndpointAddress::Unix)
    }

    #[cfg(not(unix))]
    fn unix_endpoint(&self) -> Option<EndpointAddress> {
        None
    }
}

/// Loads settings from `path` (or an optional `visualiser.toml` in the working
/// directory) with `APP__*` environment variables layered on top.
pub fn load_settings(path: Option<&Path>) -> Result<VisualiserConfig, SettingsError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("visualiser").required(false),
    };
    let settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}
