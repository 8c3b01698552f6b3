use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RemoteRequest {
    MethodCall {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
    AttributeAccess {
        name: String,
    },
}

impl RemoteRequest {
    pub fn method_call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::MethodCall {
            name: name.into(),
            args,
            kwargs: Map::new(),
        }
    }

    pub fn method_call_with_kwargs(
        name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Self {
        Self::MethodCall {
            name: name.into(),
            args,
            kwargs,
        }
    }

    pub fn attribute_access(name: impl Into<String>) -> Self {
        Self::AttributeAccess { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::MethodCall { name, .. } | Self::AttributeAccess { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RemoteResponse {
    Value(Value),
    CarriedError(RemoteError),
    /// Pushed exactly once when the serving runtime shuts down.
    Exiting,
}

/// The closed set of operations a running visualiser exposes remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Alive,
    Title,
    Plugins,
    CurrentHelp,
    ModalDepth,
    PluginState,
    TogglePlugin,
    PressKey,
    Close,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Alive,
        Operation::Title,
        Operation::Plugins,
        Operation::CurrentHelp,
        Operation::ModalDepth,
        Operation::PluginState,
        Operation::TogglePlugin,
        Operation::PressKey,
        Operation::Close,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Title => "title",
            Self::Plugins => "plugins",
            Self::CurrentHelp => "current_help",
            Self::ModalDepth => "modal_depth",
            Self::PluginState => "plugin_state",
            Self::TogglePlugin => "toggle_plugin",
            Self::PressKey => "press_key",
            Self::Close => "close",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Attributes are read with `AttributeAccess`; everything else is a method.
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            Self::Alive | Self::Title | Self::Plugins | Self::CurrentHelp | Self::ModalDepth
        )
    }
}
