use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use shared::{
    domain::{PluginState, PluginSummary},
    protocol::{Operation, RemoteRequest, RemoteResponse},
};
use tracing::{trace, warn};

use crate::{
    error::{RemoteCallError, TransportError},
    transport::ClientTransport,
};

/// Client side of the channel. Once the server announces its exit (or the
/// channel drops) every further call fails fast without touching the transport.
pub struct RemoteClient<T> {
    transport: T,
    exited: bool,
    awaiting_response: bool,
}

impl<T: ClientTransport> RemoteClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            exited: false,
            awaiting_response: false,
        }
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Sends one request and waits for its response.
    pub fn request(&mut self, request: RemoteRequest) -> Result<Value, RemoteCallError> {
        self.send(request)?;
        self.receive()
    }

    pub fn method_call(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RemoteCallError> {
        self.request(RemoteRequest::method_call(name, args))
    }

    pub fn method_call_with_kwargs(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RemoteCallError> {
        self.request(RemoteRequest::method_call_with_kwargs(name, args, kwargs))
    }

    /// Sends a method call without waiting. The matching response must be
    /// collected with [`RemoteClient::receive`] before the next request; until
    /// then every send fails with [`RemoteCallError::ResponsePending`].
    pub fn method_call_nowait(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<(), RemoteCallError> {
        self.send(RemoteRequest::method_call(name, args))
    }

    pub fn attribute_access(&mut self, name: &str) -> Result<Value, RemoteCallError> {
        self.request(RemoteRequest::attribute_access(name))
    }

    pub fn receive(&mut self) -> Result<Value, RemoteCallError> {
        if self.exited {
            return Err(RemoteCallError::Exited);
        }
        self.awaiting_response = false;
        let response = match self.transport.recv_response() {
            Ok(response) => response,
            Err(err) => {
                if err.is_disconnect() {
                    self.exited = true;
                }
                return Err(err.into());
            }
        };
        match response {
            RemoteResponse::Value(value) => Ok(value),
            RemoteResponse::CarriedError(err) => Err(RemoteCallError::Carried(err)),
            RemoteResponse::Exiting => {
                warn!("remote visualiser announced exit");
                self.exited = true;
                Err(RemoteCallError::Exited)
            }
        }
    }

    /// Liveness as reported by the server, or `false` once exited.
    pub fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        self.alive().unwrap_or(false)
    }

    pub fn alive(&mut self) -> Result<bool, RemoteCallError> {
        self.read(Operation::Alive)
    }

    pub fn title(&mut self) -> Result<String, RemoteCallError> {
        self.read(Operation::Title)
    }

    pub fn plugins(&mut self) -> Result<Vec<PluginSummary>, RemoteCallError> {
        self.read(Operation::Plugins)
    }

    pub fn current_help(&mut self) -> Result<String, RemoteCallError> {
        self.read(Operation::CurrentHelp)
    }

    pub fn modal_depth(&mut self) -> Result<usize, RemoteCallError> {
        self.read(Operation::ModalDepth)
    }

    pub fn plugin_state(&mut self, plugin: &str) -> Result<PluginState, RemoteCallError> {
        self.invoke(Operation::PluginState, vec![json!(plugin)])
    }

    pub fn toggle_plugin(&mut self, plugin: &str) -> Result<PluginState, RemoteCallError> {
        self.invoke(Operation::TogglePlugin, vec![json!(plugin)])
    }

    /// Feeds a key press through the remote dispatcher. Returns whether any
    /// binding matched.
    pub fn press_key(&mut self, key: &str) -> Result<bool, RemoteCallError> {
        self.invoke(Operation::PressKey, vec![json!(key)])
    }

    /// Asks the remote visualiser to close. Already being closed counts as done.
    pub fn close(&mut self) -> Result<(), RemoteCallError> {
        match self.invoke::<Value>(Operation::Close, Vec::new()) {
            Ok(_) | Err(RemoteCallError::Exited) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn send(&mut self, request: RemoteRequest) -> Result<(), RemoteCallError> {
        if self.exited {
            return Err(RemoteCallError::Exited);
        }
        if self.awaiting_response {
            return Err(RemoteCallError::ResponsePending);
        }
        self.observe_unsolicited()?;
        trace!(request = request.name(), "sending remote request");
        if let Err(err) = self.transport.send_request(request) {
            if err.is_disconnect() {
                self.exited = true;
            }
            return Err(err.into());
        }
        self.awaiting_response = true;
        Ok(())
    }

    /// With nothing in flight, the only response that can already be waiting is
    /// the exit announcement.
    fn observe_unsolicited(&mut self) -> Result<(), RemoteCallError> {
        match self.transport.try_recv_response() {
            Ok(None) => Ok(()),
            Ok(Some(RemoteResponse::Exiting)) | Err(TransportError::Disconnected) => {
                self.exited = true;
                Err(RemoteCallError::Exited)
            }
            Ok(Some(other)) => {
                warn!(response = ?other, "discarding unsolicited remote response");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read<R: DeserializeOwned>(&mut self, op: Operation) -> Result<R, RemoteCallError> {
        let value = self.attribute_access(op.name())?;
        serde_json::from_value(value).map_err(RemoteCallError::Decode)
    }

    fn invoke<R: DeserializeOwned>(
        &mut self,
        op: Operation,
        args: Vec<Value>,
    ) -> Result<R, RemoteCallError> {
        let value = self.method_call(op.name(), args)?;
        serde_json::from_value(value).map_err(RemoteCallError::Decode)
    }
}
