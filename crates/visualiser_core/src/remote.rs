//! Serving the remote-control channel from inside the loop.

use std::{
    cell::{Cell, RefCell},
    io,
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use crossbeam_channel::{bounded, Sender};
use remote_control::{
    queue_pair, spawn_endpoint, BoundEndpoint, ClientQueue, EndpointAddress, RemoteClient,
    RemoteServer, ServerQueue,
};
use serde_json::{json, Value};
use shared::{
    error::{ErrorCode, RemoteError},
    protocol::Operation,
    surface::{CallArgs, RemoteSurface},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::HeadlessBackend,
    config::VisualiserConfig,
    datasource::DataSource,
    error::{ConfigurationError, PluginInitialisationError, VisualiserError},
    hooks::HookId,
    visualiser::Visualiser,
};

pub const REMOTE_CONTROL: &str = "remote_control";

static NEXT_CHANNEL: AtomicUsize = AtomicUsize::new(0);

impl RemoteSurface for Visualiser {
    fn call_method(&mut self, name: &str, args: &CallArgs) -> Result<Value, RemoteError> {
        let op = match Operation::from_name(name) {
            Some(op) if !op.is_attribute() => op,
            Some(op) => {
                return Err(RemoteError::invalid_arguments(format!(
                    "'{}' is an attribute and must be read, not called",
                    op.name()
                )))
            }
            None => return Err(RemoteError::unknown_method(name)),
        };
        match op {
            Operation::PluginState => {
                let plugin: String = args.get(0, "name")?;
                let handle = self.plugin(&plugin).map_err(configuration_error)?;
                Ok(json!(handle.state()))
            }
            Operation::TogglePlugin => {
                let plugin: String = args.get(0, "name")?;
                let state = self.toggle_plugin(&plugin).map_err(visualiser_error)?;
                Ok(json!(state))
            }
            Operation::PressKey => {
                let key: String = args.get(0, "key")?;
                Ok(json!(self.press_key(&key)))
            }
            Operation::Close => {
                self.request_close();
                Ok(Value::Null)
            }
            other => Err(RemoteError::unknown_method(other.name())),
        }
    }

    fn read_attribute(&mut self, name: &str) -> Result<Value, RemoteError> {
        let Some(op) = Operation::from_name(name).filter(|op| op.is_attribute()) else {
            return Err(RemoteError::unknown_attribute(name));
        };
        match op {
            Operation::Alive => Ok(json!(self.is_alive())),
            Operation::Title => Ok(json!(self.title())),
            Operation::Plugins => {
                let summaries: Vec<_> = self.plugins().iter().map(|p| p.summary()).collect();
                serde_json::to_value(summaries)
                    .map_err(|err| RemoteError::internal(err.to_string()))
            }
            Operation::CurrentHelp => Ok(json!(self.current_help())),
            Operation::ModalDepth => Ok(json!(self.modal_depth())),
            other => Err(RemoteError::unknown_attribute(other.name())),
        }
    }
}

fn configuration_error(err: ConfigurationError) -> RemoteError {
    let code = match err {
        ConfigurationError::UnknownPlugin { .. } => ErrorCode::NotFound,
        _ => ErrorCode::Configuration,
    };
    RemoteError::new(code, err.to_string())
}

fn visualiser_error(err: VisualiserError) -> RemoteError {
    match err {
        VisualiserError::Configuration(err) => configuration_error(err),
        other => RemoteError::internal(other.to_string()),
    }
}

/// Data source answering remote requests on the loop thread. Either fed by an
/// in-process queue or by a socket endpoint it binds itself.
pub struct RemoteControlSource {
    queue: Option<ServerQueue>,
    endpoint: Option<EndpointAddress>,
    report_to: Option<Sender<EndpointAddress>>,
    bound: Option<BoundEndpoint>,
}

impl RemoteControlSource {
    pub fn new(queue: ServerQueue) -> Self {
        Self {
            queue: Some(queue),
            endpoint: None,
            report_to: None,
            bound: None,
        }
    }

    /// Binds `address` on construction. Port 0 picks a free TCP port.
    pub fn listening(address: EndpointAddress) -> Self {
        Self {
            queue: None,
            endpoint: Some(address),
            report_to: None,
            bound: None,
        }
    }

    /// Sends the bound address once the endpoint is up.
    pub fn report_address_to(mut self, report_to: Sender<EndpointAddress>) -> Self {
        self.report_to = Some(report_to);
        self
    }

    pub fn bound_address(&self) -> Option<&EndpointAddress> {
        self.bound.as_ref().map(|bound| &bound.address)
    }

    fn take_queue(&mut self) -> Result<ServerQueue, PluginInitialisationError> {
        if let Some(queue) = self.queue.take() {
            return Ok(queue);
        }
        let address = self.endpoint.clone().ok_or_else(|| {
            PluginInitialisationError::new(REMOTE_CONTROL, "already serving its channel")
        })?;
        let (client, server) = queue_pair();
        let bound = spawn_endpoint(address, client)
            .map_err(|err| PluginInitialisationError::new(REMOTE_CONTROL, err.to_string()))?;
        info!(endpoint = %bound.address, "remote control endpoint bound");
        if let Some(report_to) = &self.report_to {
            if report_to.send(bound.address.clone()).is_err() {
                debug!("nobody is waiting for the endpoint address");
            }
        }
        self.bound = Some(bound);
        Ok(server)
    }
}

impl DataSource for RemoteControlSource {
    fn name(&self) -> &str {
        REMOTE_CONTROL
    }

    fn construct(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let queue = self.take_queue()?;
        serve_on_loop(visualiser, queue);
        Ok(())
    }
}

fn serve_on_loop(visualiser: &Visualiser, queue: ServerQueue) {
    let (mut requests, responses) = queue.into_parts();
    let server = Rc::new(RefCell::new(RemoteServer::new(responses)));
    let exit_pending = Rc::new(Cell::new(false));

    let hook_id = HookId::named(format!(
        "{REMOTE_CONTROL}:{}",
        NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed)
    ));
    {
        let server = Rc::clone(&server);
        let exit_pending = Rc::clone(&exit_pending);
        visualiser
            .hooks()
            .application_closing
            .add_hook_with_id(hook_id, move || {
                // Busy means a request is being answered right now; the loop
                // task announces once that response is out.
                match server.try_borrow_mut() {
                    Ok(mut server) => match server.announce_exit() {
                        Err(err) if !err.is_disconnect() => return Err(err.into()),
                        _ => {}
                    },
                    Err(_) => exit_pending.set(true),
                }
                Ok(())
            });
    }

    let weak = visualiser.downgrade();
    let shutdown = visualiser.shutdown();
    visualiser.add_task(async move {
        loop {
            let request = tokio::select! {
                request = requests.next() => request,
                _ = shutdown.closed() => None,
            };
            let Some(request) = request else {
                break;
            };
            let Some(mut surface) = weak.upgrade() else {
                break;
            };
            if let Err(err) = server.borrow_mut().respond(&mut surface, request) {
                warn!(error = %err, "failed to push remote response");
            }
            if exit_pending.replace(false) {
                if let Err(err) = server.borrow_mut().announce_exit() {
                    warn!(error = %err, "failed to announce remote exit");
                }
            }
        }
        debug!("remote control loop stopped");
    });
}

/// Starts a headless visualiser on its own thread, served over an in-process
/// queue pair. Blocks until it is initialised and returns a client for it.
pub fn spawn_visualiser_thread<F>(
    config: VisualiserConfig,
    setup: F,
) -> Result<RemoteClient<ClientQueue>, VisualiserError>
where
    F: FnOnce(&Visualiser) -> Result<(), ConfigurationError> + Send + 'static,
{
    let (client, server) = queue_pair();
    let (started_tx, started_rx) = bounded(1);
    thread::Builder::new()
        .name("visualiser".to_string())
        .spawn(move || {
            let (backend, _feed) = HeadlessBackend::new();
            let visualiser = Visualiser::new(config, backend);
            visualiser.register_datasource(RemoteControlSource::new(server));
            let started = setup(&visualiser).and_then(|()| visualiser.initialise());
            let failed = started.is_err();
            if started_tx.send(started).is_err() || failed {
                return;
            }
            if let Err(err) = visualiser.run() {
                error!(error = %err, "visualiser thread stopped with an error");
            }
        })?;

    match started_rx.recv() {
        Ok(Ok(())) => Ok(RemoteClient::new(client)),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(io::Error::other("visualiser thread exited before starting").into()),
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
