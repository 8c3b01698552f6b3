use shared::{
    protocol::{RemoteRequest, RemoteResponse},
    surface::{execute, RemoteSurface},
};
use tracing::{debug, trace, warn};

use crate::{
    error::TransportError,
    transport::{ResponseSink, ServerQueue, ServerTransport},
};

/// Server side of the channel: exactly one response for every request it pops,
/// and at most one exit announcement over its lifetime.
pub struct RemoteServer<T> {
    transport: T,
    served: u64,
    exit_announced: bool,
}

impl<T: ServerTransport> RemoteServer<T> {
    /// Pops one request (blocking), runs it and pushes its response.
    pub fn serve_next(&mut self, surface: &mut dyn RemoteSurface) -> Result<(), TransportError> {
        let request = self.transport.recv_request()?;
        self.respond(surface, request)
    }
}

impl<T: ResponseSink> RemoteServer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            served: 0,
            exit_announced: false,
        }
    }

    /// Runs an already popped request and pushes its response.
    pub fn respond(
        &mut self,
        surface: &mut dyn RemoteSurface,
        request: RemoteRequest,
    ) -> Result<(), TransportError> {
        if self.exit_announced {
            warn!(request = request.name(), "request received after exit announcement");
            return self.transport.send_response(RemoteResponse::Exiting);
        }
        trace!(request = request.name(), "serving remote request");
        let name = request.name().to_string();
        let response = execute(surface, request);
        if let RemoteResponse::CarriedError(err) = &response {
            debug!(request = %name, error = %err, "remote request failed; carrying error back");
        }
        self.transport.send_response(response)?;
        self.served += 1;
        Ok(())
    }

    /// Pushes the exiting sentinel. Returns `false` when it was already pushed.
    pub fn announce_exit(&mut self) -> Result<bool, TransportError> {
        if self.exit_announced {
            return Ok(false);
        }
        self.exit_announced = true;
        debug!(served = self.served, "announcing remote exit");
        self.transport.send_response(RemoteResponse::Exiting)?;
        Ok(true)
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn exit_announced(&self) -> bool {
        self.exit_announced
    }
}

impl RemoteServer<ServerQueue> {
    /// Awaits the next request on the loop thread without blocking it.
    pub async fn next_request(&mut self) -> Option<RemoteRequest> {
        self.transport.next_request().await
    }

    pub fn try_next_request(&mut self) -> Result<Option<RemoteRequest>, TransportError> {
        self.transport.try_next_request()
    }
}
