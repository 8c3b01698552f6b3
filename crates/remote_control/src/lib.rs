//! Request/response remote control for a running visualiser.
//!
//! The protocol is strictly synchronous: a client pushes one request, the
//! server pops it, runs it against the live runtime and pushes exactly one
//! response. When the runtime shuts down the server pushes a single exiting
//! sentinel, after which clients fail fast instead of hanging.

mod client;
mod endpoint;
pub mod error;
mod server;
pub mod transport;

pub use client::RemoteClient;
pub use endpoint::{connect, spawn_endpoint, BoundEndpoint, EndpointAddress};
pub use error::{RemoteCallError, TransportError};
pub use server::RemoteServer;
pub use transport::{
    queue_pair, ClientQueue, ClientTransport, RequestReceiver, ResponseSender, ResponseSink,
    ServerQueue, ServerTransport,
};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
