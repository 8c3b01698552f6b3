//! Socket endpoint that bridges out-of-process clients onto an in-process queue.
//!
//! The endpoint runs on its own OS thread and only ever talks to the runtime
//! through a [`ClientQueue`]; it never touches runtime state directly.

use std::{
    fmt,
    net::{SocketAddr, TcpListener, TcpStream},
    path::PathBuf,
    str::FromStr,
    thread,
};

use crossbeam_channel::bounded;
use shared::{
    error::RemoteError,
    protocol::{RemoteRequest, RemoteResponse},
};
use tracing::{debug, error, info, warn};

use crate::{
    client::RemoteClient,
    error::TransportError,
    transport::{ClientQueue, ClientTransport, DuplexStream, JsonLines, StreamClient},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl FromStr for EndpointAddress {
    type Err = TransportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix://") {
            #[cfg(unix)]
            return Ok(Self::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err(TransportError::InvalidAddress(path.to_string()));
        }
        let addr = raw.strip_prefix("tcp://").unwrap_or(raw);
        addr.parse::<SocketAddr>()
            .map(Self::Tcp)
            .map_err(|_| TransportError::InvalidAddress(raw.to_string()))
    }
}

/// A running endpoint. The worker thread is detached; it stops with the process.
#[derive(Debug, Clone)]
pub struct BoundEndpoint {
    pub address: EndpointAddress,
}

/// Binds `address` on a new worker thread and blocks until the worker reports
/// that it is listening. The returned address carries the real port when `0`
/// was requested.
pub fn spawn_endpoint(
    address: EndpointAddress,
    queue: ClientQueue,
) -> Result<BoundEndpoint, TransportError> {
    let (started_tx, started_rx) = bounded::<Result<EndpointAddress, TransportError>>(1);

    thread::Builder::new()
        .name("remote-endpoint".into())
        .spawn(move || match bind(&address) {
            Ok(listener) => {
                let bound = listener.local_address();
                if started_tx.send(Ok(bound.clone())).is_err() {
                    return;
                }
                info!(endpoint = %bound, "remote endpoint listening");
                serve_connections(listener, queue);
            }
            Err(err) => {
                let _ = started_tx.send(Err(err));
            }
        })?;

    let address = started_rx
        .recv()
        .map_err(|_| TransportError::Disconnected)??;
    Ok(BoundEndpoint { address })
}

/// Opens a client connection to a running endpoint.
pub fn connect(
    address: &EndpointAddress,
) -> Result<RemoteClient<Box<dyn ClientTransport + Send>>, TransportError> {
    let transport: Box<dyn ClientTransport + Send> = match address {
        EndpointAddress::Tcp(addr) => Box::new(StreamClient::new(TcpStream::connect(addr)?)?),
        #[cfg(unix)]
        EndpointAddress::Unix(path) => Box::new(StreamClient::new(
            std::os::unix::net::UnixStream::connect(path)?,
        )?),
    };
    Ok(RemoteClient::new(transport))
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixListener, PathBuf),
}

impl Listener {
    fn local_address(&self) -> EndpointAddress {
        match self {
            Self::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => EndpointAddress::Tcp(addr),
                Err(_) => EndpointAddress::Tcp(SocketAddr::from(([127, 0, 0, 1], 0))),
            },
            #[cfg(unix)]
            Self::Unix(_, path) => EndpointAddress::Unix(path.clone()),
        }
    }
}

fn bind(address: &EndpointAddress) -> Result<Listener, TransportError> {
    match address {
        EndpointAddress::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr)?)),
        #[cfg(unix)]
        EndpointAddress::Unix(path) => {
            remove_stale_socket(path);
            let listener = std::os::unix::net::UnixListener::bind(path)?;
            Ok(Listener::Unix(listener, path.clone()))
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            if let Err(err) = std::fs::remove_file(path) {
                error!(path = %path.display(), %err, "unable to remove stale unix socket");
            }
        }
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            error!(path = %path.display(), %err, "unable to check for stale unix socket");
        }
    }
}

fn serve_connections(listener: Listener, mut queue: ClientQueue) {
    let mut exited = false;
    match listener {
        Listener::Tcp(listener) => {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => serve_stream(stream, &mut queue, &mut exited),
                    Err(err) => warn!(%err, "failed to accept remote connection"),
                }
            }
        }
        #[cfg(unix)]
        Listener::Unix(listener, _) => {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => serve_stream(stream, &mut queue, &mut exited),
                    Err(err) => warn!(%err, "failed to accept remote connection"),
                }
            }
        }
    }
}

/// Serves one connection until it closes. Requests are forwarded one at a time.
fn serve_stream<S: DuplexStream>(stream: S, queue: &mut ClientQueue, exited: &mut bool) {
    let mut frames = match JsonLines::new(stream) {
        Ok(frames) => frames,
        Err(err) => {
            error!(%err, "failed to prepare remote connection");
            return;
        }
    };
    debug!("remote client connected");

    loop {
        let response = match frames.read_frame::<RemoteRequest>() {
            Ok(None) => break,
            Ok(Some(_)) if *exited => RemoteResponse::Exiting,
            Ok(Some(request)) => forward(queue, request, exited),
            Err(TransportError::Malformed(err)) => RemoteResponse::CarriedError(
                RemoteError::invalid_arguments(format!("malformed request frame: {err}")),
            ),
            Err(err) => {
                warn!(%err, "remote connection failed");
                break;
            }
        };
        if let Err(err) = frames.write_frame(&response) {
            warn!(%err, "failed to write remote response");
            break;
        }
    }
    debug!("remote client disconnected");
}

fn forward(queue: &mut ClientQueue, request: RemoteRequest, exited: &mut bool) -> RemoteResponse {
    let outcome = queue
        .send_request(request)
        .and_then(|()| queue.recv_response());
    match outcome {
        Ok(RemoteResponse::Exiting) | Err(TransportError::Disconnected) => {
            *exited = true;
            RemoteResponse::Exiting
        }
        Ok(response) => response,
        Err(err) => RemoteResponse::CarriedError(RemoteError::internal(err.to_string())),
    }
}
