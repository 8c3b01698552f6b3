//! One-directional request/response queues. Every transport carries the same
//! tagged frames, so the server step and the client do not care which one
//! they run over.

use std::{
    io::{self, BufRead, BufReader, Write},
    net::TcpStream,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{de::DeserializeOwned, Serialize};
use shared::protocol::{RemoteRequest, RemoteResponse};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;

pub trait ClientTransport {
    fn send_request(&mut self, request: RemoteRequest) -> Result<(), TransportError>;

    /// Blocks until the server pushes the next response.
    fn recv_response(&mut self) -> Result<RemoteResponse, TransportError>;

    /// Returns a response that is already waiting, without blocking. Transports
    /// that cannot peek report nothing.
    fn try_recv_response(&mut self) -> Result<Option<RemoteResponse>, TransportError> {
        Ok(None)
    }
}

pub trait ResponseSink {
    fn send_response(&mut self, response: RemoteResponse) -> Result<(), TransportError>;
}

pub trait ServerTransport: ResponseSink {
    /// Blocks until a client pushes the next request.
    fn recv_request(&mut self) -> Result<RemoteRequest, TransportError>;
}

impl<T: ClientTransport + ?Sized> ClientTransport for Box<T> {
    fn send_request(&mut self, request: RemoteRequest) -> Result<(), TransportError> {
        (**self).send_request(request)
    }

    fn recv_response(&mut self) -> Result<RemoteResponse, TransportError> {
        (**self).recv_response()
    }

    fn try_recv_response(&mut self) -> Result<Option<RemoteResponse>, TransportError> {
        (**self).try_recv_response()
    }
}

/// Creates an in-process queue pair. Requests travel over a tokio channel so the
/// cooperative loop can await them; responses travel over a crossbeam channel so
/// a plain OS thread can block on them.
pub fn queue_pair() -> (ClientQueue, ServerQueue) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = unbounded();
    (
        ClientQueue {
            requests: request_tx,
            responses: response_rx,
        },
        ServerQueue {
            requests: RequestReceiver(request_rx),
            responses: ResponseSender(response_tx),
        },
    )
}

#[derive(Debug)]
pub struct ClientQueue {
    requests: UnboundedSender<RemoteRequest>,
    responses: Receiver<RemoteResponse>,
}

impl ClientQueue {
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }
}

impl ClientTransport for ClientQueue {
    fn send_request(&mut self, request: RemoteRequest) -> Result<(), TransportError> {
        self.requests
            .send(request)
            .map_err(|_| TransportError::Disconnected)
    }

    fn recv_response(&mut self) -> Result<RemoteResponse, TransportError> {
        self.responses
            .recv()
            .map_err(|_| TransportError::Disconnected)
    }

    fn try_recv_response(&mut self) -> Result<Option<RemoteResponse>, TransportError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(TransportError::Disconnected)
            }
        }
    }
}

#[derive(Debug)]
pub struct ServerQueue {
    requests: RequestReceiver,
    responses: ResponseSender,
}

impl ServerQueue {
    /// Awaits the next request without blocking the loop thread. `None` once
    /// every client handle is gone.
    pub async fn next_request(&mut self) -> Option<RemoteRequest> {
        self.requests.next().await
    }

    pub fn try_next_request(&mut self) -> Result<Option<RemoteRequest>, TransportError> {
        self.requests.try_next()
    }

    /// Splits the queue so requests can be awaited while responses are pushed
    /// from elsewhere on the same thread.
    pub fn into_parts(self) -> (RequestReceiver, ResponseSender) {
        (self.requests, self.responses)
    }
}

impl ResponseSink for ServerQueue {
    fn send_response(&mut self, response: RemoteResponse) -> Result<(), TransportError> {
        self.responses.send_response(response)
    }
}

impl ServerTransport for ServerQueue {
    fn recv_request(&mut self) -> Result<RemoteRequest, TransportError> {
        self.requests
            .0
            .blocking_recv()
            .ok_or(TransportError::Disconnected)
    }
}

#[derive(Debug)]
pub struct RequestReceiver(UnboundedReceiver<RemoteRequest>);

impl RequestReceiver {
    pub async fn next(&mut self) -> Option<RemoteRequest> {
        self.0.recv().await
    }

    pub fn try_next(&mut self) -> Result<Option<RemoteRequest>, TransportError> {
        match self.0.try_recv() {
            Ok(request) => Ok(Some(request)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSender(Sender<RemoteResponse>);

impl ResponseSink for ResponseSender {
    fn send_response(&mut self, response: RemoteResponse) -> Result<(), TransportError> {
        self.0
            .send(response)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// A byte stream that can be split into an independent reader and writer.
pub trait DuplexStream: io::Read + Write + Send + Sized + 'static {
    fn try_clone_stream(&self) -> io::Result<Self>;
}

impl DuplexStream for TcpStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }
}

#[cfg(unix)]
impl DuplexStream for std::os::unix::net::UnixStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }
}

/// Newline-delimited JSON frames over a socket.
pub struct JsonLines<S: DuplexStream> {
    reader: BufReader<S>,
    writer: S,
    line: String,
}

impl<S: DuplexStream> JsonLines<S> {
    pub fn new(stream: S) -> io::Result<Self> {
        let reader = BufReader::new(stream.try_clone_stream()?);
        Ok(Self {
            reader,
            writer: stream,
            line: String::new(),
        })
    }

    pub fn write_frame<T: Serialize>(&mut self, frame: &T) -> Result<(), TransportError> {
        let mut encoded = serde_json::to_vec(frame)?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        Ok(())
    }

    /// `Ok(None)` on a clean end of stream.
    pub fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line)?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(trimmed)?));
        }
    }
}

pub struct StreamClient<S: DuplexStream> {
    frames: JsonLines<S>,
}

impl<S: DuplexStream> StreamClient<S> {
    pub fn new(stream: S) -> io::Result<Self> {
        Ok(Self {
            frames: JsonLines::new(stream)?,
        })
    }
}

impl<S: DuplexStream> ClientTransport for StreamClient<S> {
    fn send_request(&mut self, request: RemoteRequest) -> Result<(), TransportError> {
        self.frames.write_frame(&request)
    }

    fn recv_response(&mut self) -> Result<RemoteResponse, TransportError> {
        self.frames
            .read_frame()?
            .ok_or(TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_pair_carries_frames_in_both_directions() {
        let (mut client, mut server) = queue_pair();
        client
            .send_request(RemoteRequest::attribute_access("alive"))
            .expect("send request");
        assert_eq!(
            server.recv_request().expect("recv request"),
            RemoteRequest::attribute_access("alive")
        );
        server
            .send_response(RemoteResponse::Value(json!(true)))
            .expect("send response");
        assert_eq!(client.pending_responses(), 1);
        assert_eq!(
            client.recv_response().expect("recv response"),
            RemoteResponse::Value(json!(true))
        );
    }

    #[test]
    fn dropped_server_disconnects_client() {
        let (mut client, server) = queue_pair();
        drop(server);
        assert!(matches!(
            client.send_request(RemoteRequest::attribute_access("alive")),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            client.recv_response(),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn try_next_request_reports_empty_queue() {
        let (_client, mut server) = queue_pair();
        assert!(server.try_next_request().expect("still connected").is_none());
    }
}
