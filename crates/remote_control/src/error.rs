use std::io;

use shared::error::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("remote channel disconnected")]
    Disconnected,
    #[error("remote channel i/o failure: {0}")]
    Io(#[from] io::Error),
    #[error("malformed remote frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid endpoint address '{0}'")]
    InvalidAddress(String),
}

impl TransportError {
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteCallError {
    /// The serving runtime announced its exit; no further request is sent.
    #[error("remote visualiser has exited")]
    Exited,
    /// A previous request is still waiting for its response.
    #[error("a remote response is still pending; receive it before sending again")]
    ResponsePending,
    #[error("remote call failed: {0}")]
    Carried(#[from] RemoteError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected value in remote response: {0}")]
    Decode(#[source] serde_json::Error),
}
