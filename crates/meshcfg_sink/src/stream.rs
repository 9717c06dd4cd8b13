//! Bidirectional resource stream abstraction and its TCP implementation.

use crate::error::{ProtocolError, StreamError};
use crate::protocol::{read_message, write_message, Message, OpCode};
use crate::types::{RequestResources, Resources};
use async_trait::async_trait;
use meshcfg_event::CancellationToken;
use std::net::SocketAddr;
use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Transport security details of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// e.g. `tls`
    pub auth_type: String,
    /// Verified identities (for TLS, the URI SANs of the client certificate).
    pub identities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub addr: SocketAddr,
    pub auth_info: Option<AuthInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    pub cancel: CancellationToken,
    pub peer: Option<Peer>,
}

/// Server side of a resource stream: receives pushes, sends requests.
#[async_trait]
pub trait ResourceStream: Send {
    fn context(&self) -> &StreamContext;

    /// [`StreamError::EndOfStream`] once the peer closed cleanly.
    async fn recv(&mut self) -> Result<Resources, StreamError>;

    async fn send(&mut self, request: RequestResources) -> Result<(), StreamError>;
}

pub struct TcpResourceStream {
    context: StreamContext,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl TcpResourceStream {
    /// Plain TCP carries no auth info.
    pub fn new(socket: TcpStream, addr: SocketAddr, cancel: CancellationToken) -> Self {
        let (read, write) = socket.into_split();
        Self {
            context: StreamContext {
                cancel,
                peer: Some(Peer {
                    addr,
                    auth_info: None,
                }),
            },
            reader: BufReader::new(read),
            writer: BufWriter::new(write),
        }
    }
}

#[async_trait]
impl ResourceStream for TcpResourceStream {
    fn context(&self) -> &StreamContext {
        &self.context
    }

    async fn recv(&mut self) -> Result<Resources, StreamError> {
        match read_message(&mut self.reader).await? {
            Some(msg) => Ok(msg.decode(OpCode::Resources)?),
            None => Err(StreamError::EndOfStream),
        }
    }

    async fn send(&mut self, request: RequestResources) -> Result<(), StreamError> {
        let msg = Message::json(OpCode::RequestResources, &request)?;
        write_message(&mut self.writer, &msg)
            .await
            .map_err(|e| match e {
                ProtocolError::IoError(io) => StreamError::Io(io),
                other => StreamError::Protocol(other),
            })
    }
}
