//! Async client for the ingestion server

use crate::error::{ProtocolError, Result};
use crate::frame::{Frame, LineCodec};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use strand_core::QueryResponse;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

/// Upper bound for one response line; graph payloads can be large
pub const MAX_RESPONSE_LENGTH: usize = 16 * 1024 * 1024;

/// One connection to a server
///
/// Responses arrive in the order the queries were sent, so several
/// queries may be sent before reading any response.
pub struct QueryClient {
    reader: FramedRead<OwnedReadHalf, LineCodec>,
    writer: FramedWrite<OwnedWriteHalf, LineCodec>,
    peer: SocketAddr,
}

impl QueryClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        debug!(%peer, "Connected");

        Ok(Self {
            reader: FramedRead::new(read, LineCodec::with_max_length(MAX_RESPONSE_LENGTH)),
            writer: FramedWrite::new(write, LineCodec::new()),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send a query and wait for its response
    pub async fn execute(&mut self, query: &str) -> Result<QueryResponse> {
        self.send(query).await?;
        self.recv().await
    }

    /// Send a query without waiting for the response
    ///
    /// The query must fit on one line.
    pub async fn send(&mut self, query: &str) -> Result<()> {
        self.writer.send(query).await
    }

    /// Write bytes to the connection as they are, with no framing
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.writer.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Next response from the server
    pub async fn recv(&mut self) -> Result<QueryResponse> {
        match self.reader.next().await {
            Some(Ok(Frame::Text(line))) => Ok(serde_json::from_str(&line)?),
            Some(Ok(Frame::Rejected(e))) => Err(e.into()),
            Some(Err(e)) => Err(e),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the sending side; responses to queries already sent can
    /// still be read
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.get_mut().shutdown().await?;
        Ok(())
    }
}
