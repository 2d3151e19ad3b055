//! TCP ingestion
//!
//! The accept loop hands each connection to its own task. A connection's
//! reader splits the byte stream into query lines and enqueues them on the
//! shared [`WorkQueue`]; its writer sends the responses back, one JSON line
//! per query, in the order the queries arrived.

use crate::config::Config;
use crate::error::Result;
use crate::queue::{QueueError, WorkError, WorkQueue, WorkerStats};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use strand_core::{QueryExecutor, QueryResponse, StorageEngine};
use strand_protocol::{Frame, LineCodec};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Responses one connection may have outstanding before its reader waits
const MAX_PENDING_RESPONSES: usize = 32;

type PendingResponse = oneshot::Receiver<QueryResponse>;

/// Bound listener plus everything needed to serve it
pub struct IngestServer {
    listener: TcpListener,
    engine: Arc<StorageEngine>,
    config: Config,
    cancel: CancellationToken,
}

impl IngestServer {
    /// Bind the configured address; nothing is accepted until [`run`](Self::run)
    pub async fn bind(
        config: Config,
        engine: Arc<StorageEngine>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let listener = listen(config.addr(), config.backlog)?;
        info!(
            addr = %listener.local_addr()?,
            backlog = config.backlog,
            collection = %config.collection,
            "Listening"
        );

        Ok(Self {
            listener,
            engine,
            config,
            cancel,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the cancellation token fires
    ///
    /// Returns once every connection and the worker have stopped.
    pub async fn run(self) -> Result<WorkerStats> {
        let (queue, worker) = WorkQueue::new(self.config.queue_capacity, self.cancel.clone());
        let worker = tokio::spawn(worker.run());
        let slots = Arc::new(Semaphore::new(self.config.max_connections));
        let mut connections = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };
            debug!(%peer, "Connection accepted");

            let connection = Connection {
                peer,
                executor: QueryExecutor::new(self.engine.clone(), self.config.collection.clone())
                    .with_separator(self.config.separator),
                queue: queue.clone(),
                cancel: self.cancel.clone(),
            };
            let codec = LineCodec::with_max_length(self.config.max_frame_length);
            let read_buffer_size = self.config.read_buffer_size;
            connections.spawn(async move {
                let _permit = permit;
                (peer, connection.serve(stream, codec, read_buffer_size).await)
            });

            while let Some(finished) = connections.try_join_next() {
                log_finished(finished);
            }
        }

        info!(open = connections.len(), "Shutting down");
        drop(queue);
        while let Some(finished) = connections.join_next().await {
            log_finished(finished);
        }

        match worker.await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                error!(error = %e, "Worker task failed");
                Ok(WorkerStats::default())
            }
        }
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

fn log_finished(finished: std::result::Result<(SocketAddr, Result<u64>), JoinError>) {
    match finished {
        Ok((peer, Ok(queries))) => debug!(%peer, queries, "Connection closed"),
        Ok((peer, Err(e))) => warn!(%peer, error = %e, "Connection failed"),
        Err(e) if e.is_panic() => error!("Connection task panicked"),
        Err(_) => {}
    }
}

/// Per-connection state; the executor is not shared with other connections
struct Connection {
    peer: SocketAddr,
    executor: QueryExecutor,
    queue: WorkQueue,
    cancel: CancellationToken,
}

impl Connection {
    /// Read queries until the peer closes or the server shuts down, then
    /// wait for the outstanding responses to be written
    async fn serve(self, stream: TcpStream, codec: LineCodec, read_buffer_size: usize) -> Result<u64> {
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        let mut frames = FramedRead::with_capacity(read, codec, read_buffer_size);
        let (pending_tx, pending_rx) = mpsc::channel(MAX_PENDING_RESPONSES);
        let writer = tokio::spawn(write_responses(write, pending_rx, self.cancel.clone()));
        let mut queries = 0u64;

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                frame = frames.next() => frame,
            };

            let (reply, pending) = oneshot::channel();
            match frame {
                None => break,
                Some(Err(e)) => {
                    debug!(peer = %self.peer, error = %e, "Read failed");
                    break;
                }
                Some(Ok(Frame::Rejected(e))) => {
                    debug!(peer = %self.peer, error = %e, "Frame rejected");
                    let _ = reply.send(QueryResponse::failure(e.code(), e.to_string()));
                }
                Some(Ok(Frame::Text(mut query))) => {
                    queries += 1;
                    // The line break that ended the frame also ends the statement
                    if self.executor.separator().newline() {
                        query.push('\n');
                    }
                    if let Err(e) = self.submit(query, reply).await {
                        debug!(peer = %self.peer, error = %e, "Query not queued");
                        break;
                    }
                }
            }

            if pending_tx.send(pending).await.is_err() {
                break;
            }
        }

        drop(pending_tx);
        match writer.await {
            Ok(written) => written?,
            Err(e) => warn!(peer = %self.peer, error = %e, "Response writer failed"),
        }
        Ok(queries)
    }

    async fn submit(
        &self,
        query: String,
        reply: oneshot::Sender<QueryResponse>,
    ) -> std::result::Result<(), QueueError> {
        let executor = self.executor.clone();
        let peer = self.peer;
        self.queue
            .enqueue(move |_| async move {
                let response = executor.execute(&query).await;
                if !response.success {
                    debug!(
                        %peer,
                        code = response.code.as_deref().unwrap_or_default(),
                        message = %response.message,
                        "Query failed"
                    );
                }
                reply.send(response).map_err(|_| {
                    WorkError::Failed(anyhow::anyhow!(
                        "connection {} closed before its response was sent",
                        peer
                    ))
                })
            })
            .await
    }
}

async fn write_responses(
    write: OwnedWriteHalf,
    mut pending: mpsc::Receiver<PendingResponse>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sink = FramedWrite::new(write, LineCodec::new());
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = pending.recv() => next,
        };
        let Some(reply) = next else { break };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            response = reply => response.unwrap_or_else(|_| {
                QueryResponse::failure("INTERNAL", "Query was dropped before it ran")
            }),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sink.send(response.to_json()) => sent?,
        }
    }
    Ok(())
}
