//! Strand Server - TCP ingestion for the Strand graph store
//!
//! Clients send `CREATE` queries as newline-terminated lines and receive
//! one JSON [`strand_core::QueryResponse`] line per query. Connections are
//! read concurrently; execution goes through a bounded queue drained by a
//! single worker.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod listener;
pub mod queue;

pub use config::Config;
pub use error::{Result, ServerError};
pub use listener::IngestServer;
pub use queue::{QueueError, WorkError, WorkQueue, Worker, WorkerStats};

use std::sync::Arc;
use strand_core::StorageEngine;
use tracing::info;

/// Open the database and make sure the configured collection exists
pub async fn open_engine(config: &Config) -> Result<Arc<StorageEngine>> {
    let engine = StorageEngine::open(&config.data_dir, config.engine_options()).await?;
    if !engine.collection_exists(&config.collection).await {
        match engine.create_collection(&config.collection).await {
            Ok(()) => info!(collection = %config.collection, "Created collection"),
            Err(strand_core::Error::CollectionExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Arc::new(engine))
}
