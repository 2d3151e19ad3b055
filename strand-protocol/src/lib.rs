//! Strand Protocol - wire format and client for the ingestion server
//!
//! Queries and responses travel over plain TCP as newline-delimited UTF-8
//! frames: the client writes one query per line and the server answers
//! each with one line of JSON (a serialized [`strand_core::QueryResponse`]),
//! in the order the queries arrived.

#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod frame;

pub use client::QueryClient;
pub use error::{FrameError, ProtocolError, Result};
pub use frame::{DEFAULT_MAX_FRAME_LENGTH, Frame, LineCodec};

/// Port the server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 9898;
