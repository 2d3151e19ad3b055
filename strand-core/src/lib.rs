//! Strand Core - record-store graph storage with a small creation language
//!
//! This crate provides:
//! - Fixed-width binary codecs for store headers and node, relationship,
//!   label, property, string and property-key records
//! - Append-only record stores, one set of files per collection
//! - A master catalog and the [`engine::StorageEngine`] facade
//! - A tokenizer and recursive-descent parser for `CREATE` statements
//! - [`executor::QueryExecutor`], which runs queries against a collection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  QueryExecutor (token tree walk)         │
//! └──────────────┬───────────────────────────┘
//!                │
//! ┌──────────────┴───────────────────────────┐
//! │  Lexer / Parser  →  TokenTree            │
//! └──────────────┬───────────────────────────┘
//!                │
//! ┌──────────────┴───────────────────────────┐
//! │  StorageEngine (catalog, locks, graph)   │
//! └──────────────┬───────────────────────────┘
//!                │
//! ┌──────────────┴───────────────────────────┐
//! │  RecordStore / RecordFile  →  codec      │
//! └──────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod catalog;
pub mod codec;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod query;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{EngineOptions, StorageEngine};
pub use error::{Error, Result};
pub use executor::{QueryExecutor, QueryResponse};
