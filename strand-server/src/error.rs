//! Server errors

use crate::config::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] strand_core::Error),

    #[error(transparent)]
    Protocol(#[from] strand_protocol::ProtocolError),
}
