//! Server configuration

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use strand_core::EngineOptions;
use strand_core::codec::Endian;
use strand_core::query::StatementSeparator;
use strand_protocol::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT};
use thiserror::Error;

/// Configuration file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "config/strand.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Server configuration
///
/// Sources, lowest priority first: defaults, a TOML file, `STRAND_*`
/// environment variables, then command-line flags applied by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Pending connections the kernel queues before accept
    pub backlog: u32,
    pub max_connections: usize,
    /// Queries waiting for the worker before readers stall
    pub queue_capacity: usize,
    /// Initial read buffer per connection, in bytes
    pub read_buffer_size: usize,
    pub max_frame_length: usize,
    pub data_dir: PathBuf,
    /// Collection every query runs against
    pub collection: String,
    pub separator: StatementSeparator,
    /// Byte order for collections the server creates
    pub endian: Endian,
    /// `sync_data` after every append
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            backlog: 10,
            max_connections: 64,
            queue_capacity: 128,
            read_buffer_size: 4096,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            data_dir: PathBuf::from("./data"),
            collection: "default".to_string(),
            separator: StatementSeparator::Semicolon,
            endian: Endian::Little,
            sync_writes: false,
        }
    }
}

impl Config {
    /// Load a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults, overlaid with `config/strand.toml` when it exists
    pub fn from_default_file() -> Result<Self, ConfigError> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)
        } else {
            tracing::debug!("Config file not found: {}", DEFAULT_CONFIG_FILE);
            Ok(Self::default())
        }
    }

    /// Overlay `STRAND_*` environment variables
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(
            name: &'static str,
            value: String,
        ) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name, value })
        }

        if let Some(v) = var("STRAND_HOST") {
            self.host = parse("STRAND_HOST", v)?;
        }
        if let Some(v) = var("STRAND_PORT") {
            self.port = parse("STRAND_PORT", v)?;
        }
        if let Some(v) = var("STRAND_BACKLOG") {
            self.backlog = parse("STRAND_BACKLOG", v)?;
        }
        if let Some(v) = var("STRAND_MAX_CONNECTIONS") {
            self.max_connections = parse("STRAND_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = var("STRAND_QUEUE_CAPACITY") {
            self.queue_capacity = parse("STRAND_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = var("STRAND_READ_BUFFER_SIZE") {
            self.read_buffer_size = parse("STRAND_READ_BUFFER_SIZE", v)?;
        }
        if let Some(v) = var("STRAND_MAX_FRAME_LENGTH") {
            self.max_frame_length = parse("STRAND_MAX_FRAME_LENGTH", v)?;
        }
        if let Some(v) = var("STRAND_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("STRAND_COLLECTION") {
            self.collection = v;
        }
        if let Some(v) = var("STRAND_SEPARATOR") {
            self.separator = parse("STRAND_SEPARATOR", v)?;
        }
        if let Some(v) = var("STRAND_ENDIAN") {
            self.endian = parse("STRAND_ENDIAN", v)?;
        }
        if let Some(v) = var("STRAND_SYNC_WRITES") {
            self.sync_writes = parse("STRAND_SYNC_WRITES", v)?;
        }
        Ok(self)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("backlog", self.backlog as usize),
            ("max_connections", self.max_connections),
            ("queue_capacity", self.queue_capacity),
            ("read_buffer_size", self.read_buffer_size),
            ("max_frame_length", self.max_frame_length),
        ];
        match sizes.into_iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Zero(name)),
            None => Ok(()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::default()
            .with_endian(self.endian)
            .with_sync_writes(self.sync_writes)
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.host = addr.ip();
        self.port = addr.port();
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn with_separator(mut self, separator: StatementSeparator) -> Self {
        self.separator = separator;
        self
    }
}
