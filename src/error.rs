//! Crate-level error types for the ambient layers (config, persistence, daemon
//! lifecycle). Decoder-internal parsing keeps the teacher crate's own idiom
//! of narrow, nom-flavored errors (see [`crate::decoder::DecodeError`]).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GixflowError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid local prefix {prefix:?}: {source}")]
    InvalidLocalPrefix {
        prefix: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("durable store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemonization failed: {0}")]
    Daemonize(String),
}

pub type Result<T> = std::result::Result<T, GixflowError>;
