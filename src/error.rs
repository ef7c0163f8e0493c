/// Error types for the monitoring service.
///
/// Only startup and operator-facing failures surface as errors. Transport
/// failures are recovered inside `ingest` and parse failures inside
/// `reconcile`; neither reaches the daemon loop.

use thiserror::Error;

/// Errors raised while loading or validating `wxmon.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Classified failure of a single request to a telemetry server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("invalid JSON body: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Errors from operator actions on the daemon (term selection).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no terms available yet")]
    NoTerms,

    #[error("term index {index} out of range ({available} terms available)")]
    OutOfRange { index: usize, available: usize },
}

/// Failure to build the HTTP client at startup.
#[derive(Error, Debug)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[from] pub reqwest::Error);
