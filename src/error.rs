//! Typed errors for the fatal paths and the transport seam.
//!
//! Per-proxy failures are not errors: they travel as
//! [`ProbeOutcome::Failure`](crate::proxy::ProbeOutcome) values. The types
//! here cover configuration, list ingestion, output writing, and the two
//! transport-level failures the probe classifies.

use crate::proxy::models::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or unreadable configuration. Fatal before scheduling starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no proxy list sources configured")]
    NoSources,

    #[error("no test targets configured")]
    NoTestTargets,

    #[error("invalid accepted status rule: {0}")]
    InvalidStatusRule(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Failure to fetch or read a proxy list source. Aborts the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch {source_url}: {error}")]
    Fetch {
        source_url: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("source {source_url} answered with HTTP {status}")]
    Status { source_url: String, status: u16 },

    #[error("failed to read {path}: {error}")]
    File {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Failure to persist results.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} into place at {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The proxy transport could not be constructed.
#[derive(Debug, Clone, Error)]
#[error("cannot dial proxy {address}: {message}")]
pub struct DialError {
    pub address: String,
    pub message: String,
}

/// A request through an established transport failed.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RequestError {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
