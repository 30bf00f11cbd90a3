//! Proxy Sift - bounded-concurrency proxy checker
//!
//! Fetches proxy lists, probes every proxy through one or more test targets
//! with a global cap on in-flight checks, retries failures with capped
//! exponential backoff, and writes out the proxies that work.

pub mod config;
pub mod error;
pub mod output;
pub mod progress;
pub mod proxy;
pub mod runner;
pub mod tui;

pub use config::{CheckerConfig, ConfigOverrides, FileConfig};
pub use error::{ConfigError, DialError, IngestError, OutputError, RequestError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
