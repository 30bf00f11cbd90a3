//! Proxy module for ingesting and checking proxies
//!
//! This module provides functionality for:
//! - Fetching and normalizing proxy lists into a backlog
//! - Probing proxies through one or more test targets
//! - Retrying failed probes with bounded exponential backoff
//! - Admitting probes under a global concurrency cap
//! - Aggregating working and failed proxies for output and progress

pub mod aggregator;
pub mod dialer;
pub mod geo;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod probe;
pub mod retry;
pub mod scheduler;

pub use aggregator::{AggregateState, ProgressSnapshot, ResultAggregator};
pub use dialer::{ProxyDialer, ReqwestDialer, TargetResponse, Transport};
pub use geo::GeoLocator;
pub use ingest::{FetcherConfig, ProxySource, SourceFetcher};
pub use models::{
    FailureKind, FailureRecord, ProbeMetadata, ProbeOutcome, ProxyAddress, ProxyScheme,
    WorkingProxy,
};
pub use parser::{ParseOptions, ProxyParser};
pub use probe::{Probe, ProbeExecutor, StatusRule, SuccessPredicate};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::AdmissionScheduler;
