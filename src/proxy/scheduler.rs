//! Bounded-concurrency admission of proxies into probe tasks.
//!
//! Each admitted address gets its own tokio task that holds a semaphore
//! permit from admission until its terminal outcome is recorded, so the
//! number of probes in flight never exceeds the capacity and a freed slot
//! wakes the admission loop immediately. Attempts for one address run
//! sequentially inside that one task.

use crate::proxy::aggregator::{AggregateState, ResultAggregator};
use crate::proxy::models::{FailureKind, ProbeOutcome, ProxyAddress};
use crate::proxy::probe::Probe;
use crate::proxy::retry::{RetryDecision, RetryPolicy};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-proxy record owned by the task driving that proxy.
///
/// The attempt counter lives with the caller so it survives a panicking probe.
#[derive(Debug)]
struct CheckState<'a> {
    address: ProxyAddress,
    attempts_made: &'a AtomicU32,
    last_outcome: Option<ProbeOutcome>,
}

impl<'a> CheckState<'a> {
    fn new(address: ProxyAddress, attempts_made: &'a AtomicU32) -> Self {
        Self {
            address,
            attempts_made,
            last_outcome: None,
        }
    }

    /// Probe until the policy calls the outcome terminal
    async fn drive<P: Probe + ?Sized>(mut self, probe: &P, policy: &RetryPolicy) -> Self {
        loop {
            let attempt = self.attempts_made.fetch_add(1, Ordering::Relaxed) + 1;
            let outcome = probe.probe(&self.address).await;
            debug!(
                proxy = %self.address,
                attempt,
                success = outcome.is_success(),
                "probe attempt finished"
            );

            match policy.decide(outcome, attempt) {
                RetryDecision::Terminal(outcome) => {
                    self.last_outcome = Some(outcome);
                    return self;
                }
                RetryDecision::Retry { delay } => {
                    debug!(proxy = %self.address, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Drives a backlog of proxies through a [`Probe`] with at most
/// `capacity` probes in flight.
pub struct AdmissionScheduler<P: ?Sized> {
    probe: Arc<P>,
    policy: RetryPolicy,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
}

impl<P: Probe + ?Sized + 'static> AdmissionScheduler<P> {
    pub fn new(probe: Arc<P>, policy: RetryPolicy) -> Self {
        Self {
            probe,
            policy,
            aggregator: Arc::new(ResultAggregator::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Record into an aggregator the caller also watches (progress display)
    pub fn with_aggregator(mut self, aggregator: Arc<ResultAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Stop admitting new proxies once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn aggregator(&self) -> Arc<ResultAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check every distinct address in `backlog` and return the final state.
    ///
    /// Admission follows backlog order; completion order is whatever the
    /// probes produce. A capacity of 0 is treated as 1.
    pub async fn run(&self, backlog: Vec<ProxyAddress>, capacity: usize) -> AggregateState {
        let backlog = distinct(backlog);
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        self.aggregator.set_total(backlog.len());
        if backlog.is_empty() {
            return self.aggregator.freeze();
        }
        info!(total = backlog.len(), capacity, "starting checks");

        let slots = Arc::new(Semaphore::new(capacity));
        let mut tasks = JoinSet::new();
        let mut pending = backlog.into_iter();
        let mut next = pending.next();

        while let Some(address) = next.take() {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let skipped = 1 + pending.len();
                    warn!(skipped, "run cancelled, no further proxies admitted");
                    self.aggregator.set_skipped(skipped);
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                    next = Some(address);
                }

                permit = Arc::clone(&slots).acquire_owned() => {
                    let Ok(permit) = permit else {
                        error!("admission semaphore closed");
                        self.aggregator.set_skipped(1 + pending.len());
                        break;
                    };
                    self.admit(&mut tasks, address, permit);
                    next = pending.next();
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let state = self.aggregator.freeze();
        info!(
            completed = state.completed_count,
            working = state.working_count(),
            failed = state.failed_count(),
            "checks finished"
        );
        state
    }

    fn admit(
        &self,
        tasks: &mut JoinSet<()>,
        address: ProxyAddress,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let probe = Arc::clone(&self.probe);
        let policy = self.policy;
        let aggregator = Arc::clone(&self.aggregator);
        aggregator.admitted();

        tasks.spawn(async move {
            let attempts_made = AtomicU32::new(0);
            let check = CheckState::new(address.clone(), &attempts_made);
            let outcome = match AssertUnwindSafe(check.drive(probe.as_ref(), &policy))
                .catch_unwind()
                .await
            {
                Ok(done) => done.last_outcome.unwrap_or_else(|| {
                    ProbeOutcome::failure(FailureKind::Unknown, "no attempt was made")
                }),
                Err(_) => ProbeOutcome::failure(FailureKind::Unknown, "probe panicked"),
            };
            let attempts = attempts_made.load(Ordering::Relaxed);

            aggregator.record(address, outcome, attempts);
            aggregator.released();
            drop(permit);
        });
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "probe task failed");
    }
}

/// First occurrence of each address, in order
fn distinct(backlog: Vec<ProxyAddress>) -> Vec<ProxyAddress> {
    let mut seen = HashSet::with_capacity(backlog.len());
    let before = backlog.len();
    let unique: Vec<ProxyAddress> = backlog
        .into_iter()
        .filter(|address| seen.insert(address.clone()))
        .collect();
    if unique.len() != before {
        warn!(
            duplicates = before - unique.len(),
            "dropped repeated addresses from backlog"
        );
    }
    unique
}
