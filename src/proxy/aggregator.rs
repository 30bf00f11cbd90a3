//! Shared collection of terminal outcomes and progress counters.
//!
//! Every mutation of [`AggregateState`] goes through one mutex so the
//! completed counter and the working/failed collections always move
//! together. The in-flight count lives beside it in an atomic because it
//! changes on admission, not on completion.

use crate::proxy::models::{FailureKind, FailureRecord, ProbeOutcome, ProxyAddress, WorkingProxy};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Number of recent working/failed entries kept for live display
pub const MAX_RECENT: usize = 100;

/// Run-wide results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub total_queued: usize,
    pub completed_count: usize,
    /// In completion order
    pub working_proxies: Vec<WorkingProxy>,
    /// Keyed by address; the value is the last failure seen
    pub failed_proxies: BTreeMap<ProxyAddress, FailureRecord>,
    /// Entries never admitted because the run was cancelled
    pub skipped: usize,
}

impl AggregateState {
    pub fn working_count(&self) -> usize {
        self.working_proxies.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_proxies.len()
    }

    pub fn is_failed(&self, address: &ProxyAddress) -> bool {
        self.failed_proxies.contains_key(address)
    }

    pub fn is_working(&self, address: &ProxyAddress) -> bool {
        self.working_proxies.iter().any(|w| &w.address == address)
    }

    /// Count of failed proxies per failure kind, most frequent first
    pub fn failure_breakdown(&self) -> Vec<(FailureKind, usize)> {
        let mut counts: Vec<(FailureKind, usize)> = Vec::new();
        for record in self.failed_proxies.values() {
            match counts.iter_mut().find(|(kind, _)| *kind == record.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.kind, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}

/// Point-in-time view for progress rendering
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub in_flight: usize,
    pub working: usize,
    pub failed: usize,
    pub recent_working: Vec<WorkingProxy>,
    pub recent_failed: Vec<(ProxyAddress, FailureKind)>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: AggregateState,
    recorded: HashSet<ProxyAddress>,
    recent_failed: VecDeque<(ProxyAddress, FailureKind)>,
}

/// Single-writer interface over [`AggregateState`]
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // record() never panics mid-update, so a poisoned state is still whole.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_total(&self, total: usize) {
        self.lock().state.total_queued = total;
    }

    pub fn set_skipped(&self, skipped: usize) {
        self.lock().state.skipped = skipped;
    }

    pub fn admitted(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn released(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Record a terminal outcome. Returns `false` if the address already
    /// had one, in which case nothing changes.
    pub fn record(&self, address: ProxyAddress, outcome: ProbeOutcome, attempts: u32) -> bool {
        let mut inner = self.lock();
        if !inner.recorded.insert(address.clone()) {
            warn!(proxy = %address, "ignoring second terminal outcome");
            return false;
        }

        match outcome {
            ProbeOutcome::Success { metadata } => {
                inner.state.working_proxies.push(WorkingProxy { address, metadata });
            }
            ProbeOutcome::Failure { kind, message } => {
                inner.recent_failed.push_back((address.clone(), kind));
                if inner.recent_failed.len() > MAX_RECENT {
                    inner.recent_failed.pop_front();
                }
                inner.state.failed_proxies.insert(
                    address,
                    FailureRecord {
                        kind,
                        message,
                        attempts,
                    },
                );
            }
        }
        inner.state.completed_count += 1;
        true
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.lock();
        let working = &inner.state.working_proxies;
        ProgressSnapshot {
            total: inner.state.total_queued,
            completed: inner.state.completed_count,
            in_flight: self.in_flight(),
            working: working.len(),
            failed: inner.state.failed_proxies.len(),
            recent_working: working[working.len().saturating_sub(MAX_RECENT)..].to_vec(),
            recent_failed: inner.recent_failed.iter().cloned().collect(),
        }
    }

    /// Copy of the final state
    pub fn freeze(&self) -> AggregateState {
        self.lock().state.clone()
    }
}
