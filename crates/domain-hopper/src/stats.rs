//! Atomic hop counters.
//!
//! Monotonic display counters; all atomics use `Relaxed` ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::sequencer::NavigationKind;

#[derive(Default)]
struct StatsInner {
    hops: AtomicU64,
    chained: AtomicU64,
    finalized: AtomicU64,
    failed: AtomicU64,
}

/// Thread-safe hop statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct HopStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current stats values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hops: u64,
    pub chained: u64,
    pub finalized: u64,
    pub failed: u64,
}

impl HopStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_hops(&self) {
        self.inner.hops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_navigation(&self, kind: NavigationKind) {
        let counter = match kind {
            NavigationKind::Chain { .. } => &self.inner.chained,
            NavigationKind::Final => &self.inner.finalized,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hops: self.inner.hops.load(Ordering::Relaxed),
            chained: self.inner.chained.load(Ordering::Relaxed),
            finalized: self.inner.finalized.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}
