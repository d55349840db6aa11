//! Reachability policy: how a settled probe is judged.
//!
//! A cross-origin probe cannot tell a connection error apart from an opaque
//! response, so the historical behaviour counts any settlement as reachable.
//! That overstates availability; the stricter policies are opt-in.
//! The active policy is a lock-free atomic read on every hop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Availability, Settlement};

/// Rule mapping a probe settlement to availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ReachabilityPolicy {
    /// Any response or transport error before the timeout counts as available.
    #[default]
    AnySettled = 0,
    /// Any HTTP response counts; transport errors do not.
    AnyResponse = 1,
    /// Only 2xx and 3xx responses count.
    SuccessStatus = 2,
}

impl ReachabilityPolicy {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReachabilityPolicy::AnySettled,
            1 => ReachabilityPolicy::AnyResponse,
            2 => ReachabilityPolicy::SuccessStatus,
            _ => ReachabilityPolicy::AnySettled,
        }
    }

    pub fn judge(self, settlement: &Settlement) -> Availability {
        let available = match (self, settlement) {
            (ReachabilityPolicy::AnySettled, _) => true,
            (ReachabilityPolicy::AnyResponse, Settlement::Responded { .. }) => true,
            (ReachabilityPolicy::AnyResponse, Settlement::Failed { .. }) => false,
            (ReachabilityPolicy::SuccessStatus, Settlement::Responded { status }) => {
                (200..400).contains(status)
            }
            (ReachabilityPolicy::SuccessStatus, Settlement::Failed { .. }) => false,
        };

        if available {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

impl std::str::FromStr for ReachabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any-settled" => Ok(ReachabilityPolicy::AnySettled),
            "any-response" => Ok(ReachabilityPolicy::AnyResponse),
            "success-status" => Ok(ReachabilityPolicy::SuccessStatus),
            other => Err(format!(
                "invalid policy '{other}', expected: any-settled, any-response, or success-status"
            )),
        }
    }
}

/// Thread-safe runtime policy. Cheap to clone (Arc).
#[derive(Clone)]
pub struct RuntimePolicy {
    inner: Arc<AtomicU8>,
}

impl RuntimePolicy {
    pub fn new(policy: ReachabilityPolicy) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(policy as u8)),
        }
    }

    pub fn get(&self) -> ReachabilityPolicy {
        ReachabilityPolicy::from_u8(self.inner.load(Ordering::Relaxed))
    }

    pub fn set(&self, policy: ReachabilityPolicy) {
        self.inner.store(policy as u8, Ordering::Relaxed);
    }
}
