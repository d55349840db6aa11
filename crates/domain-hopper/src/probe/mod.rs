//! Availability probing for a pool of candidate domains.
//!
//! Every domain in a pool is probed concurrently, each bounded by the pool
//! document's timeout. The round waits for every probe to settle or time out,
//! then selects the first available domain in declared order. Completion order
//! never affects the choice.

pub mod http;
pub mod policy;

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use crate::pools::Pool;
use crate::progress::{DomainStatus, HopEvent, ProgressSink};
use policy::ReachabilityPolicy;

/// How a probe ended, when it ended before the timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Responded { status: u16 },
    Failed { error: String },
}

/// Tagged per-domain result of a probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
}

/// A reachability check against one domain.
///
/// Implementations only report how the request settled; the timeout and the
/// reachability policy are applied by [`Prober`].
pub trait Probe: Send + Sync {
    fn probe(&self, domain: &str) -> impl Future<Output = Settlement> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResult {
    pub domain: String,
    pub availability: Availability,
    pub latency: Duration,
}

/// Results of one probe round, in the pool's declared domain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRound {
    pub results: Vec<DomainResult>,
}

impl ProbeRound {
    /// Lowest-index available domain.
    pub fn first_available(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.availability == Availability::Available)
            .map(|r| r.domain.as_str())
    }

    pub fn available_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.availability == Availability::Available)
            .count()
    }
}

/// Runs probe rounds with a fixed per-domain timeout and policy.
pub struct Prober<'a, P> {
    probe: &'a P,
    timeout: Duration,
    policy: ReachabilityPolicy,
}

impl<'a, P: Probe> Prober<'a, P> {
    pub fn new(probe: &'a P, timeout: Duration, policy: ReachabilityPolicy) -> Self {
        Self {
            probe,
            timeout,
            policy,
        }
    }

    /// Probe every domain of `pool` and wait for all of them.
    pub async fn probe_pool(&self, pool: &Pool, sink: &dyn ProgressSink) -> ProbeRound {
        let span = hop_tracing::pool_probe_span!(pool.name, pool.domains.len());

        async {
            for domain in &pool.domains {
                sink.emit(HopEvent::DomainStatus {
                    pool: pool.name.clone(),
                    domain: domain.clone(),
                    status: DomainStatus::Testing,
                });
            }

            let results = join_all(pool.domains.iter().map(|d| self.check(d))).await;

            for result in &results {
                let status = match result.availability {
                    Availability::Available => DomainStatus::Available,
                    Availability::Unavailable => DomainStatus::Unavailable,
                };
                sink.emit(HopEvent::DomainStatus {
                    pool: pool.name.clone(),
                    domain: result.domain.clone(),
                    status,
                });
            }

            let round = ProbeRound { results };
            let span = tracing::Span::current();
            span.record("available", round.available_count());
            if let Some(selected) = round.first_available() {
                span.record("selected", selected);
            }
            round
        }
        .instrument(span)
        .await
    }

    async fn check(&self, domain: &str) -> DomainResult {
        let span = hop_tracing::domain_probe_span!(domain);
        let start = Instant::now();

        async {
            let availability = match tokio::time::timeout(self.timeout, self.probe.probe(domain)).await {
                Ok(settlement) => {
                    tracing::debug!(settlement = ?settlement, "Probe settled");
                    self.policy.judge(&settlement)
                }
                Err(_) => {
                    tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Probe timed out");
                    Availability::Unavailable
                }
            };

            let latency = start.elapsed();
            let span = tracing::Span::current();
            span.record("available", availability == Availability::Available);
            span.record("latency_ms", latency.as_millis() as u64);

            DomainResult {
                domain: domain.to_string(),
                availability,
                latency,
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-process probe.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{Probe, Settlement};

    /// Answers each domain after a fixed delay. Unknown domains never settle.
    #[derive(Default)]
    pub struct ScriptedProbe {
        script: HashMap<String, (Duration, Settlement)>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, domain: &str, after_ms: u64, status: u16) -> Self {
            self.script.insert(
                domain.to_string(),
                (Duration::from_millis(after_ms), Settlement::Responded { status }),
            );
            self
        }

        pub fn fail(mut self, domain: &str, after_ms: u64) -> Self {
            self.script.insert(
                domain.to_string(),
                (
                    Duration::from_millis(after_ms),
                    Settlement::Failed {
                        error: "connection refused".to_string(),
                    },
                ),
            );
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Probe for ScriptedProbe {
        async fn probe(&self, domain: &str) -> Settlement {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(domain) {
                Some((delay, settlement)) => {
                    tokio::time::sleep(*delay).await;
                    settlement.clone()
                }
                None => std::future::pending().await,
            }
        }
    }
}
