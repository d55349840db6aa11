//! Hop sequencing: resolve one pool and decide where the visitor goes next.
//!
//! A hop starts at a pool index: `0` on the origin hop, or the `poolIndex`
//! carried in the URL on a continuation hop. The pool is probed; an
//! intermediate pool chains to the next index on a rotated subdomain, a target
//! pool ends the sequence with a final redirect. Nothing is shared between
//! hops except the index in the redirect URL.

use serde::Serialize;

use crate::pools::{PoolKind, PoolsError, SequenceConfig};
use crate::probe::{Probe, Prober};
use crate::progress::{HopEvent, ProgressSink};
use crate::subdomain;

/// Every way a hop can terminate without navigating.
#[derive(Debug, thiserror::Error)]
pub enum HopError {
    #[error("failed to load pool configuration: {0}")]
    ConfigLoad(#[from] PoolsError),

    #[error("no available domain in pool '{pool}'")]
    NoAvailableDomain { pool: String },

    #[error("pool index {index} out of range ({pools} pools configured)")]
    PoolIndexOutOfRange { index: usize, pools: usize },

    #[error("invalid poolIndex '{raw}': expected a non-negative base-10 integer")]
    InvalidContinuation { raw: String },
}

impl HopError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            HopError::ConfigLoad(_) => "config_load",
            HopError::NoAvailableDomain { .. } => "no_available_domain",
            HopError::PoolIndexOutOfRange { .. } => "pool_index_out_of_range",
            HopError::InvalidContinuation { .. } => "invalid_continuation",
        }
    }
}

/// Parse inbound continuation state. Absent means an origin hop.
pub fn parse_pool_index(raw: Option<&str>) -> Result<usize, HopError> {
    match raw {
        None => Ok(0),
        Some(raw) => {
            let invalid = || HopError::InvalidContinuation {
                raw: raw.to_string(),
            };
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            raw.parse().map_err(|_| invalid())
        }
    }
}

/// Where the current hop sends the visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub target_url: String,
    #[serde(flatten)]
    pub kind: NavigationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NavigationKind {
    /// Continue at `next_index` on the next hop.
    Chain { next_index: usize },
    /// The sequence is complete.
    Final,
}

impl NavigationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationKind::Chain { .. } => "chain",
            NavigationKind::Final => "final",
        }
    }
}

/// Drives a single hop over an immutable pool document.
pub struct Sequencer<'a, P> {
    config: &'a SequenceConfig,
    prober: Prober<'a, P>,
    sink: &'a dyn ProgressSink,
}

impl<'a, P: Probe> Sequencer<'a, P> {
    pub fn new(config: &'a SequenceConfig, prober: Prober<'a, P>, sink: &'a dyn ProgressSink) -> Self {
        Self {
            config,
            prober,
            sink,
        }
    }

    /// Resolve the pool at `start_index` and produce the navigation.
    ///
    /// Fails without probing when `start_index` is outside the configured
    /// pools, and without navigating when no domain in the pool is available.
    pub async fn run(&self, start_index: usize) -> Result<Navigation, HopError> {
        let total = self.config.total_steps();
        let pools = self.config.domain_pools.len();

        let pool = self
            .config
            .domain_pools
            .get(start_index)
            .ok_or(HopError::PoolIndexOutOfRange {
                index: start_index,
                pools,
            })?;
        tracing::Span::current().record("pool", pool.name.as_str());

        self.sink.emit(HopEvent::step(
            start_index + 1,
            total,
            format!("Step {}: processing {}", start_index + 1, pool.name),
        ));

        let round = self.prober.probe_pool(pool, self.sink).await;
        let domain = round
            .first_available()
            .ok_or_else(|| HopError::NoAvailableDomain {
                pool: pool.name.clone(),
            })?
            .to_string();

        self.sink.emit(HopEvent::Resolved {
            pool: pool.name.clone(),
            domain: domain.clone(),
        });

        tokio::time::sleep(self.config.jump_delay()).await;

        let navigation = match pool.kind {
            PoolKind::Target => {
                self.sink.emit(HopEvent::step(
                    start_index + 2,
                    total,
                    format!("Step {}: redirecting to final target", start_index + 2),
                ));
                Navigation {
                    target_url: subdomain::rotate_subdomain(&domain),
                    kind: NavigationKind::Final,
                }
            }
            PoolKind::Intermediate => {
                let next_index = start_index + 1;
                if next_index >= pools {
                    tracing::warn!(
                        pool = %pool.name,
                        next_index,
                        "Last pool is not a target; next hop will fail"
                    );
                }
                self.sink.emit(HopEvent::step(
                    start_index + 2,
                    total,
                    format!("Step {}: redirecting to next pool", start_index + 2),
                ));
                Navigation {
                    target_url: subdomain::with_pool_index(
                        &subdomain::rotate_subdomain(&domain),
                        next_index,
                    ),
                    kind: NavigationKind::Chain { next_index },
                }
            }
        };

        tracing::info!(
            pool = %pool.name,
            domain = %domain,
            target = %navigation.target_url,
            kind = navigation.kind.as_str(),
            "Hop resolved"
        );
        Ok(navigation)
    }
}
