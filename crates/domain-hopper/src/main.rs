//! domain-hopper: multi-pool domain availability prober and chained redirect
//! service.
//!
//! Each request is one hop. The hop probes the candidate domains of one pool,
//! then redirects the visitor to a rotated subdomain of the first available
//! one: either onwards to the next pool's hop, or to the final target.

mod config;
mod pools;
mod probe;
mod progress;
mod sequencer;
mod server;
mod stats;
mod subdomain;

use std::time::Duration;

use config::HopperConfig;
use pools::PoolLoader;
use probe::http::HttpProbe;
use probe::policy::{ReachabilityPolicy, RuntimePolicy};
use server::AppState;
use stats::HopStats;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("HOPPER_CONFIG").ok())
        .unwrap_or_else(|| "domain-hopper.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let policy_override = args
        .iter()
        .position(|a| a == "--policy")
        .and_then(|i| args.get(i + 1))
        .map(|p| p.parse::<ReachabilityPolicy>())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let mut config = HopperConfig::load(&config_path)?;

    // CLI overrides take precedence over TOML and env vars
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }
    if let Some(policy) = policy_override {
        config.probe.policy = policy;
    }

    // Build the tokio runtime first — tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // OTLP export is optional; falls back to fmt-only
        let tracing_guard = hop_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            otlp_export = tracing_guard.exporting(),
            listen_address = %config.server.listen_address,
            pools_source = %config.pools.source,
            policy = ?config.probe.policy,
            "Starting domain-hopper"
        );
        if config.probe.policy == ReachabilityPolicy::AnySettled {
            tracing::warn!("any-settled policy counts connection errors as available");
        }

        let result = run(config).await;
        drop(tracing_guard);
        result
    })
}

async fn run(config: HopperConfig) -> anyhow::Result<()> {
    let loader_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.pools.fetch_timeout_ms))
        .build()?;

    let state = AppState {
        loader: PoolLoader::new(loader_client, &config.pools),
        probe: HttpProbe::new(&config.probe)?,
        policy: RuntimePolicy::new(config.probe.policy),
        stats: HopStats::new(),
        config,
    };

    tracing::info!(source = %state.loader.source(), "Pool document source configured");

    server::run(state).await
}
