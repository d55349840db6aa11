//! Service configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use hop_tracing::TracingConfig;
use serde::Deserialize;

use crate::probe::policy::ReachabilityPolicy;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HopperConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Where the pool document is read from on every hop.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsConfig {
    /// An `http(s)://` URL fetched with GET, or a filesystem path.
    #[serde(default = "default_pools_source")]
    pub source: String,

    /// Upper bound on fetching the pool document.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Path appended to every candidate domain.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Initial reachability policy. Can be changed at runtime via `/api/policy`.
    #[serde(default)]
    pub policy: ReachabilityPolicy,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:3090".to_string()
}

fn default_pools_source() -> String {
    "data/domains.json".to_string()
}

fn default_fetch_timeout() -> u64 {
    5000
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            source: default_pools_source(),
            fetch_timeout_ms: default_fetch_timeout(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_path: default_health_path(),
            policy: ReachabilityPolicy::default(),
            user_agent: None,
        }
    }
}

impl HopperConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (HOPPER_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: HopperConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("HOPPER_").split("__"))
            .extract()?;

        Ok(config)
    }
}
