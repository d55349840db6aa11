//! Pool document: the ordered list of domain pools plus hop timing, and the
//! loader that reads it fresh on every hop.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PoolsConfig;

/// The configuration document describing one redirect chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceConfig {
    pub domain_pools: Vec<Pool>,
    #[serde(default)]
    pub jump_delay_ms: u64,
    pub timeout_ms: u64,
}

/// An ordered set of equivalent candidate domains for one stage of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PoolKind,
    /// URL prefixes, e.g. `https://a.example.com`.
    pub domains: Vec<String>,
}

/// Whether resolving a pool chains to the next one or ends the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Intermediate,
    Target,
}

impl SequenceConfig {
    /// One step per pool plus one for the final redirect.
    pub fn total_steps(&self) -> usize {
        self.domain_pools.len() + 1
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn jump_delay(&self) -> Duration {
        Duration::from_millis(self.jump_delay_ms)
    }

    /// Parse and validate a pool document. `origin` names the source in errors.
    pub fn from_json(origin: &str, raw: &str) -> Result<Self, PoolsError> {
        let config: SequenceConfig =
            serde_json::from_str(raw).map_err(|source| PoolsError::Parse {
                origin: origin.to_string(),
                source,
            })?;

        if config.timeout_ms == 0 {
            return Err(PoolsError::Invalid {
                origin: origin.to_string(),
                reason: "timeoutMs must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }
}

/// Failure to obtain a usable pool document.
#[derive(Debug, thiserror::Error)]
pub enum PoolsError {
    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pool document from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pool document from {origin}: {reason}")]
    Invalid { origin: String, reason: String },
}

/// Where the pool document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSource {
    Url(String),
    File(PathBuf),
}

impl PoolSource {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            PoolSource::Url(raw.to_string())
        } else {
            PoolSource::File(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for PoolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolSource::Url(url) => f.write_str(url),
            PoolSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads the pool document. Nothing is cached: every call re-reads the source.
#[derive(Clone)]
pub struct PoolLoader {
    client: reqwest::Client,
    source: PoolSource,
    fetch_timeout: Duration,
}

impl PoolLoader {
    pub fn new(client: reqwest::Client, config: &PoolsConfig) -> Self {
        Self {
            client,
            source: PoolSource::parse(&config.source),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        }
    }

    pub fn source(&self) -> &PoolSource {
        &self.source
    }

    pub async fn load(&self) -> Result<SequenceConfig, PoolsError> {
        let config = match &self.source {
            PoolSource::Url(url) => self.fetch(url).await?,
            PoolSource::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| PoolsError::Read {
                        path: path.clone(),
                        source,
                    })?;
                SequenceConfig::from_json(&path.display().to_string(), &raw)?
            }
        };

        tracing::debug!(
            source = %self.source,
            pools = config.domain_pools.len(),
            total_steps = config.total_steps(),
            "Pool document loaded"
        );
        Ok(config)
    }

    async fn fetch(&self, url: &str) -> Result<SequenceConfig, PoolsError> {
        let fetch_err = |source| PoolsError::Fetch {
            url: url.to_string(),
            source,
        };

        let resp = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(fetch_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PoolsError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let raw = resp.text().await.map_err(fetch_err)?;
        SequenceConfig::from_json(url, &raw)
    }
}
