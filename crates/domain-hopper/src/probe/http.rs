//! HTTP health probe.
//!
//! Issues a credential-free GET to `<domain><health_path>`. Redirects are not
//! followed and the body is never read: only the way the request settles is
//! observed.

use reqwest::header::{HeaderValue, CACHE_CONTROL};
use reqwest::redirect;

use super::{Probe, Settlement};
use crate::config::ProbeConfig;

#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    health_path: String,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> reqwest::Result<Self> {
        let agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("domain-hopper/", env!("CARGO_PKG_VERSION")).to_string());
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(agent)
            .build()?;

        Ok(Self {
            client,
            health_path: config.health_path.clone(),
        })
    }

    pub fn health_url(&self, domain: &str) -> String {
        let base = domain.trim_end_matches('/');
        if self.health_path.starts_with('/') {
            format!("{base}{}", self.health_path)
        } else {
            format!("{base}/{}", self.health_path)
        }
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, domain: &str) -> Settlement {
        let url = self.health_url(domain);

        let result = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await;

        match result {
            Ok(resp) => Settlement::Responded {
                status: resp.status().as_u16(),
            },
            Err(e) => Settlement::Failed {
                error: e.to_string(),
            },
        }
    }
}
