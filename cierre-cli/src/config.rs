//! Configuration module
//!
//! Handles CLI configuration: backend URL, credentials, and poller tunables.

use anyhow::{Result, anyhow};
use cierre_client::CierreClient;
use cierre_poller::PollerConfig;
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the backend API
    pub api_url: String,

    /// Bearer token, if any
    pub token: Option<String>,

    /// Poller tunables, read from the environment
    pub poller: PollerConfig,
}

impl Config {
    /// Builds the configuration from CLI flags and the environment
    pub fn load(api_url: String, token: Option<String>) -> Result<Self> {
        let poller = PollerConfig::from_env();
        poller
            .validate()
            .map_err(|e| anyhow!("Invalid poller configuration: {}", e))?;
        debug!("Poller configuration: {:?}", poller);

        Ok(Self {
            api_url,
            token,
            poller,
        })
    }

    /// HTTP client for the configured backend
    pub fn client(&self) -> CierreClient {
        let client = CierreClient::new(self.api_url.clone());
        match &self.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }
}
