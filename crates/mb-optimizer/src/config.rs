//! Connection settings for the remote optimizer service.

use mb_types::{config_error, Endpoint, MboResult};
use serde::{Deserialize, Serialize};

/// Environment variable holding the optimizer host.
pub const HOST_ENV: &str = "MBO_OPTIMIZER_HOST";
/// Environment variable holding the optimizer port.
pub const PORT_ENV: &str = "MBO_OPTIMIZER_PORT";
/// Environment variable holding the per-request timeout in seconds.
pub const TIMEOUT_ENV: &str = "MBO_OPTIMIZER_TIMEOUT_SECS";

/// Where the optimizer service listens and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerServiceConfig {
    /// URL scheme, "http" or "https".
    pub scheme: String,

    pub host: String,

    pub port: u16,

    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for OptimizerServiceConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8004,
            request_timeout_secs: None,
        }
    }
}

impl OptimizerServiceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Read settings from `MBO_OPTIMIZER_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> MboResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> MboResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_ENV) {
            config.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            config.port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| config_error!("{PORT_ENV}={port:?} is not a valid port: {e}"))?;
        }
        if let Some(secs) = lookup(TIMEOUT_ENV) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| config_error!("{TIMEOUT_ENV}={secs:?} is not a number: {e}"))?;
            config.request_timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MboResult<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(config_error!("unsupported scheme {:?}", self.scheme));
        }
        if self.host.trim().is_empty() {
            return Err(config_error!("optimizer host is empty"));
        }
        if self.port == 0 {
            return Err(config_error!("optimizer port must be non-zero"));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(config_error!("request timeout must be at least one second"));
        }
        Ok(())
    }

    /// e.g. "http://localhost:8004"
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url(), endpoint.path())
    }
}
