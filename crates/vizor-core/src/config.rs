use crate::error::{Result, VizorError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration (`config.toml`).
///
/// Every section has defaults matching the lab deployment, so an empty
/// file is a valid configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct VizorConfig {
    pub registry: RegistryConfig,
    pub launcher: LauncherConfig,
    pub proxy: ProxyConfig,
    pub viewer: ViewerConfig,
    pub reaper: ReaperConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379/".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://viewer-launcher:5005".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of the proxy's API listener
    pub api_url: String,
    /// Value sent as `Authorization: token <auth_token>`
    pub auth_token: String,
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_url: "http://confproxy:8001".to_string(),
            auth_token: String::new(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Public host name end users reach the proxy under
    pub public_host: String,
    pub token_poll_interval_ms: u64,
    pub token_timeout_secs: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            public_host: "localhost".to_string(),
            token_poll_interval_ms: 250,
            token_timeout_secs: 120,
        }
    }
}

impl ViewerConfig {
    pub fn token_poll_interval(&self) -> Duration {
        Duration::from_millis(self.token_poll_interval_ms)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReaperConfig {
    /// A viewer route without traffic for this long is idle
    pub idle_threshold_secs: u64,
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 30,
            interval_secs: 60,
        }
    }
}

impl ReaperConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Backoff for retryable HTTP failures.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retrying
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5050".to_string(),
        }
    }
}

impl VizorConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies environment overrides.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VIZOR_REDIS_URL") {
            self.registry.url = url;
        }
        if let Some(url) = lookup("VIZOR_LAUNCHER_URL") {
            self.launcher.base_url = url;
        }
        if let Some(url) = lookup("VIZOR_PROXY_URL") {
            self.proxy.api_url = url;
        }
        if let Some(token) = lookup("CONFIGPROXY_AUTH_TOKEN") {
            self.proxy.auth_token = token;
        }
        if let Some(host) = lookup("HOSTURL") {
            self.viewer.public_host = host;
        }
        if let Some(secs) = lookup("VIZOR_IDLE_SECS") {
            self.reaper.idle_threshold_secs = parse_secs("VIZOR_IDLE_SECS", &secs)?;
        }
        if let Some(secs) = lookup("VIZOR_REAP_INTERVAL_SECS") {
            self.reaper.interval_secs = parse_secs("VIZOR_REAP_INTERVAL_SECS", &secs)?;
        }
        if let Some(bind) = lookup("VIZOR_BIND") {
            self.server.bind = bind;
        }
        Ok(())
    }

    /// Checks values that would make the orchestrator misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.viewer.public_host.trim().is_empty() {
            return Err(VizorError::config("viewer.public_host must not be empty"));
        }
        if self.viewer.token_poll_interval_ms == 0 {
            return Err(VizorError::config("viewer.token_poll_interval_ms must be positive"));
        }
        if self.reaper.interval_secs == 0 {
            return Err(VizorError::config("reaper.interval_secs must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(VizorError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| VizorError::config(format!("{key} must be a number of seconds, got '{value}'")))
}
