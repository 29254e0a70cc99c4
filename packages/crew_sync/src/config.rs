//! Engine configuration, figment-layered from defaults / config.toml / env.
//!
//! Three equivalent ways to configure:
//!
//!   config.toml:     [reconnect]
//!                    max_attempts = 5
//!
//!   env var:         CREW_RECONNECT__MAX_ATTEMPTS=5   (double underscore = nesting)
//!
//! (single underscore stays within field names: CREW_SERVER__WS_URL)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Top-level tunable configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

/// Where the server lives (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_base: default_api_base(),
        }
    }
}

/// Bounded retry for the initial/re-established connection (lives under
/// `[reconnect]`). Matches the transport's own backoff; the liveness check
/// covers silent failures this retry misses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Periodic connection check (lives under `[liveness]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_liveness_interval_secs")]
    pub interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_liveness_interval_secs(),
        }
    }
}

impl LivenessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_ws_url() -> String {
    "ws://localhost:3000/ws".to_string()
}

fn default_api_base() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_liveness_interval_secs() -> u64 {
    5
}

impl SyncConfig {
    /// Load config: defaults, then the given toml file (or `config.toml` in
    /// the working directory), then `CREW_`-prefixed env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(SyncConfig::default()));
        figment = match path {
            Some(p) => figment.merge(Toml::file(p)),
            None => figment.merge(Toml::file("config.toml")),
        };
        let config = figment
            .merge(Env::prefixed("CREW_").split("__"))
            .extract()?;
        Ok(config)
    }
}
