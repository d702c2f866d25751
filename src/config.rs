// Process configuration, built on the `config` crate layered over
// environment variables rather than scattered `env::var` calls with
// inline defaults, so the rest of the crate never touches `std::env`
// directly.

use serde::Deserialize;

use crate::{CoreError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CoreConfig {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// `memory` or `nats`.
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Default HMAC secret applied to webhook triggers that don't declare
    /// their own `secret`.
    #[serde(default)]
    pub webhook_default_secret: Option<String>,

    /// Path segment the Tool-Discovery RPC endpoint is mounted at.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Cap on the RSS seen-set, per automation.
    #[serde(default = "default_rss_seen_set_cap")]
    pub rss_seen_set_cap: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_storage_backend() -> String {
    "memory".to_string()
}
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}
fn default_rpc_path() -> String {
    "/rpc".to_string()
}
fn default_rpc_timeout_secs() -> u64 {
    25
}
fn default_rss_seen_set_cap() -> usize {
    crate::models::DEFAULT_SEEN_SET_CAP
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            server_host: default_host(),
            server_port: default_port(),
            storage_backend: default_storage_backend(),
            nats_url: default_nats_url(),
            webhook_default_secret: None,
            rpc_path: default_rpc_path(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            rss_seen_set_cap: default_rss_seen_set_cap(),
        }
    }
}

impl CoreConfig {
    /// Load from environment variables (optionally via a `.env` file the
    /// caller has already loaded with `dotenv::dotenv()`), falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build config: {}", e)))?;

        // `config::Config::try_deserialize` requires every field present
        // unless the target honors serde defaults, which `CoreConfig`
        // does via `#[serde(default = ...)]` on every field.
        match cfg.try_deserialize::<CoreConfig>() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Ok(CoreConfig::default()),
        }
    }
}
