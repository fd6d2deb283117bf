//! Configuration management for the gateway.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use scanproof_common::RuntimeEnv;
use scanproof_common::constants::{
    DEFAULT_ALLOWED_HOSTS, DEFAULT_API_BASE_URL, DEFAULT_LISTEN_ADDR, DEFAULT_PUBLIC_PROXY_PATH,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

use crate::codec::EncryptionKeys;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis connection URL; without it the cache is disabled
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Deployment environment, selects the cache key segment
    #[serde(default)]
    pub runtime_env: RuntimeEnv,

    /// Backend API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Hosts the proxy may forward to
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Upstream call timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Public path proxied URLs point at
    #[serde(default = "default_public_proxy_path")]
    pub public_proxy_path: String,

    /// Static fallback encryption secrets
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub iv: Option<String>,
}

impl EncryptionConfig {
    /// Both halves present, or nothing
    pub fn keys(&self) -> Option<EncryptionKeys> {
        match (&self.key, &self.iv) {
            (Some(key), Some(iv)) if !key.is_empty() && !iv.is_empty() => {
                Some(EncryptionKeys::new(key.as_str(), iv.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|s| format!("<{} bytes>", s.len()));
        f.debug_struct("EncryptionConfig")
            .field("key", &redact(&self.key))
            .field("iv", &redact(&self.iv))
            .finish()
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_api_base_url() -> String { DEFAULT_API_BASE_URL.to_string() }
fn default_allowed_hosts() -> Vec<String> { DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect() }
fn default_upstream_timeout() -> u64 { DEFAULT_UPSTREAM_TIMEOUT_SECS }
fn default_public_proxy_path() -> String { DEFAULT_PUBLIC_PROXY_PATH.to_string() }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = Some(redis_url.clone());
        }
        if let Some(ref api_base_url) = args.api_base_url {
            config.api_base_url = api_base_url.clone();
        }
        if let Some(ref runtime_env) = args.runtime_env {
            config.runtime_env = RuntimeEnv::parse(runtime_env);
        }
        if let Some(ref key) = args.encryption_key {
            config.encryption.key = Some(key.clone());
        }
        if let Some(ref iv) = args.encryption_iv {
            config.encryption.iv = Some(iv.clone());
        }

        config.finalize()
    }

    /// Validate derived settings and add the API host to the allow-list
    fn finalize(mut self) -> Result<Self> {
        let api = url::Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url: {}", self.api_base_url))?;
        let host = api
            .host_str()
            .context("api_base_url has no host")?
            .to_ascii_lowercase();

        if !self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
            self.allowed_hosts.push(host);
        }

        Ok(self)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
            runtime_env: RuntimeEnv::default(),
            api_base_url: default_api_base_url(),
            allowed_hosts: default_allowed_hosts(),
            upstream_timeout_secs: default_upstream_timeout(),
            public_proxy_path: default_public_proxy_path(),
            encryption: EncryptionConfig::default(),
        }
    }
}
