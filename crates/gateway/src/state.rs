//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use scanproof_common::constants::REDIS_CONNECT_TIMEOUT_SECS;

use crate::cache::{CacheStore, NullCache, RedisCache};
use crate::config::AppConfig;
use crate::keys::KeyResolver;
use crate::proxy::{ProxyGateway, ReqwestTransport, UpstreamTransport};
use crate::verify::VerifyService;
use crate::voucher::VoucherService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Outbound proxy (allow-list, substitution, timeout)
    pub proxy: Arc<ProxyGateway>,

    /// Token verification pipeline
    pub verify: Arc<VerifyService>,

    /// Voucher action endpoint
    pub vouchers: Arc<VoucherService>,
}

impl AppState {
    /// Create application state, connecting to Redis when configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let cache = connect_cache(
            config.redis_url.as_deref(),
            Duration::from_secs(REDIS_CONNECT_TIMEOUT_SECS),
        )
        .await;

        let transport = ReqwestTransport::new(config.upstream_timeout())
            .context("Failed to build HTTP client")?;

        Ok(Self::with_parts(config, cache, Arc::new(transport)))
    }

    /// Wire services from an explicit cache and transport
    pub fn with_parts(
        config: AppConfig,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Self {
        let proxy = Arc::new(ProxyGateway::new(
            transport,
            &config.allowed_hosts,
            config.upstream_timeout(),
        ));

        let keys = KeyResolver::new(cache, config.runtime_env, config.encryption.keys());
        let verify = Arc::new(VerifyService::new(
            keys,
            proxy.clone(),
            &config.api_base_url,
            &config.public_proxy_path,
        ));
        let vouchers = Arc::new(VoucherService::new(proxy.clone(), &config.api_base_url));

        Self {
            config,
            proxy,
            verify,
            vouchers,
        }
    }
}

/// Redis when reachable, otherwise a cache that always misses
///
/// An unreachable cache never blocks startup; key lookups fall back to
/// static configuration.
async fn connect_cache(redis_url: Option<&str>, wait: Duration) -> Arc<dyn CacheStore> {
    let Some(url) = redis_url else {
        warn!("No Redis URL configured, encryption keys come from static config only");
        return Arc::new(NullCache);
    };

    match tokio::time::timeout(wait, RedisCache::connect(url)).await {
        Ok(Ok(cache)) => {
            info!("✅ Redis connected: {}", url);
            Arc::new(cache)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "⚠️ Redis unavailable, using static encryption keys");
            Arc::new(NullCache)
        }
        Err(_) => {
            warn!(
                timeout_secs = wait.as_secs(),
                "⚠️ Redis connection timed out, using static encryption keys"
            );
            Arc::new(NullCache)
        }
    }
}
