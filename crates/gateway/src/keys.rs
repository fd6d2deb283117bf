//! Per-organisation encryption key resolution.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use scanproof_common::constants::cache_keys::{ENCRYPTION_CONFIG_PREFIX, SCAN_ITEM_ACTIONS};
use scanproof_common::normalize::{ENCRYPTION_CONFIG_FIELDS, normalize_value, value_as_string};
use scanproof_common::{RuntimeEnv, ScanError, ScanResult};

use crate::cache::CacheStore;
use crate::codec::EncryptionKeys;

/// Cache key holding an organisation's encryption config
pub fn encryption_cache_key(env: RuntimeEnv, org: &str) -> String {
    format!(
        "{ENCRYPTION_CONFIG_PREFIX}:{}:{SCAN_ITEM_ACTIONS}:{org}",
        env.cache_segment()
    )
}

/// Resolves keys from the cache first, then static configuration
pub struct KeyResolver {
    cache: Arc<dyn CacheStore>,
    env: RuntimeEnv,
    fallback: Option<EncryptionKeys>,
}

impl KeyResolver {
    pub fn new(cache: Arc<dyn CacheStore>, env: RuntimeEnv, fallback: Option<EncryptionKeys>) -> Self {
        Self {
            cache,
            env,
            fallback,
        }
    }

    /// Keys for `org`, already length-checked
    pub async fn resolve(&self, org: &str) -> ScanResult<EncryptionKeys> {
        if let Some(keys) = self.from_cache(org).await {
            return Ok(keys);
        }

        match &self.fallback {
            Some(keys) => match keys.validate() {
                Ok(_) => {
                    debug!(org = %org, source = "config", "Using static encryption keys");
                    Ok(keys.clone())
                }
                Err(_) => {
                    warn!(source = "config", "Static encryption keys have invalid lengths");
                    Err(ScanError::Configuration(
                        "static encryption keys are invalid".to_string(),
                    ))
                }
            },
            None => {
                warn!(org = %org, "No encryption keys in cache or configuration");
                Err(ScanError::Configuration(
                    "no encryption keys available".to_string(),
                ))
            }
        }
    }

    async fn from_cache(&self, org: &str) -> Option<EncryptionKeys> {
        let cache_key = encryption_cache_key(self.env, org);

        let raw = match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(org = %org, error = %e, "Cache lookup failed, using static keys");
                return None;
            }
        };

        let keys = serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|value| normalize_value(&value, ENCRYPTION_CONFIG_FIELDS))
            .and_then(|fields| {
                let key = fields.get("key").and_then(value_as_string)?;
                let iv = fields.get("iv").and_then(value_as_string)?;
                Some(EncryptionKeys::new(key, iv))
            });

        match keys {
            Some(keys) if keys.validate().is_ok() => {
                debug!(org = %org, source = "cache", "Resolved encryption keys");
                Some(keys)
            }
            Some(_) => {
                warn!(org = %org, source = "cache", "Cached encryption keys have invalid lengths");
                None
            }
            None => {
                warn!(org = %org, source = "cache", "Cached encryption config is unusable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MockCacheStore, NullCache};

    fn static_keys() -> EncryptionKeys {
        EncryptionKeys::new("0123456789abcdef", "fedcba9876543210")
    }

    fn cache_holding(env: RuntimeEnv, org: &str, json: &'static str) -> MockCacheStore {
        let expected = encryption_cache_key(env, org);
        let mut cache = MockCacheStore::new();
        cache
            .expect_get()
            .withf(move |key: &str| key == expected)
            .times(1)
            .returning(move |_| Ok(Some(json.to_string())));
        cache
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(
            encryption_cache_key(RuntimeEnv::Production, "acme"),
            "CacheLoader:Production:ScanItemActions:acme"
        );
    }

    #[tokio::test]
    async fn test_cache_wins_over_config() {
        let cache = cache_holding(
            RuntimeEnv::Test,
            "acme",
            r#"{"ENCRYPTION_KEY":"abcdefghijklmnopqrstuvwx","encryption_iv":"1234567890123456"}"#,
        );
        let resolver = KeyResolver::new(Arc::new(cache), RuntimeEnv::Test, Some(static_keys()));

        let keys = resolver.resolve("acme").await.unwrap();
        assert_eq!(keys, EncryptionKeys::new("abcdefghijklmnopqrstuvwx", "1234567890123456"));
    }

    #[tokio::test]
    async fn test_invalid_cached_keys_fall_back() {
        let cache = cache_holding(
            RuntimeEnv::Development,
            "acme",
            r#"{"Encryption_Key":"short","Encryption_Iv":"also-short"}"#,
        );
        let resolver = KeyResolver::new(Arc::new(cache), RuntimeEnv::Development, Some(static_keys()));

        assert_eq!(resolver.resolve("acme").await.unwrap(), static_keys());
    }

    #[tokio::test]
    async fn test_cache_failure_falls_back() {
        let mut cache = MockCacheStore::new();
        cache
            .expect_get()
            .times(1)
            .returning(|_| Err(ScanError::Cache("connection refused".to_string())));
        cache.expect_set().never();

        let resolver = KeyResolver::new(Arc::new(cache), RuntimeEnv::Development, Some(static_keys()));
        assert_eq!(resolver.resolve("acme").await.unwrap(), static_keys());
    }

    #[tokio::test]
    async fn test_no_keys_is_configuration_error() {
        let resolver = KeyResolver::new(Arc::new(NullCache), RuntimeEnv::Development, None);
        let err = resolver.resolve("acme").await.unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));

        let bad = EncryptionKeys::new("k", "iv");
        let resolver = KeyResolver::new(Arc::new(NullCache), RuntimeEnv::Development, Some(bad));
        assert!(matches!(resolver.resolve("acme").await, Err(ScanError::Configuration(_))));
    }
}
