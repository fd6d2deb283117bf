//! Shared constants for Scanproof components.

/// Default gateway HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default backend API base URL (local development)
pub const DEFAULT_API_BASE_URL: &str = "https://api-dev.please-scan.com";

/// Default upstream call timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Longest wait for the initial Redis connection before running without a cache
pub const REDIS_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Public path of the proxy endpoint that proxied URLs point at
pub const DEFAULT_PUBLIC_PROXY_PATH: &str = "/api/proxy";

/// Backend hosts the proxy may always forward to
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "api-dev.please-scan.com",
    "scan-dev.please-scan.com",
    "api.please-scan.com",
    "scan.please-scan.com",
];

/// Accepted AES key lengths in bytes (AES-128/192/256)
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Required IV length in bytes
pub const IV_LENGTH: usize = 16;

/// Largest upstream error body echoed back to the caller
pub const MAX_DEBUG_BODY_BYTES: usize = 4096;

/// Cache key layout
pub mod cache_keys {
    /// Per-organisation encryption config: CacheLoader:{env}:ScanItemActions:{org}
    pub const ENCRYPTION_CONFIG_PREFIX: &str = "CacheLoader";

    /// Segment between environment and organisation
    pub const SCAN_ITEM_ACTIONS: &str = "ScanItemActions";
}

/// HTTP header names
pub mod headers {
    /// Verdict status attached to responses for the audit log
    pub const X_SCAN_STATUS: &str = "x-scan-status";

    /// Original client chain set by the ingress
    pub const X_ORIGINAL_FORWARDED_FOR: &str = "x-original-forwarded-for";

    /// Standard forwarded-for chain
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

    /// Cloudflare client address
    pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";
}
