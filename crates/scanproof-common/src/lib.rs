//! # Scanproof Common
//!
//! Shared types and pure domain logic used across Scanproof components.
//!
//! ## Modules
//! - `types` - Core data structures (VerifyPayload, ScanItem, VoucherRecord, etc.)
//! - `normalize` - Field normalization for inconsistently cased upstream records
//! - `status` - Status classification and the localized status taxonomy
//! - `ttl` - Time-to-live evaluation
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod normalize;
pub mod status;
pub mod ttl;
pub mod types;

pub use error::{ProxyError, ScanError, ScanResult, StateTransitionError};
pub use status::{Classification, Language, StatusBucket, StatusKind};
pub use ttl::TtlVerdict;
pub use types::*;
