//! Common error types for Scanproof components.

use thiserror::Error;

/// Common errors across Scanproof components
#[derive(Debug, Error)]
pub enum ScanError {
    /// Bad key/IV length or missing shared secret.
    ///
    /// The message is for logs only; callers show a generic verdict.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed ciphertext. Never carries key material.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache read/write failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Outbound proxy failure
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Action not valid for the current redemption state
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 500,
            Self::Decryption(_) => 400,
            Self::InvalidInput(_) => 400,
            Self::Cache(_) => 503,
            Self::Proxy(err) => err.status_code(),
            Self::StateTransition(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    /// Message that is safe to hand to a client
    pub fn public_message(&self) -> String {
        match self {
            Self::Configuration(_) => "Server configuration error".to_string(),
            Self::Decryption(_) => "Failed to decrypt data".to_string(),
            Self::Cache(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Proxy(err) => err.public_message(),
            other => other.to_string(),
        }
    }
}

/// Failures of the outbound proxy gateway, distinguishable by the caller
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Target URL could not be decoded or parsed
    #[error("Invalid URL encoding: {0}")]
    InvalidEncoding(String),

    /// Decoded host is not on the allow-list
    #[error("Host not allowed: {0}")]
    HostNotAllowed(String),

    /// A `{name}` placeholder had no supplied value
    #[error("Missing value for placeholder {{{0}}}")]
    MissingPlaceholderValue(String),

    /// Network-level failure or timeout. The detail stays in the logs.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned status {status}")]
    UpstreamError { status: u16, body: String },

    /// Upstream body was not JSON
    #[error("Upstream returned a malformed response: {0}")]
    UpstreamMalformedResponse(String),
}

impl ProxyError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidEncoding(_) => 400,
            Self::HostNotAllowed(_) => 403,
            Self::MissingPlaceholderValue(_) => 400,
            Self::UpstreamUnreachable(_) => 502,
            Self::UpstreamError { status, .. } => *status,
            Self::UpstreamMalformedResponse(_) => 502,
        }
    }

    /// Message that is safe to hand to a client
    pub fn public_message(&self) -> String {
        match self {
            Self::UpstreamUnreachable(_) => "Upstream service unreachable".to_string(),
            Self::UpstreamMalformedResponse(_) => {
                "Upstream returned a malformed response".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Invalid redemption action for the current session state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTransitionError {
    /// The action is not allowed from this step
    #[error("Cannot {action} while in {step} state")]
    InvalidStep {
        action: &'static str,
        step: &'static str,
    },

    /// A verify or approve call is still outstanding
    #[error("Another request is already in flight")]
    RequestInFlight,

    /// Identifier fields for the selected mode are incomplete
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    /// Verified record has no voucher identifier
    #[error("Missing voucher identifier")]
    MissingIdentifier,

    /// Verified record has no PIN to approve with
    #[error("Missing voucher PIN")]
    MissingPin,

    /// Record is already redeemed; approving again cannot succeed
    #[error("Voucher already redeemed")]
    AlreadyRedeemed,
}

pub type ScanResult<T> = Result<T, ScanError>;
