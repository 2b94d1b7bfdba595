//! LicenseKit error types.

use std::time::Duration;
use thiserror::Error;

/// Error returned by a caller-registered webhook handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rate limit details reported alongside a 429 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// How long the server asked us to wait (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// Request quota for the current window.
    pub limit: Option<u64>,

    /// Requests left in the current window.
    pub remaining: Option<u64>,

    /// Window reset, as reported by the server (Unix seconds).
    pub reset: Option<u64>,
}

/// Errors that can occur while talking to the license API or handling webhooks.
#[derive(Debug, Error)]
pub enum LicenseKitError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Webhook secret missing or signature mismatch.
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook body is not a well-formed event.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Digest name outside sha1/sha256/sha512.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A caller-registered webhook handler failed.
    #[error("Webhook handler for {event_type} failed: {source}")]
    HandlerFailed {
        /// Event type the handler was registered for.
        event_type: String,
        /// The handler's own error.
        #[source]
        source: HandlerError,
    },

    /// Credentials rejected (401/403).
    #[error("Authentication failed ({status}): {message}")]
    Authentication {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Request rejected as malformed (400/422), or rejected locally before sending.
    #[error("Validation error: {message}")]
    Validation {
        /// HTTP status code; `None` when no request was sent.
        status: Option<u16>,
        /// Server-provided or local message.
        message: String,
    },

    /// Resource does not exist (404).
    #[error("Not found: {message}")]
    NotFound {
        /// Server-provided message.
        message: String,
    },

    /// Too many requests (429).
    #[error("Rate limit exceeded")]
    RateLimit(RateLimitInfo),

    /// Request timed out, either client-side or reported by the server (408).
    #[error("Request timed out: {message}")]
    Timeout {
        /// `Some(408)` when the server reported it; `None` for a client-side timeout.
        status: Option<u16>,
        /// Server-provided message or transport error text.
        message: String,
    },

    /// Server failure (5xx).
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// No response received.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// License is not in a usable state.
    #[error("License is {status}")]
    LicenseInactive {
        /// The license's current status.
        status: String,
    },

    /// License expiry (plus grace) has passed.
    #[error("License expired")]
    LicenseExpired,

    /// Required feature missing from the license.
    #[error("Required feature missing: {code}")]
    FeatureMissing {
        /// The feature code that was required but missing.
        code: String,
    },

    /// License has no activations left.
    #[error("Activation limit reached")]
    ActivationLimitReached,
}

impl LicenseKitError {
    /// Whether the HTTP transport should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::Server { .. } | Self::RateLimit(_)
        )
    }

    /// A `Validation` error raised before any request was sent.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status of the response behind this error.
    ///
    /// `None` when no response was involved, including local validation
    /// failures and client-side timeouts.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Server { status, .. }
            | Self::Api { status, .. } => Some(*status),
            Self::Validation { status, .. } | Self::Timeout { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            Self::RateLimit(_) => Some(429),
            _ => None,
        }
    }
}
