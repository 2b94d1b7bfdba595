//! LicenseKit configuration.

use crate::client::retry::RetryPolicy;
use crate::crypto::freshness::DEFAULT_TOLERANCE_SECONDS;
use crate::LicenseKitError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the API client and webhook verification.
#[derive(Clone)]
pub struct LicenseKitConfig {
    /// API root, e.g. `https://api.example.com/v1`.
    pub base_url: String,

    /// Bearer token sent on every request. Can be replaced at runtime after login.
    pub api_key: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,

    /// Product identifier prepended to the User-Agent (e.g. "myapp/2.1.0").
    pub user_agent_product: String,

    /// Shared secret for inbound webhook signatures.
    pub webhook_secret: Option<String>,

    /// Replay window for inbound webhooks, in seconds.
    pub webhook_tolerance_seconds: i64,
}

impl LicenseKitConfig {
    /// Configuration with defaults for everything but the API root.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent_product: String::new(),
            webhook_secret: None,
            webhook_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the User-Agent product identifier.
    pub fn with_user_agent_product(mut self, product: impl Into<String>) -> Self {
        self.user_agent_product = product.into();
        self
    }

    /// Set the webhook secret.
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Set the webhook replay window.
    pub fn with_webhook_tolerance(mut self, seconds: i64) -> Self {
        self.webhook_tolerance_seconds = seconds;
        self
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LicenseKitError> {
        if self.base_url.trim().is_empty() {
            return Err(LicenseKitError::Config("base_url cannot be empty".to_string()));
        }
        let url = Url::parse(&self.base_url).map_err(|e| {
            LicenseKitError::Config(format!("base_url is not a valid URL: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LicenseKitError::Config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(LicenseKitError::Config("timeout must be non-zero".to_string()));
        }
        if matches!(self.api_key.as_deref(), Some("")) {
            return Err(LicenseKitError::Config("api_key cannot be empty".to_string()));
        }
        if matches!(self.webhook_secret.as_deref(), Some("")) {
            return Err(LicenseKitError::Config(
                "webhook_secret cannot be empty".to_string(),
            ));
        }
        if self.webhook_tolerance_seconds < 0 {
            return Err(LicenseKitError::Config(
                "webhook_tolerance_seconds cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for LicenseKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("LicenseKitConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redacted(&self.api_key))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("user_agent_product", &self.user_agent_product)
            .field("webhook_secret", &redacted(&self.webhook_secret))
            .field("webhook_tolerance_seconds", &self.webhook_tolerance_seconds)
            .finish()
    }
}
