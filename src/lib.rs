//! # LicenseKit
//!
//! **Client SDK for a license-management REST service, plus inbound webhook
//! verification and dispatch.**
//!
//! ## Features
//!
//! - **Typed API client** - applications, licenses, webhook subscriptions, analytics
//! - **Retries with backoff** - network failures, timeouts, 5xx and 429 (honoring `Retry-After`)
//! - **HMAC webhook signatures** - SHA-1, SHA-256 or SHA-512, compared in constant time
//! - **Replay window** - stale event timestamps are rejected (5 minutes by default)
//! - **Handler registry** - route events by type to async handlers, with a fallback
//! - **Local license rules** - required features, expiry grace, activation caps
//!
//! ## Quickstart
//!
//! ```no_run
//! use licensekit::{LicenseKitClient, LicenseKitConfig, ValidationRules};
//!
//! fn main() -> Result<(), licensekit::LicenseKitError> {
//!     let config = LicenseKitConfig::new("https://licenses.example.com/api/v1")
//!         .with_api_key("sk_live_...")
//!         .with_user_agent_product("myapp/1.4.0");
//!
//!     let client = LicenseKitClient::new(config)?;
//!     let verdict = client.check_license("ABCD-EFGH-IJKL", &ValidationRules::requiring(["pro"]))?;
//!
//!     if verdict.valid {
//!         println!("License accepted");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Webhooks
//!
//! ```no_run
//! use licensekit::{LicenseKitClient, LicenseKitConfig, SignatureAlgorithm};
//!
//! # async fn receive(body: &[u8], signature_header: &str) -> Result<(), licensekit::LicenseKitError> {
//! let config = LicenseKitConfig::new("https://licenses.example.com/api/v1")
//!     .with_webhook_secret("whsec_...");
//! let dispatcher = LicenseKitClient::new(config)?.webhook_dispatcher()?;
//!
//! let outcome = dispatcher
//!     .handle(body, signature_header, SignatureAlgorithm::Sha256)
//!     .await?;
//! println!("{}", outcome.to_value());
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.
//! Secrets and tokens are never logged.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/licensekit/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Policy layer
pub mod policy;

// Webhook layer
pub mod webhook;

// Re-exports for public API
pub use client::api::LicenseKitClient;
pub use client::retry::RetryPolicy;
pub use clock::{Clock, SystemClock};
pub use config::LicenseKitConfig;
pub use crypto::signature::{SignatureAlgorithm, WebhookVerifier};
pub use errors::{HandlerError, LicenseKitError, RateLimitInfo};
pub use policy::access::{ActivationCaps, ValidationRules};
pub use protocol::models::{License, LicenseStatus, LicenseValidation};
pub use webhook::{DispatchOutcome, EventDispatcher, WebhookEvent};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
