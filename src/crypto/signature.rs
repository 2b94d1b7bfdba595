//! HMAC webhook signatures.
//!
//! Signatures travel as `<algorithm>=<lowercase hex digest>`, for example
//! `sha256=5d41402abc4b2a76b9719d911017c592...`. The digest is an HMAC of the
//! raw request body keyed with the webhook secret shared with the license
//! server.

use crate::clock::{Clock, SystemClock};
use crate::crypto::freshness::{age_seconds, parse_event_timestamp, within_tolerance};
use crate::webhook::event::WebhookEvent;
use crate::LicenseKitError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HMAC digest used for a webhook signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA1 (legacy).
    Sha1,
    /// HMAC-SHA256.
    #[default]
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

impl SignatureAlgorithm {
    /// Prefix used in the signature header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = LicenseKitError;

    /// Accepts `sha1`, `sha256`, `sha512` in any case, with or without a dash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(LicenseKitError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Compute the hex HMAC of `payload` under `secret`.
fn hmac_hex(
    secret: &[u8],
    payload: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<String, LicenseKitError> {
    let key_error = |e: hmac::digest::InvalidLength| {
        LicenseKitError::Config(format!("Invalid HMAC key: {}", e))
    };

    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(secret).map_err(key_error)?;
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        SignatureAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(key_error)?;
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        SignatureAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret).map_err(key_error)?;
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(hex::encode(digest))
}

/// Compare two byte strings without exiting on the first difference.
///
/// Lengths are not secret: a length mismatch returns `false` immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verifies webhook deliveries signed with a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl WebhookVerifier {
    /// Create a verifier for the given shared secret.
    ///
    /// # Errors
    /// `WebhookVerificationFailed` if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, LicenseKitError> {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    /// Create a verifier with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        secret: impl AsRef<[u8]>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LicenseKitError> {
        Self::with_clock(secret, clock)
    }

    pub(crate) fn with_clock(
        secret: impl AsRef<[u8]>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LicenseKitError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(LicenseKitError::WebhookVerificationFailed(
                "webhook secret cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            secret: secret.to_vec(),
            clock,
        })
    }

    /// Produce the signature header value for `payload`.
    pub fn generate_signature(
        &self,
        payload: impl AsRef<[u8]>,
        algorithm: SignatureAlgorithm,
    ) -> Result<String, LicenseKitError> {
        let digest = hmac_hex(&self.secret, payload.as_ref(), algorithm)?;
        Ok(format!("{}={}", algorithm, digest))
    }

    /// Check a signature header value against `payload`.
    ///
    /// Never fails: any problem computing the expected value yields `false`.
    pub fn verify_signature(
        &self,
        payload: impl AsRef<[u8]>,
        signature: &str,
        algorithm: SignatureAlgorithm,
    ) -> bool {
        match self.generate_signature(payload, algorithm) {
            Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to compute webhook signature");
                false
            }
        }
    }

    /// Verify `payload` and decode it into a [`WebhookEvent`].
    ///
    /// The body is not looked at until the signature checks out.
    ///
    /// # Errors
    /// * `WebhookVerificationFailed` - signature mismatch
    /// * `InvalidPayload` - body is not a JSON object event
    pub fn parse_payload(
        &self,
        payload: impl AsRef<[u8]>,
        signature: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<WebhookEvent, LicenseKitError> {
        let payload = payload.as_ref();

        if !self.verify_signature(payload, signature, algorithm) {
            tracing::warn!(%algorithm, "webhook signature mismatch");
            return Err(LicenseKitError::WebhookVerificationFailed(
                "Invalid webhook signature".to_string(),
            ));
        }

        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| LicenseKitError::InvalidPayload(e.to_string()))?;

        WebhookEvent::from_value(value)
    }

    /// Whether the event was created within `tolerance_seconds` of now.
    ///
    /// Events without a timestamp pass; events with an unparsable one fail.
    pub fn verify_timestamp(&self, event: &WebhookEvent, tolerance_seconds: i64) -> bool {
        let Some(raw) = event.created_at() else {
            return true;
        };

        match parse_event_timestamp(raw) {
            Ok(ts) => {
                let fresh = within_tolerance(ts, tolerance_seconds, self.clock.as_ref());
                if !fresh {
                    tracing::warn!(
                        event_id = event.id(),
                        age_seconds = age_seconds(ts, self.clock.as_ref()),
                        tolerance_seconds,
                        "webhook timestamp outside tolerance"
                    );
                }
                fresh
            }
            Err(e) => {
                tracing::warn!(event_id = event.id(), error = %e, "unparsable webhook timestamp");
                false
            }
        }
    }
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
