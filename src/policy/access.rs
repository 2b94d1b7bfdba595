//! Local license rule checks.
//!
//! The server says whether a key exists and is valid; these checks add the
//! caller's own requirements on top:
//! - license status must be usable
//! - expiry (plus grace) must not have passed
//! - required features must all be present
//! - activation count must be within the license's cap

use crate::clock::Clock;
use crate::protocol::models::{License, LicenseStatus};
use crate::LicenseKitError;
use std::time::Duration;

/// Caller-side requirements applied to a license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    /// Feature codes that must all be present.
    pub required_features: Vec<String>,

    /// Treat `suspended` licenses as usable.
    pub allow_suspended: bool,

    /// Extra time a license stays usable after `expires_at`.
    pub expiry_grace: Duration,

    /// Reject licenses whose activations exceed their cap.
    pub enforce_activation_limit: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            required_features: Vec::new(),
            allow_suspended: false,
            expiry_grace: Duration::ZERO,
            enforce_activation_limit: true,
        }
    }
}

impl ValidationRules {
    /// Rules requiring the given features, defaults otherwise.
    pub fn requiring<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_features: features.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Check a license against `rules`.
///
/// # Returns
/// * `Ok(())` - License satisfies every rule
/// * `Err(LicenseInactive)` - Status is not usable
/// * `Err(LicenseExpired)` - Expiry plus grace is in the past
/// * `Err(FeatureMissing)` - A required feature is absent
/// * `Err(ActivationLimitReached)` - Activations exceed the cap
pub fn check_license(
    license: &License,
    rules: &ValidationRules,
    clock: &dyn Clock,
) -> Result<(), LicenseKitError> {
    let usable = match license.status {
        LicenseStatus::Active => true,
        LicenseStatus::Suspended => rules.allow_suspended,
        _ => false,
    };
    if !usable {
        return Err(LicenseKitError::LicenseInactive {
            status: license.status.to_string(),
        });
    }

    if let Some(expires_at) = license.expires_at {
        // A grace too large for chrono never expires.
        let deadline = chrono::Duration::from_std(rules.expiry_grace)
            .ok()
            .and_then(|grace| expires_at.checked_add_signed(grace));
        if let Some(deadline) = deadline {
            if deadline < clock.now_utc() {
                return Err(LicenseKitError::LicenseExpired);
            }
        }
    }

    for required in &rules.required_features {
        if !license.features.iter().any(|f| f == required) {
            return Err(LicenseKitError::FeatureMissing {
                code: required.clone(),
            });
        }
    }

    if rules.enforce_activation_limit {
        let caps = ActivationCaps::from_license(license);
        if !caps.allows_activation(0) {
            return Err(LicenseKitError::ActivationLimitReached);
        }
    }

    Ok(())
}

/// Activation cap reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationCaps {
    /// Maximum activations (None = unlimited)
    pub max_activations: Option<u32>,

    /// Activations used so far
    pub activations: Option<u32>,
}

impl ActivationCaps {
    /// Extract caps from a license.
    pub fn from_license(license: &License) -> Self {
        Self {
            max_activations: license.max_activations,
            activations: license.activations,
        }
    }

    /// Whether `additional` more activations fit under the cap.
    pub fn allows_activation(&self, additional: u32) -> bool {
        match self.max_activations {
            Some(max) => {
                let used = u64::from(self.activations.unwrap_or(0));
                used + u64::from(additional) <= u64::from(max)
            }
            None => true,
        }
    }

    /// Activations left before the cap, if there is one.
    pub fn remaining(&self) -> Option<u32> {
        self.max_activations
            .map(|max| max.saturating_sub(self.activations.unwrap_or(0)))
    }

    /// Check if any cap exists.
    pub fn has_cap(&self) -> bool {
        self.max_activations.is_some()
    }
}
