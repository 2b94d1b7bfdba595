//! LicenseKit API client - the main public API for the license server.
//!
//! `LicenseKitClient` wraps every REST endpoint:
//! - Session management (login, register, refresh, logout)
//! - Applications, licenses and webhook subscriptions
//! - Usage analytics
//!
//! All calls are blocking. Share one client per process; it is `Send + Sync`.

use crate::client::http::HttpTransport;
use crate::clock::{Clock, SystemClock};
use crate::config::LicenseKitConfig;
use crate::crypto::signature::WebhookVerifier;
use crate::policy::access::{check_license, ValidationRules};
use crate::protocol::models::{
    AnalyticsQuery, AnalyticsReport, Application, ApplicationUpdate, AuthSession, License,
    LicenseFilter, LicenseUpdate, LicenseValidation, ListParams, LoginRequest, NewApplication,
    NewLicense, NewWebhook, Page, RegisterRequest, User, ValidateLicenseRequest, Webhook,
    WebhookUpdate,
};
use crate::webhook::EventDispatcher;
use crate::LicenseKitError;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

const NO_QUERY: &[(&str, String)] = &[];

/// Client for the license management API.
pub struct LicenseKitClient {
    config: LicenseKitConfig,
    clock: Arc<dyn Clock>,
    transport: HttpTransport,
}

impl LicenseKitClient {
    /// Create a client with the given configuration.
    ///
    /// # Errors
    /// `Config` if validation fails or the HTTP client cannot be built.
    pub fn new(config: LicenseKitConfig) -> Result<Self, LicenseKitError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a client with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: LicenseKitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LicenseKitError> {
        Self::with_clock(config, clock)
    }

    fn with_clock(
        config: LicenseKitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LicenseKitError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            config,
            clock,
            transport,
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &LicenseKitConfig {
        &self.config
    }

    /// The underlying HTTP transport.
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Use `token` as the bearer token from now on.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.transport.set_access_token(token);
    }

    /// Stop authenticating requests.
    pub fn clear_access_token(&self) {
        self.transport.clear_access_token();
    }

    /// Build a webhook dispatcher from the configured secret and replay window.
    ///
    /// # Errors
    /// `Config` if no webhook secret is configured.
    pub fn webhook_dispatcher(&self) -> Result<EventDispatcher, LicenseKitError> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| LicenseKitError::Config("webhook_secret is not set".to_string()))?;

        let verifier = WebhookVerifier::with_clock(secret, Arc::clone(&self.clock))?;
        Ok(EventDispatcher::new(verifier).with_tolerance(self.config.webhook_tolerance_seconds))
    }

    // ---- auth ----

    /// Log in and keep the returned access token for later calls.
    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession, LicenseKitError> {
        let body = to_body(&LoginRequest { email, password })?;
        let session: AuthSession =
            self.transport
                .request(Method::POST, &["auth", "login"], NO_QUERY, Some(&body))?;
        self.transport.set_access_token(session.access_token.clone());
        tracing::debug!("session established");
        Ok(session)
    }

    /// Create an account and keep the returned access token.
    pub fn register(&self, request: &RegisterRequest) -> Result<AuthSession, LicenseKitError> {
        let body = to_body(request)?;
        let session: AuthSession =
            self.transport
                .request(Method::POST, &["auth", "register"], NO_QUERY, Some(&body))?;
        self.transport.set_access_token(session.access_token.clone());
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    pub fn refresh(&self, refresh_token: &str) -> Result<AuthSession, LicenseKitError> {
        if refresh_token.is_empty() {
            return Err(LicenseKitError::invalid("refresh token cannot be empty"));
        }
        let body = json!({ "refreshToken": refresh_token });
        let session: AuthSession =
            self.transport
                .request(Method::POST, &["auth", "refresh"], NO_QUERY, Some(&body))?;
        self.transport.set_access_token(session.access_token.clone());
        Ok(session)
    }

    /// End the session. The local token is dropped even if the server call fails.
    pub fn logout(&self) -> Result<(), LicenseKitError> {
        let result = self
            .transport
            .send(Method::POST, &["auth", "logout"], NO_QUERY, None);
        self.transport.clear_access_token();
        result.map(|_| ())
    }

    /// The account behind the current token.
    pub fn current_user(&self) -> Result<User, LicenseKitError> {
        self.transport
            .request(Method::GET, &["auth", "me"], NO_QUERY, None)
    }

    // ---- applications ----

    /// List applications.
    pub fn list_applications(
        &self,
        params: ListParams,
    ) -> Result<Page<Application>, LicenseKitError> {
        self.transport
            .request(Method::GET, &["applications"], &params.query_pairs(), None)
    }

    /// Fetch one application.
    pub fn get_application(&self, id: &str) -> Result<Application, LicenseKitError> {
        require_id("application", id)?;
        self.transport
            .request(Method::GET, &["applications", id], NO_QUERY, None)
    }

    /// Create an application.
    pub fn create_application(
        &self,
        application: &NewApplication,
    ) -> Result<Application, LicenseKitError> {
        if application.name.trim().is_empty() {
            return Err(LicenseKitError::invalid("application name cannot be empty"));
        }
        let body = to_body(application)?;
        self.transport
            .request(Method::POST, &["applications"], NO_QUERY, Some(&body))
    }

    /// Change an application.
    pub fn update_application(
        &self,
        id: &str,
        update: &ApplicationUpdate,
    ) -> Result<Application, LicenseKitError> {
        require_id("application", id)?;
        let body = to_body(update)?;
        self.transport
            .request(Method::PATCH, &["applications", id], NO_QUERY, Some(&body))
    }

    /// Delete an application.
    pub fn delete_application(&self, id: &str) -> Result<(), LicenseKitError> {
        require_id("application", id)?;
        self.transport
            .send(Method::DELETE, &["applications", id], NO_QUERY, None)
            .map(|_| ())
    }

    // ---- licenses ----

    /// List licenses matching `filter`.
    pub fn list_licenses(&self, filter: &LicenseFilter) -> Result<Page<License>, LicenseKitError> {
        self.transport
            .request(Method::GET, &["licenses"], &filter.query_pairs(), None)
    }

    /// Fetch one license.
    pub fn get_license(&self, id: &str) -> Result<License, LicenseKitError> {
        require_id("license", id)?;
        self.transport
            .request(Method::GET, &["licenses", id], NO_QUERY, None)
    }

    /// Issue a license.
    pub fn create_license(&self, license: &NewLicense) -> Result<License, LicenseKitError> {
        require_id("application", &license.application_id)?;
        let body = to_body(license)?;
        self.transport
            .request(Method::POST, &["licenses"], NO_QUERY, Some(&body))
    }

    /// Change a license.
    pub fn update_license(
        &self,
        id: &str,
        update: &LicenseUpdate,
    ) -> Result<License, LicenseKitError> {
        require_id("license", id)?;
        let body = to_body(update)?;
        self.transport
            .request(Method::PATCH, &["licenses", id], NO_QUERY, Some(&body))
    }

    /// Revoke a license, optionally recording why.
    pub fn revoke_license(
        &self,
        id: &str,
        reason: Option<&str>,
    ) -> Result<License, LicenseKitError> {
        require_id("license", id)?;
        let body = match reason {
            Some(reason) => json!({ "reason": reason }),
            None => json!({}),
        };
        self.transport
            .request(Method::POST, &["licenses", id, "revoke"], NO_QUERY, Some(&body))
    }

    /// Delete a license.
    pub fn delete_license(&self, id: &str) -> Result<(), LicenseKitError> {
        require_id("license", id)?;
        self.transport
            .send(Method::DELETE, &["licenses", id], NO_QUERY, None)
            .map(|_| ())
    }

    /// Ask the server whether `key` is valid.
    ///
    /// An unknown or expired key is a successful call with `valid == false`.
    pub fn validate_license(
        &self,
        key: &str,
        fingerprint: Option<&str>,
    ) -> Result<LicenseValidation, LicenseKitError> {
        if key.is_empty() {
            return Err(LicenseKitError::invalid("license key cannot be empty"));
        }
        let body = to_body(&ValidateLicenseRequest { key, fingerprint })?;
        self.transport
            .request(Method::POST, &["licenses", "validate"], NO_QUERY, Some(&body))
    }

    /// Validate `key` on the server, then apply `rules` locally.
    ///
    /// A server-side `valid == false` is returned as-is; local rules only
    /// run on keys the server accepted.
    ///
    /// # Errors
    /// - `Protocol` - Server accepted the key but sent no license
    /// - `LicenseInactive` / `LicenseExpired` / `FeatureMissing` /
    ///   `ActivationLimitReached` - A local rule failed
    pub fn check_license(
        &self,
        key: &str,
        rules: &ValidationRules,
    ) -> Result<LicenseValidation, LicenseKitError> {
        let validation = self.validate_license(key, None)?;
        if !validation.valid {
            return Ok(validation);
        }

        let license = validation.license.as_ref().ok_or_else(|| {
            LicenseKitError::Protocol("validation response is missing the license".to_string())
        })?;
        check_license(license, rules, self.clock.as_ref())?;
        Ok(validation)
    }

    // ---- webhooks ----

    /// List webhook subscriptions.
    pub fn list_webhooks(&self, params: ListParams) -> Result<Page<Webhook>, LicenseKitError> {
        self.transport
            .request(Method::GET, &["webhooks"], &params.query_pairs(), None)
    }

    /// Fetch one webhook subscription.
    pub fn get_webhook(&self, id: &str) -> Result<Webhook, LicenseKitError> {
        require_id("webhook", id)?;
        self.transport
            .request(Method::GET, &["webhooks", id], NO_QUERY, None)
    }

    /// Subscribe a URL to events. The response carries the signing secret.
    pub fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, LicenseKitError> {
        if webhook.url.trim().is_empty() {
            return Err(LicenseKitError::invalid("webhook url cannot be empty"));
        }
        let body = to_body(webhook)?;
        self.transport
            .request(Method::POST, &["webhooks"], NO_QUERY, Some(&body))
    }

    /// Change a webhook subscription.
    pub fn update_webhook(
        &self,
        id: &str,
        update: &WebhookUpdate,
    ) -> Result<Webhook, LicenseKitError> {
        require_id("webhook", id)?;
        let body = to_body(update)?;
        self.transport
            .request(Method::PATCH, &["webhooks", id], NO_QUERY, Some(&body))
    }

    /// Remove a webhook subscription.
    pub fn delete_webhook(&self, id: &str) -> Result<(), LicenseKitError> {
        require_id("webhook", id)?;
        self.transport
            .send(Method::DELETE, &["webhooks", id], NO_QUERY, None)
            .map(|_| ())
    }

    // ---- analytics ----

    /// Account-wide usage figures.
    pub fn analytics(&self, query: &AnalyticsQuery) -> Result<AnalyticsReport, LicenseKitError> {
        let pairs = query.query_pairs()?;
        self.transport
            .request(Method::GET, &["analytics"], &pairs, None)
    }

    /// Usage figures for one license.
    pub fn license_usage(
        &self,
        id: &str,
        query: &AnalyticsQuery,
    ) -> Result<AnalyticsReport, LicenseKitError> {
        require_id("license", id)?;
        let pairs = query.query_pairs()?;
        self.transport
            .request(Method::GET, &["analytics", "licenses", id], &pairs, None)
    }
}

impl std::fmt::Debug for LicenseKitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseKitClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish()
    }
}

fn require_id(kind: &str, id: &str) -> Result<(), LicenseKitError> {
    if id.trim().is_empty() {
        return Err(LicenseKitError::invalid(format!("{} id cannot be empty", kind)));
    }
    Ok(())
}

fn to_body<T: Serialize + ?Sized>(value: &T) -> Result<Value, LicenseKitError> {
    serde_json::to_value(value)
        .map_err(|e| LicenseKitError::Protocol(format!("Failed to encode request: {}", e)))
}
