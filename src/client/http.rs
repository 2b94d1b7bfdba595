//! Reqwest-based HTTP transport for the license API.
//!
//! Handles bearer authentication, URL construction, retries and the mapping
//! of HTTP failures onto [`LicenseKitError`] variants. Endpoint methods live
//! in [`crate::client::api`].

use crate::client::retry::RetryPolicy;
use crate::config::LicenseKitConfig;
use crate::errors::RateLimitInfo;
use crate::protocol::models::parse_body;
use crate::LicenseKitError;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

/// A successful (2xx) API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Rate limit headers, when the server sent them.
    pub rate_limit: RateLimitInfo,

    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, LicenseKitError> {
        parse_body(&self.body)
    }

    /// Get the body as a UTF-8 string.
    pub fn body_str(&self) -> Result<&str, LicenseKitError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| LicenseKitError::Protocol(format!("Invalid UTF-8 in body: {}", e)))
    }
}

/// Blocking HTTP transport shared by all endpoint methods.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    access_token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport from config.
    pub fn new(config: &LicenseKitConfig) -> Result<Self, LicenseKitError> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| LicenseKitError::Config(format!("Invalid base_url: {}", e)))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(build_user_agent(&config.user_agent_product))
            .build()
            .map_err(|e| LicenseKitError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            retry: config.retry,
            access_token: RwLock::new(config.api_key.clone()),
        })
    }

    /// Replace the bearer token used for subsequent requests.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Stop sending a bearer token.
    pub fn clear_access_token(&self) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a bearer token is currently set.
    pub fn has_access_token(&self) -> bool {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn bearer(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }

    /// The configured API root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for `segments` below the API root.
    ///
    /// Each segment is percent-encoded, so ids may contain any character.
    pub fn url_for(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Url, LicenseKitError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LicenseKitError::Config("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);

        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Send a request, retrying transient failures.
    ///
    /// # Errors
    /// Non-2xx responses are classified by [`classify_status`]; transport
    /// failures become `Network` or `Timeout`.
    pub fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, LicenseKitError> {
        let url = self.url_for(segments, query)?;

        self.retry.run(
            |attempt| {
                tracing::debug!(%method, path = url.path(), attempt, "license API request");
                self.send_once(method.clone(), url.clone(), body)
            },
            std::thread::sleep,
        )
    }

    /// Send a request and decode the JSON response.
    pub fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, LicenseKitError> {
        self.send(method, segments, query, body)?.json()
    }

    fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<ApiResponse, LicenseKitError> {
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");

        if let Some(bearer) = self.bearer() {
            request = request.header(AUTHORIZATION, bearer);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(transport_error)?;
        ApiResponse::from_response(response)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .field("authenticated", &self.has_access_token())
            .finish()
    }
}

impl ApiResponse {
    fn from_response(response: Response) -> Result<Self, LicenseKitError> {
        let status = response.status().as_u16();
        let rate_limit = rate_limit_from_headers(response.headers());

        let body = response
            .bytes()
            .map_err(|e| LicenseKitError::Network(format!("Failed to read body: {}", e)))?
            .to_vec();

        if !(200..300).contains(&status) {
            return Err(classify_status(status, rate_limit, &body));
        }

        Ok(Self {
            status,
            rate_limit,
            body,
        })
    }
}

fn transport_error(e: reqwest::Error) -> LicenseKitError {
    if e.is_timeout() {
        LicenseKitError::Timeout {
            status: None,
            message: e.to_string(),
        }
    } else {
        LicenseKitError::Network(e.to_string())
    }
}

/// Map a non-success status onto an error variant.
pub fn classify_status(status: u16, rate_limit: RateLimitInfo, body: &[u8]) -> LicenseKitError {
    let message = error_message(status, body);
    match status {
        401 | 403 => LicenseKitError::Authentication { status, message },
        400 | 422 => LicenseKitError::Validation {
            status: Some(status),
            message,
        },
        404 => LicenseKitError::NotFound { message },
        408 => LicenseKitError::Timeout {
            status: Some(status),
            message,
        },
        429 => LicenseKitError::RateLimit(rate_limit),
        500..=599 => LicenseKitError::Server { status, message },
        _ => LicenseKitError::Api { status, message },
    }
}

/// Pull a human-readable message out of an error body.
///
/// Looks for `message`, then `error` (string or `{message}` object), and
/// falls back to the raw text.
fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        let found = value
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| value.get("error").and_then(Value::as_str))
            .or_else(|| {
                value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
            });
        if let Some(message) = found {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {}", status)
    } else {
        text.to_string()
    }
}

fn header_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Read `Retry-After` and `X-RateLimit-*` headers.
pub fn rate_limit_from_headers(headers: &HeaderMap) -> RateLimitInfo {
    RateLimitInfo {
        retry_after: header_u64(headers, &[RETRY_AFTER.as_str()]).map(Duration::from_secs),
        limit: header_u64(headers, &["x-ratelimit-limit", "ratelimit-limit"]),
        remaining: header_u64(headers, &["x-ratelimit-remaining", "ratelimit-remaining"]),
        reset: header_u64(headers, &["x-ratelimit-reset", "ratelimit-reset"]),
    }
}

/// Build a User-Agent string.
///
/// Format: `<product> licensekit/<version>`, or just `licensekit/<version>`
/// when no product is configured.
pub fn build_user_agent(product: &str) -> String {
    let sdk = format!("licensekit/{}", env!("CARGO_PKG_VERSION"));
    if product.is_empty() {
        sdk
    } else {
        format!("{} {}", product, sdk)
    }
}
