//! Webhook dispatch: verify, parse, check the replay window, route by event type.
//!
//! ```no_run
//! use licensekit::webhook::{EventDispatcher, HandlerOutput};
//! use licensekit::{SignatureAlgorithm, WebhookVerifier};
//!
//! # async fn run(body: &str, signature: &str) -> Result<(), licensekit::LicenseKitError> {
//! let dispatcher = EventDispatcher::new(WebhookVerifier::new("whsec_...")?);
//! dispatcher.on("license.revoked", |event| {
//!     Box::pin(async move {
//!         let mut out = HandlerOutput::new();
//!         out.insert("status".into(), "revoked-locally".into());
//!         out.insert("license".into(), event.data()["id"].clone());
//!         Ok::<_, licensekit::HandlerError>(out)
//!     })
//! });
//!
//! let outcome = dispatcher.handle(body, signature, SignatureAlgorithm::Sha256).await?;
//! if !outcome.valid {
//!     eprintln!("rejected: {:?}", outcome.error);
//! }
//! # Ok(())
//! # }
//! ```

use crate::crypto::freshness::DEFAULT_TOLERANCE_SECONDS;
use crate::crypto::signature::{SignatureAlgorithm, WebhookVerifier};
use crate::errors::HandlerError;
use crate::webhook::event::WebhookEvent;
use crate::LicenseKitError;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Fields a handler contributes to the dispatch result.
pub type HandlerOutput = Map<String, Value>;

/// Registered webhook handler.
pub type EventHandler = Arc<
    dyn Fn(WebhookEvent) -> BoxFuture<'static, Result<HandlerOutput, HandlerError>> + Send + Sync,
>;

/// Event types that get a placeholder handler at construction.
pub const DEFAULT_EVENT_TYPES: [&str; 10] = [
    "license.created",
    "license.updated",
    "license.revoked",
    "license.expired",
    "license.validated",
    "app.created",
    "app.updated",
    "app.deleted",
    "user.created",
    "user.updated",
];

/// Result envelope of a single [`EventDispatcher::handle`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Whether the delivery passed verification and was routed.
    pub valid: bool,

    /// The parsed event, when verification succeeded.
    pub event: Option<WebhookEvent>,

    /// Why the delivery was rejected.
    pub error: Option<String>,

    /// Whatever the handler returned.
    pub fields: HandlerOutput,
}

impl DispatchOutcome {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            event: None,
            error: Some(error.into()),
            fields: Map::new(),
        }
    }

    fn routed(event: WebhookEvent, fields: HandlerOutput) -> Self {
        Self {
            valid: true,
            event: Some(event),
            error: None,
            fields,
        }
    }

    /// The handler's `status` field, if it set one.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Flatten into a single JSON object.
    ///
    /// Handler fields come first; `valid`, `event` and `error` are written
    /// last and win on a key collision.
    pub fn to_value(&self) -> Value {
        let mut out = self.fields.clone();
        out.insert("valid".to_string(), Value::Bool(self.valid));
        if let Some(event) = &self.event {
            out.insert(
                "event".to_string(),
                serde_json::to_value(event).unwrap_or(Value::Null),
            );
        }
        if let Some(error) = &self.error {
            out.insert("error".to_string(), Value::String(error.clone()));
        }
        Value::Object(out)
    }
}

fn status_output(status: &str, event_type: &str) -> HandlerOutput {
    let mut out = Map::new();
    out.insert("status".to_string(), Value::String(status.to_string()));
    out.insert("event".to_string(), Value::String(event_type.to_string()));
    out
}

fn processed_handler() -> EventHandler {
    Arc::new(
        |event: WebhookEvent| -> BoxFuture<'static, Result<HandlerOutput, HandlerError>> {
            Box::pin(async move { Ok(status_output("processed", event.event_type())) })
        },
    )
}

fn unknown_event_handler() -> EventHandler {
    Arc::new(
        |event: WebhookEvent| -> BoxFuture<'static, Result<HandlerOutput, HandlerError>> {
            Box::pin(async move { Ok(status_output("ignored", event.event_type())) })
        },
    )
}

/// Routes verified webhook events to handlers keyed by event type.
///
/// Each dispatcher owns its registry; two dispatchers never share handlers.
/// Registration takes a short write lock, so handlers may be added while
/// other tasks are dispatching.
pub struct EventDispatcher {
    verifier: WebhookVerifier,
    tolerance_seconds: i64,
    handlers: RwLock<HashMap<String, EventHandler>>,
    fallback: EventHandler,
}

impl EventDispatcher {
    /// Create a dispatcher with the default handlers and a 5 minute replay window.
    pub fn new(verifier: WebhookVerifier) -> Self {
        let handlers = DEFAULT_EVENT_TYPES
            .iter()
            .map(|event_type| (event_type.to_string(), processed_handler()))
            .collect();

        Self {
            verifier,
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            handlers: RwLock::new(handlers),
            fallback: unknown_event_handler(),
        }
    }

    /// Create a dispatcher whose registry starts from the defaults plus `handlers`.
    ///
    /// Entries in `handlers` replace defaults registered under the same type.
    pub fn with_handlers<I, K>(verifier: WebhookVerifier, handlers: I) -> Self
    where
        I: IntoIterator<Item = (K, EventHandler)>,
        K: Into<String>,
    {
        let dispatcher = Self::new(verifier);
        dispatcher
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handlers.into_iter().map(|(k, h)| (k.into(), h)));
        dispatcher
    }

    /// Set the replay window applied by [`handle`](Self::handle).
    pub fn with_tolerance(mut self, tolerance_seconds: i64) -> Self {
        self.tolerance_seconds = tolerance_seconds;
        self
    }

    /// The replay window in seconds.
    pub fn tolerance_seconds(&self) -> i64 {
        self.tolerance_seconds
    }

    /// The underlying signature verifier.
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(WebhookEvent) -> BoxFuture<'static, Result<HandlerOutput, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_type.into(), handler);
    }

    /// Remove the handler for `event_type`. No-op if none is registered.
    pub fn off(&self, event_type: &str) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_type);
    }

    /// Whether a handler is registered for `event_type`.
    pub fn has_handler(&self, event_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_type)
    }

    /// All event types with a registered handler, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    fn resolve(&self, event_type: &str) -> EventHandler {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Verify, parse and route one webhook delivery.
    ///
    /// Verification, parse and replay-window failures come back as
    /// `Ok` with `valid == false`.
    ///
    /// # Errors
    /// `HandlerFailed` when the resolved handler itself returns an error.
    /// Handler errors are not folded into the rejection envelope.
    pub async fn handle(
        &self,
        payload: impl AsRef<[u8]>,
        signature: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<DispatchOutcome, LicenseKitError> {
        let event = match self.verifier.parse_payload(payload, signature, algorithm) {
            Ok(event) => event,
            Err(e) => return Ok(DispatchOutcome::rejected(e.to_string())),
        };

        if !self.verifier.verify_timestamp(&event, self.tolerance_seconds) {
            return Ok(DispatchOutcome::rejected(format!(
                "Webhook timestamp too old or invalid (tolerance {}s)",
                self.tolerance_seconds
            )));
        }

        let event_type = event.event_type().to_string();
        let handler = self.resolve(&event_type);
        tracing::debug!(event_id = event.id(), %event_type, "dispatching webhook event");

        let fields = handler(event.clone())
            .await
            .map_err(|source| LicenseKitError::HandlerFailed {
                event_type: event_type.clone(),
                source,
            })?;

        Ok(DispatchOutcome::routed(event, fields))
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("verifier", &self.verifier)
            .field("tolerance_seconds", &self.tolerance_seconds)
            .field("registered_types", &self.registered_types())
            .finish()
    }
}
