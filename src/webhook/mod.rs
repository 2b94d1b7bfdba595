//! Inbound webhook events and their dispatch.

pub mod dispatcher;
pub mod event;

pub use dispatcher::{DispatchOutcome, EventDispatcher, EventHandler, HandlerOutput};
pub use event::WebhookEvent;
