//! HTTP client for the license management API.

pub mod api;
pub mod http;
pub mod retry;
