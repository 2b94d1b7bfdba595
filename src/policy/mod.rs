//! Caller-side license rules.

pub mod access;
