//! Cryptographic primitives for webhook verification.

pub mod freshness;
pub mod signature;
