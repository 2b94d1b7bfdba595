//! Wire models for the license API.

pub mod models;
