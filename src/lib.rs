//! Turnstile - Sliding Window Rate Limiting Service
//!
//! This crate enforces per-identity, per-endpoint request quotas over a
//! trailing time window. Every request is recorded in a time-ordered log;
//! the log decides whether the request is admitted, throttled with a precise
//! retry delay, or denied because no quota is configured.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
