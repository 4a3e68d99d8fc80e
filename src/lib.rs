//! Floodgate - Per-Key HTTP Rate Limiting Service
//!
//! This crate implements a per-key rate limiting service: fixed-window
//! counters keyed by caller identity and endpoint class, a tower middleware
//! that short-circuits over-limit requests with 429 and quota headers, and
//! a background sweep that bounds memory growth from inactive keys.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod ratelimit;
