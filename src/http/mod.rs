//! HTTP surface: middleware, key derivation, handlers, and the server.

pub mod handlers;
pub mod key;
pub mod middleware;
pub mod server;

pub use key::{ClientRouteKey, KeyExtractor, UNKNOWN_CLIENT};
pub use middleware::{RateLimitLayer, RateLimitService};
pub use server::HttpServer;
