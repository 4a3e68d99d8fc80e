//! Rate limiting logic and state management.

mod backend;
mod counter;
mod limiter;
pub mod rules;
mod sweep;

pub use backend::RateLimiterBackend;
pub use counter::{Decision, WindowCounter};
pub use limiter::RateLimiter;
pub use rules::{RateLimitPolicy, RouteRule, RouteRules};
pub use sweep::spawn_sweeper;
