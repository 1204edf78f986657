//! HTTP surface: bearer authentication, the quota guard and the demo API.

mod auth;
mod guard;
mod routes;
mod server;

use std::sync::Arc;
use std::time::Duration;

use crate::ratelimit::RateLimiter;

pub use auth::bearer_token;
pub use guard::enforce_quota;
pub use routes::router;
pub use server::HttpServer;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    limiter: Arc<RateLimiter>,
    simulate_delay: Duration,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, simulate_delay: Duration) -> Self {
        Self {
            limiter,
            simulate_delay,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn simulate_delay(&self) -> Duration {
        self.simulate_delay
    }
}
