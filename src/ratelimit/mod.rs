//! Sliding-window rate limiting: request keys, timestamp logs, window
//! evaluation and the decision service that composes them.

mod key;
mod limiter;
mod quota;
mod store;
mod sweeper;
mod window;

pub use key::{normalize_endpoint, RequestKey};
pub use limiter::{CleanupMode, Decision, DenyReason, RateLimiter};
pub use quota::{InMemoryQuotaStore, QuotaStore, RateLimit, DEFAULT_LIMIT_NAMESPACE};
pub use store::{
    read_newest_first, InMemoryTimestampLog, LogOrder, TimestampLog, DEFAULT_REQUEST_NAMESPACE,
};
pub use sweeper::{spawn_sweeper, sweep_once};
pub use window::{
    boundary_index, count_in_window, retry_after, EvaluationStrategy, SlidingWindow, Timestamp,
    WindowEvaluator, DEFAULT_WINDOW, MIN_RETRY_DELAY,
};
