//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::key::RequestKey;
use super::quota::QuotaStore;
use super::store::{read_newest_first, TimestampLog, DEFAULT_REQUEST_NAMESPACE};
use super::window::{EvaluationStrategy, SlidingWindow, Timestamp, WindowEvaluator};
use crate::error::Result;

/// Why a request was refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No limit is configured for this endpoint and identity
    NoPermission,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::NoPermission => write!(f, "no permission for this endpoint"),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed with the request
    Admit,
    /// Over quota; the caller should retry after the given delay
    Throttled { retry_after: Duration },
    /// Not allowed at all, retrying will not help
    Denied(DenyReason),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// When stale entries are removed from a key's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    /// Prune the key before every evaluation
    #[default]
    Eager,
    /// Leave the log untouched and let the background sweeper clean up
    Lazy,
}

/// The decision service composing the quota store, the timestamp log and
/// the window evaluator.
///
/// This struct is thread-safe and can be shared across multiple tasks.
/// Different keys never contend on anything but the backends themselves.
pub struct RateLimiter {
    log: Arc<dyn TimestampLog>,
    quotas: Arc<dyn QuotaStore>,
    evaluator: WindowEvaluator,
    cleanup: CleanupMode,
    request_namespace: String,
}

impl RateLimiter {
    /// Create a rate limiter with a 60 second window, retry-delay evaluation
    /// and eager cleanup.
    pub fn new(log: Arc<dyn TimestampLog>, quotas: Arc<dyn QuotaStore>) -> Self {
        Self {
            log,
            quotas,
            evaluator: WindowEvaluator::default(),
            cleanup: CleanupMode::default(),
            request_namespace: DEFAULT_REQUEST_NAMESPACE.to_string(),
        }
    }

    pub fn with_evaluator(mut self, window: SlidingWindow, strategy: EvaluationStrategy) -> Self {
        self.evaluator = WindowEvaluator::new(window, strategy);
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupMode) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_request_namespace(mut self, namespace: &str) -> Self {
        self.request_namespace = namespace.to_string();
        self
    }

    pub fn window(&self) -> &SlidingWindow {
        self.evaluator.window()
    }

    pub fn strategy(&self) -> EvaluationStrategy {
        self.evaluator.strategy()
    }

    pub fn cleanup_mode(&self) -> CleanupMode {
        self.cleanup
    }

    /// Storage key of the timestamp log for a request key.
    pub fn log_key(&self, key: &RequestKey) -> String {
        key.namespaced(&self.request_namespace)
    }

    /// Check the rate limit for a request arriving now.
    pub async fn check(&self, endpoint: &str, identity: &str) -> Result<Decision> {
        self.check_at(&RequestKey::new(endpoint, identity), Utc::now())
            .await
    }

    /// Check the rate limit for a request arriving at `now`.
    ///
    /// The attempt is recorded before evaluation whether or not it ends up
    /// admitted, so every decision counts its own request. Storage failures
    /// abort the check; they are never turned into a decision.
    pub async fn check_at(&self, key: &RequestKey, now: Timestamp) -> Result<Decision> {
        let limit = match self.quotas.get(key).await? {
            Some(limit) => limit,
            None => {
                debug!(key = %key, "No rate limit configured, denying");
                return Ok(Decision::Denied(DenyReason::NoPermission));
            }
        };

        let log_key = self.log_key(key);
        self.log.append(&log_key, now).await?;

        let window_start = self.window().start(now);
        if self.cleanup == CleanupMode::Eager {
            self.log.prune(&log_key, window_start).await?;
        }

        let delay = match self.evaluator.strategy() {
            EvaluationStrategy::RetryDelay => {
                let entries = read_newest_first(self.log.as_ref(), &log_key).await?;
                self.evaluator.evaluate(&entries, now, limit)
            }
            EvaluationStrategy::CountOnly => {
                let in_window = self.log.count(&log_key, window_start).await?;
                self.evaluator.evaluate_count(in_window, limit)
            }
        };

        trace!(
            key = %key,
            limit = limit.get(),
            retry_after_ms = delay.as_millis() as u64,
            "Rate limit evaluated"
        );

        if delay.is_zero() {
            Ok(Decision::Admit)
        } else {
            debug!(
                key = %key,
                limit = limit.get(),
                retry_after_ms = delay.as_millis() as u64,
                "Rate limit exceeded"
            );
            Ok(Decision::Throttled { retry_after: delay })
        }
    }
}
