//! Sliding window evaluation over request timestamp logs.
//!
//! The evaluator is pure: it never touches a store. Sequences handed to the
//! retry-delay evaluation must be ordered newest-first and must already
//! include the request being evaluated.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::quota::RateLimit;

/// A single recorded request instant.
pub type Timestamp = DateTime<Utc>;

/// Default trailing window size.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Smallest delay reported for an over-limit subject. An entry sitting exactly
/// on the window start is still inside, so it needs one more tick to leave.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Trailing time window `[now - size, now]`, inclusive of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    size: Duration,
    span: chrono::Duration,
}

impl SlidingWindow {
    /// Create a window of the given size, truncated to millisecond precision.
    pub fn new(size: Duration) -> Self {
        let millis = i64::try_from(size.as_millis()).unwrap_or(i64::MAX);
        Self {
            size: Duration::from_millis(millis as u64),
            span: chrono::Duration::milliseconds(millis),
        }
    }

    /// Get the duration of this window.
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Oldest instant still inside the window ending at `now`.
    pub fn start(&self, now: Timestamp) -> Timestamp {
        now.checked_sub_signed(self.span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether `at` lies inside the window ending at `now`.
    pub fn contains(&self, at: Timestamp, now: Timestamp) -> bool {
        at >= self.start(now)
    }

    /// Time from `now` until an entry recorded at `at` leaves the window.
    pub fn remaining_for(&self, at: Timestamp, now: Timestamp) -> Duration {
        let exits_at = at
            .checked_add_signed(self.span)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (exits_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// How a decision is derived from the timestamp log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    /// Derive the exact delay until the subject is back within quota
    #[default]
    RetryDelay,
    /// Only compare the in-window count against the limit
    CountOnly,
}

/// Count the entries at or after `window_start`. Works for any ordering.
pub fn count_in_window(entries: &[Timestamp], window_start: Timestamp) -> usize {
    entries.iter().filter(|at| **at >= window_start).count()
}

/// Index of the first entry strictly older than `window_start`, scanning a
/// newest-first sequence from the newest end.
pub fn boundary_index(newest_first: &[Timestamp], window_start: Timestamp) -> Option<usize> {
    newest_first.iter().position(|at| *at < window_start)
}

/// Delay until a request would be admitted again, or zero if it is admitted now.
///
/// `newest_first` must include the current request. When more than `limit`
/// entries are in the window, the subject waits until the `limit`-th most
/// recent entry leaves the window. An over-limit subject never gets a zero
/// delay, even when that entry sits exactly on the window start.
pub fn retry_after(
    newest_first: &[Timestamp],
    now: Timestamp,
    window: &SlidingWindow,
    limit: RateLimit,
) -> Duration {
    let limit = limit.get() as usize;

    // Nominally within quota, no timestamp arithmetic needed.
    if newest_first.len() <= limit {
        return Duration::ZERO;
    }

    let window_start = window.start(now);
    let in_window = boundary_index(newest_first, window_start).unwrap_or(newest_first.len());

    trace!(
        entries = newest_first.len(),
        in_window = in_window,
        limit = limit,
        "Evaluating retry delay"
    );

    if in_window <= limit {
        return Duration::ZERO;
    }

    window
        .remaining_for(newest_first[limit - 1], now)
        .max(MIN_RETRY_DELAY)
}

/// Applies an [`EvaluationStrategy`] over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowEvaluator {
    window: SlidingWindow,
    strategy: EvaluationStrategy,
}

impl WindowEvaluator {
    pub fn new(window: SlidingWindow, strategy: EvaluationStrategy) -> Self {
        Self { window, strategy }
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn strategy(&self) -> EvaluationStrategy {
        self.strategy
    }

    /// Evaluate a newest-first sequence. A zero delay means admit.
    ///
    /// The count-only strategy has no boundary information, so when over
    /// limit it advises waiting a full window.
    pub fn evaluate(&self, newest_first: &[Timestamp], now: Timestamp, limit: RateLimit) -> Duration {
        match self.strategy {
            EvaluationStrategy::RetryDelay => retry_after(newest_first, now, &self.window, limit),
            EvaluationStrategy::CountOnly => {
                self.evaluate_count(count_in_window(newest_first, self.window.start(now)), limit)
            }
        }
    }

    /// Count-mode decision from an already computed in-window count.
    pub fn evaluate_count(&self, in_window: usize, limit: RateLimit) -> Duration {
        if in_window > limit.get() as usize {
            self.window.size()
        } else {
            Duration::ZERO
        }
    }
}
