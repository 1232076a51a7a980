//! Time budget helpers.
//!
//! Every operation that could run for an unbounded amount of time (probe
//! batches, lock waits, the whole aggregation request) is handed a
//! [`Deadline`] rather than a fixed per-call timeout. The remaining budget is
//! always recomputed from a monotonic start, so nested steps never silently
//! compound their timeouts.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A monotonic point in time by which some work must be finished.
///
/// Cheap to copy: pass it down by value to anything that might wait.
///
/// # Examples
///
/// ```
/// use debrix_asyncutils::Deadline;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let deadline = Deadline::after(Duration::from_secs(20));
/// assert!(!deadline.is_expired());
/// assert!(deadline.remaining() <= Duration::from_secs(20));
///
/// let answer = deadline.within(async { 42 }).await;
/// assert_eq!(answer, Some(42));
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    end: Instant,
}

impl Deadline {
    /// Start a new budget of `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let start = Instant::now();
        Self { start, end: start + budget }
    }

    /// Time since the budget started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.end
    }

    /// Derive a child deadline that ends after `limit`, or at this deadline,
    /// whichever comes first.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_asyncutils::Deadline;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let request = Deadline::after(Duration::from_secs(5));
    /// let lock_wait = request.capped(Duration::from_secs(30));
    /// assert!(lock_wait.remaining() <= Duration::from_secs(5));
    /// # }
    /// ```
    pub fn capped(&self, limit: Duration) -> Self {
        let now = Instant::now();
        Self { start: now, end: self.end.min(now + limit) }
    }

    /// Run a future to completion, unless the deadline passes first.
    ///
    /// Returns `None` if the deadline was reached; the future is dropped.
    pub async fn within<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::time::timeout_at(self.end, future).await.ok()
    }

    /// Sleep for `duration`, but never past the deadline.
    pub async fn sleep(&self, duration: Duration) {
        let wake = (Instant::now() + duration).min(self.end);
        tokio::time::sleep_until(wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_decreases_with_time() {
        let deadline = Deadline::after(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(6));
        assert_eq!(deadline.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_saturates_at_zero() {
        let deadline = Deadline::after(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[rstest]
    #[case::limit_shorter(10, 3, 3)]
    #[case::limit_longer(5, 30, 5)]
    #[case::equal(7, 7, 7)]
    #[tokio::test(start_paused = true)]
    async fn test_capped_takes_earliest_end(#[case] budget: u64, #[case] limit: u64, #[case] expected: u64) {
        let deadline = Deadline::after(Duration::from_secs(budget));
        let child = deadline.capped(Duration::from_secs(limit));
        assert_eq!(child.remaining(), Duration::from_secs(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_times_out() {
        let deadline = Deadline::after(Duration::from_secs(2));
        let result = deadline
            .within(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "finished"
            })
            .await;
        assert_eq!(result, None);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_completes_in_time() {
        let deadline = Deadline::after(Duration::from_secs(2));
        let result = deadline.within(async { "finished" }).await;
        assert_eq!(result, Some("finished"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_never_overshoots() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let before = Instant::now();
        deadline.sleep(Duration::from_secs(60)).await;
        assert_eq!(before.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_budget_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        // Ready futures still complete: the timer is only checked when pending.
        assert_eq!(deadline.within(async { 1 }).await, Some(1));
    }
}
