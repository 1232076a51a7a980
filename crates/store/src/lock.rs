//! Cross-process scrape lock.
//!
//! Several instances of the service can share one database, and scraping a
//! catalog is slow enough that we don't want two of them scraping the same
//! title at once. A lock is a row in `scrape_lock`: inserting the row claims
//! it, deleting it releases it, and its `expires_at` guarantees a crashed
//! holder can't keep it forever.
//!
//! There's no compare-and-swap here. Claiming is an insert-if-absent
//! followed by a read-back of the holder column: whoever's identity is in
//! the row owns the lock.

use crate::Database;
use crate::db::{expires_in, unix_now};
use crate::error::{ErrorKind, Result};
use debrix_asyncutils::Deadline;
use exn::ResultExt;
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of waiting for a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// This caller holds the lock until it releases it (or the TTL lapses).
    Held,
    /// Gave up waiting. The caller proceeds without the lock and may end
    /// up duplicating work another holder is doing.
    TimedOut,
}

/// Factory for scrape locks sharing one configuration.
///
/// # Examples
///
/// ```
/// use debrix_asyncutils::Deadline;
/// use debrix_store::{Database, LockState, SearchLock};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::connect_in_memory().await?;
/// let lock = SearchLock::from(&db);
/// let deadline = Deadline::after(Duration::from_secs(5));
///
/// let results = lock
///     .scoped("wawacity_movie:heat:1995", deadline, |state| async move {
///         assert_eq!(state, LockState::Held);
///         vec!["scraped"]
///     })
///     .await;
/// assert_eq!(results, ["scraped"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SearchLock {
    pool: SqlitePool,
    ttl: Duration,
    wait_timeout: Duration,
    poll_interval: Duration,
}
impl From<&Database> for SearchLock {
    fn from(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            ttl: DEFAULT_LOCK_TTL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
impl SearchLock {
    /// How long a claimed lock stays valid if its holder never releases it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Longest time [`acquire`](Self::acquire) waits before giving up.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Unique identity for one acquisition. Two tasks in the same process
    /// must not share one, or both would read back "their" holder.
    fn new_holder() -> String {
        format!("{}_{}", Uuid::new_v4(), std::process::id())
    }

    // =========================================================================
    // Single attempts
    // =========================================================================

    /// Make one attempt at claiming `key`.
    ///
    /// Returns `None` when someone else currently holds the lock.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>> {
        let holder = Self::new_holder();
        // Self-heal: an expired row for this key belongs to nobody.
        sqlx::query(include_str!("../queries/purge_expired_lock.sql"))
            .bind(key)
            .bind(unix_now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/insert_lock.sql"))
            .bind(key)
            .bind(&holder)
            .bind(expires_in(self.ttl))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let current: Option<String> = sqlx::query_scalar(include_str!("../queries/get_lock_holder.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok((current.as_deref() == Some(holder.as_str())).then(|| LockGuard {
            lock: self.clone(),
            key: key.to_string(),
            holder: Some(holder),
        }))
    }

    /// Delete the lock row, but only while `holder` still owns it.
    async fn release_as(&self, key: &str, holder: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/release_lock.sql"))
            .bind(key)
            .bind(holder)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Wait for the lock on `key`, polling until the wait timeout or the
    /// caller's deadline (whichever is sooner).
    ///
    /// Never fails: store errors count as a failed attempt, and running out
    /// of time hands back a [`LockState::TimedOut`] guard.
    pub async fn acquire(&self, key: &str, deadline: Deadline) -> LockGuard {
        let wait = deadline.capped(self.wait_timeout);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.try_acquire(key).await {
                Ok(Some(guard)) => {
                    debug!(key, attempts, "scrape lock acquired");
                    return guard;
                },
                Ok(None) => {},
                Err(error) => warn!(key, %error, "scrape lock attempt failed"),
            }
            if wait.is_expired() {
                warn!(key, attempts, waited_ms = wait.elapsed().as_millis() as u64, "timed out waiting for scrape lock");
                return LockGuard { lock: self.clone(), key: key.to_string(), holder: None };
            }
            wait.sleep(self.poll_interval).await;
        }
    }

    /// Run `work` while holding the lock on `key`, releasing it afterwards.
    ///
    /// `work` still runs if the lock could not be acquired in time; it is
    /// told so through the [`LockState`] argument.
    pub async fn scoped<T, F, Fut>(&self, key: &str, deadline: Deadline, work: F) -> T
    where
        F: FnOnce(LockState) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire(key, deadline).await;
        let output = work(guard.state()).await;
        guard.release().await;
        output
    }
}

/// A claimed (or given-up-on) lock.
///
/// Release is explicit and async. A guard dropped without releasing simply
/// leaves the row to expire.
#[derive(Debug)]
#[must_use = "a held lock should be released"]
pub struct LockGuard {
    lock: SearchLock,
    key: String,
    holder: Option<String>,
}
impl LockGuard {
    pub fn state(&self) -> LockState {
        if self.holder.is_some() { LockState::Held } else { LockState::TimedOut }
    }

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    /// Release the lock if this guard holds it.
    ///
    /// A lock that expired and was re-claimed by someone else in the
    /// meantime is left alone.
    pub async fn release(self) {
        let Some(holder) = self.holder.as_deref() else {
            return;
        };
        match self.lock.release_as(&self.key, holder).await {
            Ok(true) => debug!(key = %self.key, "scrape lock released"),
            Ok(false) => warn!(key = %self.key, "scrape lock was no longer ours to release"),
            Err(error) => warn!(key = %self.key, %error, "failed to release scrape lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn lock() -> SearchLock {
        SearchLock::from(&Database::connect_in_memory().await.unwrap())
            .with_poll_interval(Duration::from_millis(10))
            .with_wait_timeout(Duration::from_millis(200))
    }

    async fn holder_of(lock: &SearchLock, key: &str) -> Option<String> {
        sqlx::query_scalar(include_str!("../queries/get_lock_holder.sql"))
            .bind(key)
            .fetch_optional(&lock.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_attempt_is_refused() {
        let lock = lock().await;
        let first = lock.try_acquire("k").await.unwrap();
        assert!(first.is_some());
        assert!(lock.try_acquire("k").await.unwrap().is_none());
        // Other keys are unaffected.
        assert!(lock.try_acquire("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let lock = lock().await;
        let guard = lock.try_acquire("k").await.unwrap().unwrap();
        guard.release().await;
        assert!(holder_of(&lock, "k").await.is_none());
        assert!(lock.try_acquire("k").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_have_one_winner() {
        let lock = lock().await;
        let winners = Arc::new(AtomicUsize::new(0));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let lock = lock.clone();
            let winners = winners.clone();
            tasks.spawn(async move {
                if let Some(guard) = lock.try_acquire("contended").await.unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                    // Keep holding: nobody else may win while we do.
                    std::mem::forget(guard);
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_lock_is_reclaimed() {
        let lock = lock().await;
        let stale = lock.clone().with_ttl(Duration::ZERO).try_acquire("k").await.unwrap().unwrap();
        let fresh = lock.try_acquire("k").await.unwrap().expect("expired row should be purged");
        // The stale holder must not be able to release the new holder's lock.
        stale.release().await;
        assert_eq!(holder_of(&lock, "k").await.as_deref(), fresh.holder.as_deref());
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let lock = lock().await;
        let _held = lock.try_acquire("k").await.unwrap().unwrap();
        let started = tokio::time::Instant::now();
        let guard = lock.acquire("k", Deadline::after(Duration::from_secs(10))).await;
        assert_eq!(guard.state(), LockState::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(5));
        // Releasing a timed out guard is a no-op.
        guard.release().await;
        assert!(holder_of(&lock, "k").await.is_some());
    }

    #[tokio::test]
    async fn test_acquire_respects_caller_deadline() {
        let lock = lock().await.with_wait_timeout(Duration::from_secs(30));
        let _held = lock.try_acquire("k").await.unwrap().unwrap();
        let started = tokio::time::Instant::now();
        let guard = lock.acquire("k", Deadline::after(Duration::from_millis(50))).await;
        assert!(!guard.is_held());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let lock = lock().await.with_wait_timeout(Duration::from_secs(5));
        let held = lock.try_acquire("k").await.unwrap().unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("k", Deadline::after(Duration::from_secs(5))).await.state() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        held.release().await;
        assert_eq!(waiter.await.unwrap(), LockState::Held);
    }

    #[tokio::test]
    async fn test_scoped_releases_afterwards() {
        let lock = lock().await;
        let state = lock.scoped("k", Deadline::after(Duration::from_secs(1)), |state| async move { state }).await;
        assert_eq!(state, LockState::Held);
        assert!(holder_of(&lock, "k").await.is_none());
    }
}
