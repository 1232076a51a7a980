//! Expiry sweep.
//!
//! Readers ignore expired rows on their own, so sweeping is purely about
//! keeping the tables small. It's the only place rows get deleted, apart
//! from a lock holder releasing its own lock.

use crate::Database;
use crate::db::unix_now;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Rows deleted by one sweep, per table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub content: u64,
    pub locks: u64,
    pub dead_links: u64,
}
impl SweepReport {
    pub fn total(&self) -> u64 {
        self.content + self.locks + self.dead_links
    }
}

impl Database {
    /// Delete every row whose `expires_at` has passed.
    #[instrument("sweeping expired rows", skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = unix_now();
        let delete = |sql: &'static str| async move {
            sqlx::query(sql)
                .bind(now)
                .execute(self.pool())
                .await
                .map(|result| result.rows_affected())
                .or_raise(|| ErrorKind::Database)
        };
        let report = SweepReport {
            content: delete(include_str!("../queries/sweep_content.sql")).await?,
            locks: delete(include_str!("../queries/sweep_locks.sql")).await?,
            dead_links: delete(include_str!("../queries/sweep_dead_links.sql")).await?,
        };
        if report.total() > 0 {
            info!(content = report.content, locks = report.locks, dead_links = report.dead_links, "swept expired rows");
        } else {
            debug!("nothing to sweep");
        }
        Ok(report)
    }
}

/// Background task sweeping the store on a fixed interval.
#[derive(Debug, Clone)]
pub struct Sweeper {
    db: Database,
    interval: Duration,
}
impl Sweeper {
    pub fn new(db: Database, interval: Duration) -> Self {
        Self { db, interval }
    }

    /// Start sweeping on the current runtime. The first sweep runs
    /// immediately. Abort the returned handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = self.db.sweep().await {
                    warn!(%error, "sweep failed, retrying next interval");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentCache, DeadLinks, SearchLock};

    #[tokio::test]
    async fn test_sweep_removes_only_expired_rows() {
        let db = Database::connect_in_memory().await.unwrap();
        let expired_cache = ContentCache::from(&db).with_ttl(Duration::ZERO);
        let live_cache = ContentCache::from(&db);
        expired_cache.set("old", &[1]).await.unwrap();
        live_cache.set("new", &[2]).await.unwrap();
        DeadLinks::from(&db).with_ttl(Duration::ZERO).mark("https://gone").await.unwrap();
        DeadLinks::from(&db).mark("https://dead").await.unwrap();
        let stale = SearchLock::from(&db).with_ttl(Duration::ZERO).try_acquire("stale").await.unwrap();
        assert!(stale.is_some());

        let report = db.sweep().await.unwrap();
        assert_eq!(report, SweepReport { content: 1, locks: 1, dead_links: 1 });

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_cache").fetch_one(db.pool()).await.unwrap();
        assert_eq!(remaining, 1);
        assert!(DeadLinks::from(&db).is_dead("https://dead").await.unwrap());
        assert_eq!(db.sweep().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_runs_in_background() {
        let db = Database::connect_in_memory().await.unwrap();
        ContentCache::from(&db).with_ttl(Duration::ZERO).set("old", &[1]).await.unwrap();
        let handle = Sweeper::new(db.clone(), Duration::from_millis(10)).spawn();
        let mut remaining = 1i64;
        for _ in 0..100 {
            remaining = sqlx::query_scalar("SELECT COUNT(*) FROM content_cache").fetch_one(db.pool()).await.unwrap();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(remaining, 0);
    }
}
