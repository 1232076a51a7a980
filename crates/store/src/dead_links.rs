use crate::Database;
use crate::db::{expires_in, unix_now};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_DEAD_LINK_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Links a provider reported as permanently gone.
///
/// Marking is keyed on the raw URL. While the mark is live, nothing should
/// spend a provider call on the link again.
#[derive(Debug, Clone)]
pub struct DeadLinks {
    pool: SqlitePool,
    ttl: Duration,
}
impl From<&Database> for DeadLinks {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), ttl: DEFAULT_DEAD_LINK_TTL }
    }
}
impl DeadLinks {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn is_dead(&self, url: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(include_str!("../queries/is_dead_link.sql"))
            .bind(url)
            .bind(unix_now())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(exists != 0)
    }

    /// Mark a link dead for the configured TTL. Marking again extends it.
    pub async fn mark(&self, url: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_dead_link.sql"))
            .bind(url)
            .bind(expires_in(self.ttl))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        info!(url, ttl_days = self.ttl.as_secs() / 86_400, "marked link as dead");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_link_is_alive() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!DeadLinks::from(&db).is_dead("https://1fichier.com/?a").await.unwrap());
    }

    #[tokio::test]
    async fn test_marked_link_is_dead() {
        let db = Database::connect_in_memory().await.unwrap();
        let dead = DeadLinks::from(&db);
        dead.mark("https://1fichier.com/?a").await.unwrap();
        assert!(dead.is_dead("https://1fichier.com/?a").await.unwrap());
        assert!(!dead.is_dead("https://1fichier.com/?b").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_mark_is_alive() {
        let db = Database::connect_in_memory().await.unwrap();
        let dead = DeadLinks::from(&db).with_ttl(Duration::ZERO);
        dead.mark("https://1fichier.com/?a").await.unwrap();
        assert!(!dead.is_dead("https://1fichier.com/?a").await.unwrap());
    }

    #[tokio::test]
    async fn test_marking_twice_is_fine() {
        let db = Database::connect_in_memory().await.unwrap();
        let dead = DeadLinks::from(&db);
        dead.mark("https://a").await.unwrap();
        dead.mark("https://a").await.unwrap();
        assert!(dead.is_dead("https://a").await.unwrap());
    }
}
