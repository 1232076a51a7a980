//! Read-through cache for scraper results.

use crate::Database;
use crate::db::{expires_in, unix_now};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONTENT_TTL: Duration = Duration::from_secs(60 * 60);

/// Keyed, expiring store of serialized payloads.
///
/// Payloads are opaque JSON blobs; the cache only knows their key and when
/// they stop being valid. Expired rows are never returned, even before the
/// sweeper gets around to deleting them.
#[derive(Debug, Clone)]
pub struct ContentCache {
    pool: SqlitePool,
    ttl: Duration,
}
impl From<&Database> for ContentCache {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), ttl: DEFAULT_CONTENT_TTL }
    }
}
impl ContentCache {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a live payload.
    ///
    /// A payload that no longer deserializes into `T` (say, after an upgrade
    /// changed its shape) is reported as a miss rather than an error, so it
    /// simply gets overwritten by the next scrape.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let payload: Option<String> = sqlx::query_scalar(include_str!("../queries/get_content.sql"))
            .bind(key)
            .bind(unix_now())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(payload) = payload else {
            debug!(key, "content cache miss");
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => {
                debug!(key, "content cache hit");
                Ok(Some(value))
            },
            Err(error) => {
                warn!(key, %error, "discarding undecodable cache payload");
                Ok(None)
            },
        }
    }

    /// Insert or replace a payload, valid for the configured TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("cache payload"))?;
        sqlx::query(include_str!("../queries/upsert_content.sql"))
            .bind(key)
            .bind(payload)
            .bind(expires_in(self.ttl))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        debug!(key, ttl_secs = self.ttl.as_secs(), "content cached");
        Ok(())
    }
}
