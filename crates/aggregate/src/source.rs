//! Scraping sources, and the cache every search goes through.

use crate::error::Result;
use async_trait::async_trait;
use debrix_asyncutils::Deadline;
use debrix_model::{ContentQuery, LinkCandidate};
use debrix_store::{ContentCache, SearchLock, cache_key};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Something that finds download links for a title.
///
/// Searches may be slow; callers go through [`CachedSource`] rather than
/// calling this directly.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name stamped on candidates, used for provider restrictions and cache
    /// keys.
    fn name(&self) -> &str;

    async fn search(&self, query: &ContentQuery) -> Result<Vec<LinkCandidate>>;
}

pub type SourceHandle = Arc<dyn Source + Send + Sync>;

/// Read-through cache in front of a [`Source`].
///
/// A hit answers immediately. A miss takes the scrape lock for the key,
/// looks at the cache again (another instance may have just filled it),
/// scrapes, and caches whatever it found unless that was nothing.
#[derive(Clone)]
pub struct CachedSource {
    source: SourceHandle,
    cache: ContentCache,
    lock: SearchLock,
}
impl CachedSource {
    pub fn new(source: SourceHandle, cache: ContentCache, lock: SearchLock) -> Self {
        Self { source, cache, lock }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Search, never failing: errors and timeouts are logged and give no
    /// results. Episode searches only return that episode's links.
    #[instrument("searching source", skip_all, fields(source = self.source.name(), title = %query.title))]
    pub async fn search(&self, query: &ContentQuery, deadline: Deadline) -> Vec<LinkCandidate> {
        let key = cache_key(&query.cache_category(self.source.name()), &query.title, query.year.as_deref());
        let key = key.as_str();
        if let Some(hit) = self.cached(key).await {
            return only_episode(hit, query);
        }
        let results = self
            .lock
            .scoped(key, deadline, |state| async move {
                if let Some(hit) = self.cached(key).await {
                    debug!(?state, "filled while waiting for the lock");
                    return hit;
                }
                let results = match deadline.within(self.source.search(query)).await {
                    Some(Ok(results)) => results,
                    Some(Err(error)) => {
                        warn!(%error, "search failed");
                        return Vec::new();
                    },
                    None => {
                        warn!("search ran out of time");
                        return Vec::new();
                    },
                };
                if !results.is_empty()
                    && let Err(error) = self.cache.set(key, &results).await
                {
                    warn!(%error, "could not cache search results");
                }
                results
            })
            .await;
        only_episode(results, query)
    }

    /// A cache read that fails is a miss.
    async fn cached(&self, key: &str) -> Option<Vec<LinkCandidate>> {
        match self.cache.get(key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(key, %error, "content cache unavailable");
                None
            },
        }
    }
}

fn only_episode(results: Vec<LinkCandidate>, query: &ContentQuery) -> Vec<LinkCandidate> {
    let Some((season, episode)) = query.episode_pair() else {
        return results;
    };
    let (season, episode) = (season.to_string(), episode.to_string());
    let before = results.len();
    let filtered: Vec<LinkCandidate> = results.into_iter().filter(|c| c.is_episode(&season, &episode)).collect();
    debug!(before, after = filtered.len(), "kept S{season}E{episode} only");
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StaticSource;
    use debrix_model::Category;
    use debrix_store::Database;
    use std::time::Duration;

    fn cached_source(db: &Database, source: StaticSource) -> (Arc<StaticSource>, CachedSource) {
        let source = Arc::new(source);
        let handle: SourceHandle = source.clone();
        (source, CachedSource::new(handle, ContentCache::from(db), SearchLock::from(db)))
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_second_search_is_served_from_cache() {
        let db = Database::connect_in_memory().await.unwrap();
        let (source, cached) = cached_source(&db, StaticSource::new("wawacity").with_result(LinkCandidate::new("https://a", "wawacity")));
        let query = ContentQuery::movie("Heat", Some("1995".to_string()));

        assert_eq!(cached.search(&query, deadline()).await.len(), 1);
        assert_eq!(cached.search(&query, deadline()).await.len(), 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let db = Database::connect_in_memory().await.unwrap();
        let (source, cached) = cached_source(&db, StaticSource::new("wawacity"));
        let query = ContentQuery::movie("Heat", None);

        assert!(cached.search(&query, deadline()).await.is_empty());
        assert!(cached.search(&query, deadline()).await.is_empty());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_gives_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let (_, cached) = cached_source(&db, StaticSource::new("darki-api").failing());
        assert!(cached.search(&ContentQuery::movie("Heat", None), deadline()).await.is_empty());
    }

    #[tokio::test]
    async fn test_episode_search_keeps_only_that_episode() {
        let db = Database::connect_in_memory().await.unwrap();
        let (_, cached) = cached_source(
            &db,
            StaticSource::new("wawacity")
                .with_result(LinkCandidate::new("https://e3", "wawacity").with_episode("1", "03"))
                .with_result(LinkCandidate::new("https://e4", "wawacity").with_episode("1", "4"))
                .with_result(LinkCandidate::new("https://pack", "wawacity")),
        );
        let query = ContentQuery::episode_of(Category::Series, "The Office", 1, 3);
        let results = cached.search(&query, deadline()).await;
        assert_eq!(results.iter().map(|c| c.url.as_str()).collect::<Vec<_>>(), ["https://e3"]);
    }

    #[tokio::test]
    async fn test_episodes_are_cached_separately() {
        let db = Database::connect_in_memory().await.unwrap();
        let (source, cached) = cached_source(
            &db,
            StaticSource::new("darki-api").with_result(LinkCandidate::new("https://e", "darki-api").with_episode("1", "1")),
        );
        cached.search(&ContentQuery::episode_of(Category::Series, "Dark", 1, 1), deadline()).await;
        cached.search(&ContentQuery::episode_of(Category::Series, "Dark", 1, 2), deadline()).await;
        assert_eq!(source.calls(), 2);
    }
}
