//! HTTP-backed scraping sources and metadata lookup.
//!
//! The scrapers and the metadata service run as separate services; these
//! are the thin clients the aggregator talks to them through.

use async_trait::async_trait;
use debrix_aggregate::error::{ErrorKind, Result};
use debrix_aggregate::{MetadataResolver, Source};
use debrix_model::{ContentId, ContentQuery, LinkCandidate, Metadata, normalize_quality};
use exn::ResultExt;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

/// A scraper answering `GET {url}?title=…&category=…` with a JSON array of
/// candidates.
pub struct RemoteSource {
    client: Client,
    name: String,
    url: String,
}
impl RemoteSource {
    pub fn new(client: Client, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { client, name: name.into(), url: url.into() }
    }
}

#[async_trait]
impl Source for RemoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument("scraping", skip_all, fields(source = %self.name))]
    async fn search(&self, query: &ContentQuery) -> Result<Vec<LinkCandidate>> {
        let failed = || ErrorKind::Source(self.name.clone());
        let mut params: Vec<(&str, String)> =
            vec![("title", query.title.clone()), ("category", query.category.to_string())];
        if let Some(year) = &query.year {
            params.push(("year", year.clone()));
        }
        if let Some(season) = query.season {
            params.push(("season", season.to_string()));
        }
        if let Some(episode) = query.episode {
            params.push(("episode", episode.to_string()));
        }
        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .or_raise(failed)?;
        let mut candidates: Vec<LinkCandidate> = response.json().await.or_raise(failed)?;
        // Candidates are attributed to the configured name, whatever the
        // scraper calls itself.
        for candidate in &mut candidates {
            candidate.source = self.name.clone();
            candidate.quality = normalize_quality(&candidate.quality);
        }
        debug!(found = candidates.len(), "scraped");
        Ok(candidates)
    }
}

/// Metadata service answering `GET {url}/{content_id}` with JSON metadata,
/// or 404 for unknown content.
pub struct RemoteMetadata {
    client: Client,
    url: String,
}
impl RemoteMetadata {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl MetadataResolver for RemoteMetadata {
    #[instrument("looking up metadata", skip_all, fields(id = %id))]
    async fn resolve(&self, id: &ContentId) -> Result<Option<Metadata>> {
        let url = format!("{}/{}", self.url.trim_end_matches('/'), urlencoding::encode(&id.to_string()));
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Metadata)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("unknown content");
            return Ok(None);
        }
        let response = response.error_for_status().or_raise(|| ErrorKind::Metadata)?;
        Ok(Some(response.json().await.or_raise(|| ErrorKind::Metadata)?))
    }
}
