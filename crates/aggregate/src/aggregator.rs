//! Request orchestration: one content id in, ranked playback options out.

use crate::error::{ErrorKind, Result};
use crate::filter;
use crate::format::{Stream, StreamFormatter};
use crate::metadata::MetadataHandle;
use crate::source::CachedSource;
use debrix_asyncutils::Deadline;
use debrix_config::UserConfig;
use debrix_debrid::{Credential, EnrichOptions, Enriched, ProviderHandle, ProviderKind, Providers, enrich};
use debrix_model::{ContentId, ContentQuery, LinkCandidate, dedupe_and_rank};
use debrix_store::DeadLinks;
use exn::ResultExt;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_ADDON_NAME: &str = "debrix";

/// A provider the user enabled, with their key for it.
struct Active {
    handle: ProviderHandle,
    credential: Credential,
}

/// Enabled providers in the user's order. Unknown or unregistered services
/// are skipped.
fn active_providers(providers: &Providers, config: &UserConfig) -> Vec<Active> {
    config
        .providers
        .iter()
        .filter_map(|entry| {
            let kind: ProviderKind = match entry.service.parse() {
                Ok(kind) => kind,
                Err(error) => {
                    warn!(%error, "skipping provider");
                    return None;
                },
            };
            let Some(handle) = providers.get(kind) else {
                warn!(provider = %kind, "provider not available");
                return None;
            };
            Some(Active {
                handle: handle.clone(),
                credential: Credential::new(entry.api_key.clone()).with_usenet(config.enable_usenet),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct Aggregator {
    sources: Vec<CachedSource>,
    metadata: MetadataHandle,
    providers: Providers,
    dead_links: DeadLinks,
    options: EnrichOptions,
    addon_name: String,
}
impl Aggregator {
    pub fn new(metadata: MetadataHandle, providers: Providers, dead_links: DeadLinks) -> Self {
        Self {
            sources: Vec::new(),
            metadata,
            providers,
            dead_links,
            options: EnrichOptions::default(),
            addon_name: DEFAULT_ADDON_NAME.to_string(),
        }
    }

    pub fn with_source(mut self, source: CachedSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_options(mut self, options: EnrichOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_addon_name(mut self, name: impl Into<String>) -> Self {
        self.addon_name = name.into();
        self
    }

    /// Playback options for `content_id`, best first.
    ///
    /// Everything after the metadata lookup degrades instead of failing: a
    /// source or provider that misbehaves just contributes nothing. The
    /// whole request is bounded by the user's timeout.
    #[instrument("gathering streams", skip_all, fields(content_id = %content_id))]
    pub async fn streams(&self, content_id: &str, config: &UserConfig, base_url: &str) -> Result<Vec<Stream>> {
        let deadline = Deadline::after(config.timeout());
        let id: ContentId = content_id.parse::<ContentId>().or_raise(|| ErrorKind::InvalidContentId(content_id.to_string()))?;

        let active = active_providers(&self.providers, config);
        if active.is_empty() {
            warn!("no usable provider configured");
            return Ok(Vec::new());
        }

        let Some(metadata) = self.metadata.resolve(&id).await.or_raise(|| ErrorKind::Metadata)? else {
            info!("unknown content");
            return Ok(Vec::new());
        };
        let mut query = ContentQuery::from(metadata);
        query.season = query.season.or(id.season());
        query.episode = query.episode.or(id.episode());

        let candidates = self.search(&query, &active, deadline).await;
        if candidates.is_empty() {
            info!(title = %query.title, "nothing found");
            return Ok(Vec::new());
        }
        let candidates = filter::candidates(dedupe_and_rank(candidates), config);

        let options = self.options.with_cached_only(config.cached_only);
        let enriched = join_all(active.iter().enumerate().map(|(order, provider)| {
            let candidates = candidates.clone();
            async move {
                let results =
                    enrich(provider.handle.as_ref(), candidates, &provider.credential, deadline, options).await;
                results.into_iter().map(move |item| (order, item))
            }
        }))
        .await;
        let mut ranked: Vec<(usize, Enriched)> = enriched.into_iter().flatten().collect();
        ranked.sort_by(|(a_order, a), (b_order, b)| {
            b.cached
                .cmp(&a.cached)
                .then_with(|| a.candidate.quality_rank().cmp(&b.candidate.quality_rank()))
                .then(a_order.cmp(b_order))
        });
        let alive = self.without_dead_links(ranked.into_iter().map(|(_, item)| item).collect()).await;

        let formatter = StreamFormatter::new(&self.addon_name, base_url, config)
            .with_year(query.year.as_deref())
            .with_episode(query.season, query.episode);
        let streams = filter::streams(alive.iter().map(|item| formatter.format(item)).collect(), config);
        info!(
            streams = streams.len(),
            cached = alive.iter().filter(|item| item.cached).count(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "streams ready"
        );
        Ok(streams)
    }

    /// Query every source at least one active provider accepts, concurrently.
    async fn search(&self, query: &ContentQuery, active: &[Active], deadline: Deadline) -> Vec<LinkCandidate> {
        let sources: Vec<&CachedSource> = self
            .sources
            .iter()
            .filter(|source| active.iter().any(|p| p.handle.supports_source(source.name())))
            .collect();
        if sources.is_empty() {
            debug!("no source supported by the configured providers");
            return Vec::new();
        }
        join_all(sources.iter().map(|source| source.search(query, deadline))).await.into_iter().flatten().collect()
    }

    /// Links whose dead-link lookup fails are kept.
    async fn without_dead_links(&self, items: Vec<Enriched>) -> Vec<Enriched> {
        let lookups = join_all(items.iter().map(|item| self.dead_links.is_dead(&item.candidate.url))).await;
        let mut alive = Vec::with_capacity(items.len());
        let mut dead = 0usize;
        for (item, lookup) in items.into_iter().zip(lookups) {
            match lookup {
                Ok(true) => dead += 1,
                Ok(false) => alive.push(item),
                Err(error) => {
                    warn!(%error, "dead link lookup failed");
                    alive.push(item);
                },
            }
        }
        if dead > 0 {
            debug!(dead, "dropped dead links");
        }
        alive
    }
}
