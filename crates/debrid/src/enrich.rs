//! Cache-check-and-enrich engine.
//!
//! Mirrors of the same release form a group. Probing walks the groups
//! breadth first (first member of every group, then second members, ...)
//! and stops probing a group as soon as one of its members is cached, so a
//! large group can't starve the others and redundant mirrors cost nothing.

use crate::outcome::{ProbeResult, ProbeStatus};
use crate::provider::{Credential, Provider};
use crate::registry::ProviderKind;
use debrix_asyncutils::Deadline;
use debrix_config::DebridSettings;
use debrix_model::{LinkCandidate, group_by};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Drop everything that isn't instantly playable.
    pub cached_only: bool,
    /// Pause between probe batches.
    pub batch_delay: Duration,
    /// Failed probes in a row after which the provider is considered down
    /// and nothing else is probed.
    pub max_consecutive_http_errors: u32,
}
impl EnrichOptions {
    pub fn with_cached_only(mut self, cached_only: bool) -> Self {
        self.cached_only = cached_only;
        self
    }
}
impl From<&DebridSettings> for EnrichOptions {
    fn from(settings: &DebridSettings) -> Self {
        Self {
            cached_only: false,
            batch_delay: settings.batch_delay(),
            max_consecutive_http_errors: settings.max_consecutive_http_errors.max(1),
        }
    }
}
impl Default for EnrichOptions {
    fn default() -> Self {
        Self::from(&DebridSettings::default())
    }
}

/// A candidate with its cache status for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enriched {
    pub candidate: LinkCandidate,
    pub provider: ProviderKind,
    pub cached: bool,
    /// Playable URL handed out while probing, if any.
    pub direct_link: Option<String>,
    /// The provider's file name, when it knows better than the scraper.
    pub filename: Option<String>,
}
impl Enriched {
    fn new(candidate: LinkCandidate, provider: ProviderKind, probe: ProbeResult) -> Self {
        Self {
            candidate,
            provider,
            cached: probe.is_cached(),
            direct_link: probe.direct_link,
            filename: probe.filename,
        }
    }
}

/// Per-group bookkeeping. Members keep their position in the input so ties
/// can be broken by input order.
struct GroupState {
    members: Vec<(usize, LinkCandidate)>,
    cached: Option<(usize, ProbeResult)>,
    uncached: Vec<(usize, ProbeResult)>,
}
impl GroupState {
    fn resolved(&self) -> bool {
        self.cached.is_some()
    }
}

/// Annotate `candidates` with their cache status on `provider`.
///
/// Unsupported candidates are dropped. Each group contributes either its
/// single cached member or all of its uncached members; hidden ones are
/// dropped. Cached results come first, each part ordered by quality and
/// then input order. Anything not probed before `deadline` is uncached.
#[instrument("checking cache", skip_all, fields(provider = provider.name(), candidates = candidates.len()))]
pub async fn enrich(
    provider: &dyn Provider,
    candidates: Vec<LinkCandidate>,
    credential: &Credential,
    deadline: Deadline,
    options: EnrichOptions,
) -> Vec<Enriched> {
    if credential.is_empty() {
        debug!("no API key, nothing to check");
        return Vec::new();
    }
    let total = candidates.len();
    let supported: Vec<(usize, LinkCandidate)> =
        candidates.into_iter().filter(|c| provider.supports(c, credential)).enumerate().collect();
    if supported.len() < total {
        debug!(before = total, after = supported.len(), "dropped unsupported links");
    }
    if supported.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<GroupState> = group_by(supported, |(_, c)| c.group_key())
        .into_iter()
        .map(|group| GroupState { members: group.members, cached: None, uncached: Vec::new() })
        .collect();
    debug!(groups = groups.len(), "grouped mirrors");

    // Breadth first: every group's first member, then every second member...
    let depth = groups.iter().map(|g| g.members.len()).max().unwrap_or(0);
    let mut queue: VecDeque<(usize, usize)> = (0..depth)
        .flat_map(|round| groups.iter().enumerate().filter(move |(_, g)| round < g.members.len()).map(move |(g, _)| (g, round)))
        .collect();

    let batch_size = provider.batch_size().max(1);
    let (mut tested, mut skipped) = (0usize, 0usize);
    let mut consecutive_errors = 0u32;
    let mut unprobed: Vec<(usize, usize)> = Vec::new();
    loop {
        let before = queue.len();
        queue.retain(|(g, _)| !groups[*g].resolved());
        if queue.len() < before {
            skipped += before - queue.len();
            debug!(skipped = before - queue.len(), "skipped mirrors of cached groups");
        }
        if queue.is_empty() {
            break;
        }
        if deadline.is_expired() {
            debug!(remaining = queue.len(), "time budget spent");
            unprobed.extend(queue.drain(..));
            break;
        }
        if consecutive_errors >= options.max_consecutive_http_errors {
            warn!(errors = consecutive_errors, remaining = queue.len(), "provider looks down, giving up");
            unprobed.extend(queue.drain(..));
            break;
        }

        let batch: Vec<(usize, usize)> = queue.drain(..batch_size.min(queue.len())).collect();
        let links: Vec<LinkCandidate> = batch.iter().map(|&(g, m)| groups[g].members[m].1.clone()).collect();
        let Some(results) = deadline.within(provider.probe_batch(&links, credential, deadline)).await else {
            debug!(in_flight = batch.len(), "time budget spent during a batch");
            unprobed.extend(batch);
            unprobed.extend(queue.drain(..));
            break;
        };
        tested += batch.len();

        for (&(g, m), result) in batch.iter().zip(results) {
            if result.http_error {
                consecutive_errors += 1;
            } else {
                consecutive_errors = 0;
            }
            let state = &mut groups[g];
            match result.status {
                ProbeStatus::Cached if !state.resolved() => state.cached = Some((m, result)),
                ProbeStatus::Cached | ProbeStatus::Uncached => state.uncached.push((m, result)),
                ProbeStatus::Hidden => {},
            }
        }

        if !queue.is_empty() {
            deadline.sleep(options.batch_delay).await;
        }
    }
    for (g, m) in unprobed {
        if !groups[g].resolved() {
            groups[g].uncached.push((m, ProbeResult::uncached()));
        }
    }

    let kind = provider.kind();
    let mut cached = Vec::new();
    let mut uncached = Vec::new();
    for group in groups {
        let GroupState { members, cached: hit, uncached: misses } = group;
        match hit {
            Some((m, probe)) => cached.push((members[m].0, Enriched::new(members[m].1.clone(), kind, probe))),
            None => {
                for (m, probe) in misses {
                    let mut probe = probe;
                    probe.status = ProbeStatus::Uncached;
                    uncached.push((members[m].0, Enriched::new(members[m].1.clone(), kind, probe)));
                }
            },
        }
    }
    let rank = |items: &mut Vec<(usize, Enriched)>| {
        items.sort_by(|(a_index, a), (b_index, b)| {
            a.candidate.quality_rank().cmp(&b.candidate.quality_rank()).then(a_index.cmp(b_index))
        });
    };
    rank(&mut cached);
    rank(&mut uncached);
    debug!(
        tested,
        skipped,
        cached = cached.len(),
        uncached = uncached.len(),
        elapsed_ms = deadline.elapsed().as_millis() as u64,
        "cache check done"
    );

    let mut enriched: Vec<Enriched> = cached.into_iter().map(|(_, e)| e).collect();
    if !options.cached_only {
        enriched.extend(uncached.into_iter().map(|(_, e)| e));
    }
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use std::collections::HashSet;

    fn release(url: &str, quality: &str, name: &str) -> LinkCandidate {
        LinkCandidate::new(url, "darki-api")
            .with_quality(quality)
            .with_language("French")
            .with_size("2 GB")
            .with_hoster("1fichier")
            .with_display_name(name)
    }

    fn options() -> EnrichOptions {
        EnrichOptions { cached_only: false, batch_delay: Duration::ZERO, max_consecutive_http_errors: 5 }
    }

    /// Five links, the first and last being mirrors of the same release.
    fn five() -> Vec<LinkCandidate> {
        vec![
            release("https://1fichier.com/?shared-1", "1080p", "Shared"),
            release("https://1fichier.com/?b", "720p", "B"),
            release("https://1fichier.com/?c", "2160p", "C"),
            release("https://1fichier.com/?d", "480p", "D"),
            release("https://1fichier.com/?shared-2", "1080p", "Shared"),
        ]
    }

    #[tokio::test]
    async fn test_cached_group_skips_its_mirrors() {
        let provider = MockProvider::new(ProviderKind::AllDebrid).with_batch_size(2).with_cached("https://1fichier.com/?shared-1");
        let results = enrich(
            &provider,
            five(),
            &Credential::new("key"),
            Deadline::after(Duration::from_secs(5)),
            options(),
        )
        .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().filter(|r| r.cached).count(), 1);
        assert!(results[0].cached, "cached results come first");
        assert_eq!(results[0].candidate.url, "https://1fichier.com/?shared-1");
        assert!(provider.probe_calls() <= 4);
        assert!(results.iter().all(|r| r.candidate.url != "https://1fichier.com/?shared-2"));
        // Uncached part is ordered by quality.
        let uncached: Vec<&str> = results[1..].iter().map(|r| r.candidate.quality.as_str()).collect();
        assert_eq!(uncached, ["2160p", "720p", "480p"]);
    }

    #[tokio::test]
    async fn test_uncached_group_keeps_every_mirror() {
        let provider = MockProvider::new(ProviderKind::TorBox);
        let results =
            enrich(&provider, five(), &Credential::new("key"), Deadline::after(Duration::from_secs(5)), options()).await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| !r.cached));
        assert_eq!(results.iter().map(|r| r.provider).collect::<HashSet<_>>(), HashSet::from([ProviderKind::TorBox]));
    }

    #[tokio::test]
    async fn test_at_most_one_cached_per_group() {
        let provider = MockProvider::new(ProviderKind::AllDebrid)
            .with_batch_size(10)
            .with_default_probe(ProbeResult::cached(None, None));
        let results =
            enrich(&provider, five(), &Credential::new("key"), Deadline::after(Duration::from_secs(5)), options()).await;
        // Both mirrors were probed in the same batch; only one survives.
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.cached));
    }

    #[tokio::test]
    async fn test_hidden_and_unsupported_are_dropped() {
        let provider = MockProvider::new(ProviderKind::AllDebrid)
            .with_hosts(&["1fichier"])
            .with_probe("https://1fichier.com/?b", ProbeResult::hidden());
        let mut candidates = five();
        candidates.push(release("https://uptobox.com/x", "1080p", "X").with_hoster("uptobox"));
        let results =
            enrich(&provider, candidates, &Credential::new("key"), Deadline::after(Duration::from_secs(5)), options())
                .await;
        let urls: HashSet<&str> = results.iter().map(|r| r.candidate.url.as_str()).collect();
        assert_eq!(urls.len(), 4);
        assert!(!urls.contains("https://1fichier.com/?b"));
        assert!(!urls.contains("https://uptobox.com/x"));
    }

    #[tokio::test]
    async fn test_cached_only() {
        let provider = MockProvider::new(ProviderKind::AllDebrid).with_cached("https://1fichier.com/?c");
        let results = enrich(
            &provider,
            five(),
            &Credential::new("key"),
            Deadline::after(Duration::from_secs(5)),
            options().with_cached_only(true),
        )
        .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.url, "https://1fichier.com/?c");
    }

    #[tokio::test]
    async fn test_empty_key_returns_nothing() {
        let provider = MockProvider::new(ProviderKind::AllDebrid);
        let results =
            enrich(&provider, five(), &Credential::new(""), Deadline::after(Duration::from_secs(5)), options()).await;
        assert!(results.is_empty());
        assert_eq!(provider.probe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_respected() {
        let provider = MockProvider::new(ProviderKind::AllDebrid)
            .with_batch_size(1)
            .with_latency(Duration::from_secs(2))
            .with_default_probe(ProbeResult::cached(None, None));
        let start = tokio::time::Instant::now();
        let results =
            enrich(&provider, five(), &Credential::new("key"), Deadline::after(Duration::from_secs(5)), options()).await;

        assert!(start.elapsed() <= Duration::from_secs(5));
        // Two batches finish in time, the third is cut short.
        assert_eq!(results.iter().filter(|r| r.cached).count(), 2);
        assert_eq!(results.len(), 4, "unprobed groups still show up, uncached");
        assert_eq!(provider.probe_calls(), 3);
    }

    #[tokio::test]
    async fn test_provider_outage_stops_probing() {
        let provider = MockProvider::new(ProviderKind::TorBox)
            .with_batch_size(1)
            .with_default_probe(ProbeResult::http_failure());
        let options = EnrichOptions { max_consecutive_http_errors: 2, ..options() };
        let results =
            enrich(&provider, five(), &Credential::new("key"), Deadline::after(Duration::from_secs(5)), options).await;
        assert_eq!(provider.probe_calls(), 2);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| !r.cached));
    }
}
