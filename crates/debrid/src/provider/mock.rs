//! Scripted provider for testing.

use crate::outcome::{ProbeResult, ResolutionOutcome};
use crate::provider::{Credential, Episode, Provider, ProviderHandle};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_model::{LinkCandidate, LinkKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider answering from a script instead of the network.
///
/// Unscripted links probe as uncached and resolve as
/// [`ResolutionOutcome::Fatal`]. Every call is counted.
pub struct MockProvider {
    name: String,
    kind: ProviderKind,
    batch_size: usize,
    latency: Duration,
    hosts: Vec<String>,
    sources: Vec<String>,
    probes: HashMap<String, ProbeResult>,
    default_probe: ProbeResult,
    resolutions: HashMap<String, ResolutionOutcome>,
    probe_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: kind.display_name().to_string(),
            kind,
            batch_size: 12,
            latency: Duration::ZERO,
            hosts: Vec::new(),
            sources: Vec::new(),
            probes: HashMap::new(),
            default_probe: ProbeResult::uncached(),
            resolutions: HashMap::new(),
            probe_calls: AtomicUsize::new(0),
            resolve_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Delay every probe and resolution by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Only support candidates whose hoster contains one of `hosts`.
    pub fn with_hosts(mut self, hosts: &[&str]) -> Self {
        self.hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    /// Only support the named scraping sources.
    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_probe(mut self, url: impl Into<String>, result: ProbeResult) -> Self {
        self.probes.insert(url.into(), result);
        self
    }

    pub fn with_cached(self, url: impl Into<String>) -> Self {
        self.with_probe(url, ProbeResult::cached(None, None))
    }

    /// Result for every link without its own script.
    pub fn with_default_probe(mut self, result: ProbeResult) -> Self {
        self.default_probe = result;
        self
    }

    pub fn with_resolution(mut self, url: impl Into<String>, outcome: ResolutionOutcome) -> Self {
        self.resolutions.insert(url.into(), outcome);
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn into_handle(self) -> ProviderHandle {
        Arc::new(self)
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn supports(&self, candidate: &LinkCandidate, credential: &Credential) -> bool {
        if credential.is_empty() {
            return false;
        }
        let hoster = candidate.hoster.to_lowercase();
        match candidate.kind {
            LinkKind::Usenet => credential.usenet,
            LinkKind::File => self.hosts.is_empty() || self.hosts.iter().any(|h| hoster.contains(h.as_str())),
        }
    }

    fn supports_source(&self, source: &str) -> bool {
        self.sources.is_empty() || self.sources.iter().any(|s| s == source)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn probe(&self, candidate: &LinkCandidate, _credential: &Credential) -> ProbeResult {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.probes.get(&candidate.url).cloned().unwrap_or_else(|| self.default_probe.clone())
    }

    async fn resolve(&self, link: &str, _credential: &Credential, _episode: Option<&Episode>) -> ResolutionOutcome {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.resolutions.get(link).cloned().unwrap_or(ResolutionOutcome::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_answers_are_counted() {
        let provider = MockProvider::new(ProviderKind::AllDebrid)
            .with_cached("https://1fichier.com/?a")
            .with_resolution("https://1fichier.com/?a", ResolutionOutcome::LinkDown);
        let credential = Credential::new("key");

        let cached = LinkCandidate::new("https://1fichier.com/?a", "darki-api");
        let other = LinkCandidate::new("https://1fichier.com/?b", "darki-api");
        assert!(provider.probe(&cached, &credential).await.is_cached());
        assert!(!provider.probe(&other, &credential).await.is_cached());
        assert_eq!(provider.resolve(&cached.url, &credential, None).await, ResolutionOutcome::LinkDown);
        assert_eq!(provider.resolve(&other.url, &credential, None).await, ResolutionOutcome::Fatal);
        assert_eq!(provider.probe_calls(), 2);
        assert_eq!(provider.resolve_calls(), 2);
    }
}
