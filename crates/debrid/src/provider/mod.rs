//! The [`Provider`] trait and its adapters.

mod alldebrid;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod onefichier;
mod premiumize;
mod torbox;

pub use self::alldebrid::AllDebrid;
pub use self::onefichier::OneFichier;
pub use self::premiumize::Premiumize;
pub use self::torbox::TorBox;

use crate::outcome::{ProbeResult, ResolutionOutcome};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_asyncutils::Deadline;
use debrix_config::ProviderSettings;
use debrix_model::{LinkCandidate, LinkKind};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A user's key for one provider.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credential {
    pub api_key: String,
    /// Whether usenet links should be considered at all.
    pub usenet: bool,
}
impl Credential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), usenet: false }
    }

    pub fn with_usenet(mut self, usenet: bool) -> Self {
        self.usenet = usenet;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.trim().is_empty()
    }
}
impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credential").field("api_key", &"***").field("usenet", &self.usenet).finish()
    }
}

/// Season and episode a resolution is for, used to pick a file out of a
/// season pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub season: String,
    pub episode: String,
}
impl Episode {
    pub fn new(season: impl Into<String>, episode: impl Into<String>) -> Self {
        Self { season: season.into(), episode: episode.into() }
    }

    /// `S01E03` style marker, if both numbers parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_debrid::Episode;
    /// assert_eq!(Episode::new("1", "3").pattern().as_deref(), Some("S01E03"));
    /// assert_eq!(Episode::new("one", "3").pattern(), None);
    /// ```
    pub fn pattern(&self) -> Option<String> {
        let season: u32 = self.season.trim().parse().ok()?;
        let episode: u32 = self.episode.trim().parse().ok()?;
        Some(format!("S{season:02}E{episode:02}"))
    }

    pub(crate) fn of(candidate: &LinkCandidate) -> Option<Self> {
        Some(Self::new(candidate.season.clone()?, candidate.episode.clone()?))
    }
}

/// A debrid service: turns hoster links into direct, playable URLs.
///
/// Adapters never fail. Whatever goes wrong is folded into a
/// [`ProbeResult`] or a [`ResolutionOutcome`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable name, used in logs and stream titles.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Whether this provider could service `candidate` at all.
    fn supports(&self, candidate: &LinkCandidate, credential: &Credential) -> bool;

    /// Whether results from the named scraping source are worth fetching
    /// for this provider.
    fn supports_source(&self, _source: &str) -> bool {
        true
    }

    /// Concurrent probes in one batch.
    fn batch_size(&self) -> usize {
        12
    }

    /// Check whether a single link is instantly available.
    async fn probe(&self, candidate: &LinkCandidate, credential: &Credential) -> ProbeResult;

    /// Probe a batch of links, returning one result per candidate in input
    /// order. Probes still running when the deadline passes are uncached.
    async fn probe_batch(
        &self,
        candidates: &[LinkCandidate],
        credential: &Credential,
        deadline: Deadline,
    ) -> Vec<ProbeResult> {
        let probes = candidates.iter().map(|candidate| async move {
            deadline.within(self.probe(candidate, credential)).await.unwrap_or_else(ProbeResult::uncached)
        });
        futures::future::join_all(probes).await
    }

    /// Turn a hoster link into a playable URL.
    async fn resolve(&self, link: &str, credential: &Credential, episode: Option<&Episode>) -> ResolutionOutcome;
}

/// Shared handle to any provider.
pub type ProviderHandle = Arc<dyn Provider + Send + Sync>;

/// Hoster and source restrictions from a provider's settings.
///
/// Names match as case-insensitive substrings; an empty list allows
/// everything.
pub(crate) fn supports_file(settings: &ProviderSettings, candidate: &LinkCandidate) -> bool {
    candidate.kind == LinkKind::File
        && matches_any(&settings.hosts, &candidate.hoster)
        && matches_any(&settings.sources, &candidate.source)
}

pub(crate) fn supports_source(settings: &ProviderSettings, source: &str) -> bool {
    matches_any(&settings.sources, source)
}

fn matches_any(names: &[String], value: &str) -> bool {
    let value = value.to_lowercase();
    names.is_empty() || names.iter().any(|name| value.contains(&name.to_lowercase()))
}

/// Drop the affiliate suffix hosters append to shared links.
pub(crate) fn strip_affiliate(link: &str) -> &str {
    link.split("&af=").next().unwrap_or(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1fichier", "darki-api", LinkKind::File, true)]
    #[case("1Fichier.com", "darki-api", LinkKind::File, true)]
    #[case("uptobox", "darki-api", LinkKind::File, false)]
    #[case("1fichier", "wawacity", LinkKind::File, false)]
    #[case("1fichier", "darki-api", LinkKind::Usenet, false)]
    fn test_supports_file(#[case] hoster: &str, #[case] source: &str, #[case] kind: LinkKind, #[case] expected: bool) {
        let settings = ProviderSettings::new("https://api", &["1fichier", "turbobit"], &["darki-api"], 12);
        let candidate = LinkCandidate::new("https://x", source).with_hoster(hoster).with_kind(kind);
        assert_eq!(supports_file(&settings, &candidate), expected);
    }

    #[test]
    fn test_empty_lists_allow_all() {
        let settings = ProviderSettings::new("https://api", &[], &[], 12);
        let candidate = LinkCandidate::new("https://x", "anything").with_hoster("anywhere");
        assert!(supports_file(&settings, &candidate));
    }

    #[rstest]
    #[case(&["darki-api"], "darki-api", true)]
    #[case(&["darki-api"], "wawacity", false)]
    #[case(&[], "wawacity", true)]
    fn test_supports_source(#[case] sources: &[&str], #[case] source: &str, #[case] expected: bool) {
        let settings = ProviderSettings::new("https://api", &[], sources, 12);
        assert_eq!(supports_source(&settings, source), expected);
    }

    #[rstest]
    #[case("https://1fichier.com/?abc&af=123", "https://1fichier.com/?abc")]
    #[case("https://1fichier.com/?abc", "https://1fichier.com/?abc")]
    fn test_strip_affiliate(#[case] link: &str, #[case] expected: &str) {
        assert_eq!(strip_affiliate(link), expected);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let printed = format!("{:?}", Credential::new("hunter2"));
        assert!(!printed.contains("hunter2"));
    }
}
