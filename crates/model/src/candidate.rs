use crate::lang::Language;
use crate::quality::{QualityRank, Resolution};
use crate::size::parse_size_gb;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How a link is downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A file hoster page (1fichier, turbobit, ...).
    #[default]
    File,
    /// An NZB for a usenet download.
    Usenet,
}

/// One download link discovered by a scraper.
///
/// Candidates are immutable once a scraper has produced them; everything
/// downstream reads them and attaches its own annotations alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub url: String,
    #[serde(default = "unknown")]
    pub quality: String,
    #[serde(default = "unknown")]
    pub language: String,
    #[serde(default = "unknown")]
    pub size: String,
    #[serde(default = "unknown")]
    pub hoster: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "unknown")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(default)]
    pub kind: LinkKind,
}

fn unknown() -> String {
    "Unknown".to_string()
}

impl LinkCandidate {
    /// Create a candidate with every descriptive field set to `Unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_model::LinkCandidate;
    /// let candidate = LinkCandidate::new("https://1fichier.com/?abc", "darki-api")
    ///     .with_quality("1080p WEB-DL")
    ///     .with_hoster("1fichier");
    /// assert_eq!(candidate.language, "Unknown");
    /// ```
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            quality: unknown(),
            language: unknown(),
            size: unknown(),
            hoster: unknown(),
            source: source.into(),
            display_name: unknown(),
            year: None,
            season: None,
            episode: None,
            kind: LinkKind::File,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_hoster(mut self, hoster: impl Into<String>) -> Self {
        self.hoster = hoster.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_episode(mut self, season: impl Into<String>, episode: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self.episode = Some(episode.into());
        self
    }

    pub fn with_kind(mut self, kind: LinkKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            quality: self.quality.clone(),
            language: self.language.clone(),
            size: self.size.clone(),
            display_name: self.display_name.clone(),
            year: self.year.clone(),
            source: self.source.clone(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::detect(&self.quality)
    }

    pub fn quality_rank(&self) -> QualityRank {
        QualityRank::of(&self.quality)
    }

    pub fn language(&self) -> Language {
        Language::parse(&self.language)
    }

    pub fn size_gb(&self) -> Option<f64> {
        parse_size_gb(&self.size)
    }

    /// Whether this candidate belongs to the requested episode.
    ///
    /// Numbers are compared numerically when both sides parse, so "01" and
    /// "1" are the same episode. Candidates without episode information do
    /// not match a specific episode request.
    pub fn is_episode(&self, season: &str, episode: &str) -> bool {
        fn same(ours: Option<&String>, wanted: &str) -> bool {
            match ours {
                Some(ours) => match (ours.trim().parse::<u32>(), wanted.trim().parse::<u32>()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => ours.trim() == wanted.trim(),
                },
                None => false,
            }
        }
        same(self.season.as_ref(), season) && same(self.episode.as_ref(), episode)
    }
}

/// Identity of a release, regardless of which mirror hosts it.
///
/// Candidates that share a key are the same file on different hosters, so
/// confirming any one of them as cached makes the rest redundant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub quality: String,
    pub language: String,
    pub size: String,
    pub display_name: String,
    pub year: Option<String>,
    pub source: String,
}

/// Members of one [`GroupKey`], in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<T> {
    pub key: GroupKey,
    pub members: Vec<T>,
}

/// Partition items into groups, keeping groups in first-seen order and
/// members in input order.
///
/// # Examples
///
/// ```
/// use debrix_model::{LinkCandidate, group_by};
/// let candidates = vec![
///     LinkCandidate::new("https://a", "src").with_quality("1080p"),
///     LinkCandidate::new("https://b", "src").with_quality("720p"),
///     LinkCandidate::new("https://c", "src").with_quality("1080p"),
/// ];
/// let groups = group_by(candidates, LinkCandidate::group_key);
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].members.len(), 2);
/// ```
pub fn group_by<T>(items: impl IntoIterator<Item = T>, key: impl Fn(&T) -> GroupKey) -> Vec<Group<T>> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Group<T>> = Vec::new();
    for item in items {
        let key = key(&item);
        match index.get(&key) {
            Some(&position) => groups[position].members.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group { key, members: vec![item] });
            },
        }
    }
    groups
}

/// Drop candidates whose URL was already seen, then stable-sort by quality.
pub fn dedupe_and_rank(candidates: impl IntoIterator<Item = LinkCandidate>) -> Vec<LinkCandidate> {
    let mut seen = HashSet::new();
    let mut unique: Vec<LinkCandidate> =
        candidates.into_iter().filter(|c| !c.url.is_empty() && seen.insert(c.url.clone())).collect();
    unique.sort_by_key(LinkCandidate::quality_rank);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn release(url: &str, quality: &str, hoster: &str) -> LinkCandidate {
        LinkCandidate::new(url, "darki-api")
            .with_quality(quality)
            .with_language("French")
            .with_size("2 GB")
            .with_hoster(hoster)
            .with_display_name("Movie 2020")
    }

    #[test]
    fn test_mirrors_share_a_group() {
        let candidates = vec![
            release("https://1fichier.com/?a", "1080p", "1fichier"),
            release("https://turbobit.net/b", "1080p", "turbobit"),
            release("https://1fichier.com/?c", "720p", "1fichier"),
        ];
        let groups = group_by(candidates, LinkCandidate::group_key);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.iter().map(|c| c.url.as_str()).collect::<Vec<_>>(), [
            "https://1fichier.com/?a",
            "https://turbobit.net/b"
        ]);
        assert_eq!(groups[1].key.quality, "720p");
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let candidates = vec![
            release("https://a", "1080p", "1fichier"),
            release("https://b", "720p", "1fichier"),
            release("https://c", "1080p", "rapidgator"),
            release("https://d", "2160p", "turbobit"),
        ];
        let once = group_by(candidates.clone(), LinkCandidate::group_key);
        let flattened: Vec<LinkCandidate> = once.iter().flat_map(|g| g.members.clone()).collect();
        let twice = group_by(flattened, LinkCandidate::group_key);
        assert_eq!(once, twice);
        // And regrouping the original input yields the same partition.
        assert_eq!(once, group_by(candidates, LinkCandidate::group_key));
    }

    #[test]
    fn test_year_and_source_split_groups() {
        let base = release("https://a", "1080p", "1fichier");
        let other_year = release("https://b", "1080p", "1fichier").with_year("1999");
        let mut other_source = release("https://c", "1080p", "1fichier");
        other_source.source = "wawacity".to_string();
        let groups = group_by(vec![base, other_year, other_source], LinkCandidate::group_key);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_dedupe_and_rank() {
        let candidates = vec![
            release("https://a", "720p", "1fichier"),
            release("https://b", "2160p REMUX", "1fichier"),
            release("https://a", "2160p REMUX", "1fichier"),
            release("", "1080p", "1fichier"),
            release("https://c", "1080p", "1fichier"),
        ];
        let ranked = dedupe_and_rank(candidates);
        let urls: Vec<&str> = ranked.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["https://b", "https://c", "https://a"]);
        assert_eq!(ranked[2].quality, "720p", "first occurrence wins");
    }

    #[rstest]
    #[case(Some(("1", "3")), "1", "3", true)]
    #[case(Some(("01", "03")), "1", "3", true)]
    #[case(Some(("1", "4")), "1", "3", false)]
    #[case(Some(("2", "3")), "1", "3", false)]
    #[case(None, "1", "3", false)]
    fn test_is_episode(
        #[case] ours: Option<(&str, &str)>,
        #[case] season: &str,
        #[case] episode: &str,
        #[case] expected: bool,
    ) {
        let mut candidate = release("https://a", "1080p", "1fichier");
        if let Some((s, e)) = ours {
            candidate = candidate.with_episode(s, e);
        }
        assert_eq!(candidate.is_episode(season, episode), expected);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let json = r#"{"url": "https://a", "source": "wawacity", "kind": "usenet"}"#;
        let candidate: LinkCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.quality, "Unknown");
        assert_eq!(candidate.kind, LinkKind::Usenet);
        assert_eq!(candidate.year, None);
    }
}
