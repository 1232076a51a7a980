//! Turning enriched candidates into what the media client displays.

use debrix_config::UserConfig;
use debrix_debrid::Enriched;
use debrix_model::{Language, LinkCandidate};
use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";
/// Marks the file name line of a description.
pub(crate) const FILE_MARKER: &str = "📁";

/// One playback option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub description: String,
    pub url: String,
}

/// Formats enriched results for one request.
pub struct StreamFormatter<'a> {
    addon_name: &'a str,
    base_url: &'a str,
    config: &'a UserConfig,
    encoded_config: String,
    year: Option<&'a str>,
    season: Option<u32>,
    episode: Option<u32>,
}
impl<'a> StreamFormatter<'a> {
    pub fn new(addon_name: &'a str, base_url: &'a str, config: &'a UserConfig) -> Self {
        Self {
            addon_name,
            base_url: base_url.trim_end_matches('/'),
            config,
            encoded_config: config.encode(),
            year: None,
            season: None,
            episode: None,
        }
    }

    /// Year shown for results that don't carry their own.
    pub fn with_year(mut self, year: Option<&'a str>) -> Self {
        self.year = year;
        self
    }

    /// Episode hints passed on to resolution when a result has none.
    pub fn with_episode(mut self, season: Option<u32>, episode: Option<u32>) -> Self {
        self.season = season;
        self.episode = episode;
        self
    }

    pub fn format(&self, item: &Enriched) -> Stream {
        let candidate = &item.candidate;
        let badge = if item.cached { "⚡" } else { "⏳" };
        Stream {
            name: format!("[{} {badge}] {}", item.provider.tag(), self.addon_name),
            description: self.describe(item),
            url: match (&item.direct_link, item.cached) {
                (Some(direct), true) => direct.clone(),
                _ => self.resolve_url(candidate, item.provider.as_str()),
            },
        }
    }

    fn describe(&self, item: &Enriched) -> String {
        let candidate = &item.candidate;
        let label = candidate.language();
        let narrowed = label.narrowed(&self.config.languages);
        let mut display_name = match item.filename.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() && !(hint.starts_with(UNKNOWN) && hint.ends_with("Link")) => hint.to_string(),
            _ => candidate.display_name.clone(),
        };
        if narrowed != label && matches!(label, Language::Multi(_)) {
            display_name = display_name.replace(&label.to_string(), &narrowed.to_string());
        }

        let mut lines = Vec::new();
        if is_known(&candidate.language) {
            lines.push(format!("🌐 {narrowed}"));
        }
        if is_known(&candidate.quality) {
            lines.push(format!("🎞️ {}", candidate.quality));
        }
        let mut size_year = Vec::new();
        if is_known(&candidate.size) {
            size_year.push(format!("📦 {}", candidate.size));
        }
        if let Some(year) = candidate.year.as_deref().or(self.year).filter(|y| !y.is_empty()) {
            size_year.push(format!("📅 {year}"));
        }
        if !size_year.is_empty() {
            lines.push(size_year.join(" "));
        }
        let mut origin = format!("🌍 {}", candidate.source);
        if is_known(&candidate.hoster) {
            origin.push_str(&format!(" ☁️ {}", candidate.hoster));
        }
        lines.push(origin);
        if is_known(&display_name) {
            lines.push(format!("{FILE_MARKER} {display_name}"));
        }
        lines.join("\r\n")
    }

    /// Deferred playback through the resolve endpoint.
    fn resolve_url(&self, candidate: &LinkCandidate, service: &str) -> String {
        let mut url = format!(
            "{}/resolve?link={}&config={}&service={}",
            self.base_url,
            urlencoding::encode(&candidate.url),
            urlencoding::encode(&self.encoded_config),
            service,
        );
        let season = candidate.season.clone().or_else(|| self.season.map(|s| s.to_string()));
        let episode = candidate.episode.clone().or_else(|| self.episode.map(|e| e.to_string()));
        if let Some(season) = season {
            url.push_str(&format!("&season={}", urlencoding::encode(&season)));
        }
        if let Some(episode) = episode {
            url.push_str(&format!("&episode={}", urlencoding::encode(&episode)));
        }
        url
    }
}

fn is_known(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != UNKNOWN
}
