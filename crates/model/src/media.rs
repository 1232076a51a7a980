//! What is being searched for.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Series,
    Anime,
}
impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Anime => "anime",
        }
    }
}
impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
impl FromStr for Category {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_lowercase().as_str() {
            "movie" | "film" => Self::Movie,
            "series" | "tv" | "show" => Self::Series,
            "anime" => Self::Anime,
            _ => exn::bail!(ErrorKind::ParseError { field: "category", value: s.to_string() }),
        })
    }
}

/// Identifier of the requested content, as sent by the media client.
///
/// # Examples
///
/// ```
/// use debrix_model::ContentId;
/// let id: ContentId = "tt0903747:1:3".parse().unwrap();
/// assert_eq!(id, ContentId::Imdb { id: "tt0903747".into(), season: Some(1), episode: Some(3) });
///
/// let anime: ContentId = "kitsu:7442:12".parse().unwrap();
/// assert_eq!(anime, ContentId::Kitsu { id: "7442".into(), episode: Some(12) });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentId {
    Imdb { id: String, season: Option<u32>, episode: Option<u32> },
    Kitsu { id: String, episode: Option<u32> },
}
impl ContentId {
    pub fn season(&self) -> Option<u32> {
        match self {
            Self::Imdb { season, .. } => *season,
            Self::Kitsu { .. } => None,
        }
    }

    pub fn episode(&self) -> Option<u32> {
        match self {
            Self::Imdb { episode, .. } | Self::Kitsu { episode, .. } => *episode,
        }
    }
}
impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Imdb { id, season: Some(s), episode: Some(e) } => write!(f, "{id}:{s}:{e}"),
            Self::Imdb { id, .. } => f.write_str(id),
            Self::Kitsu { id, episode: Some(e) } => write!(f, "kitsu:{id}:{e}"),
            Self::Kitsu { id, episode: None } => write!(f, "kitsu:{id}"),
        }
    }
}
impl FromStr for ContentId {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ErrorKind::InvalidContentId(s.to_string());
        let number = |part: &str| part.parse::<u32>().map_err(|_| exn::Exn::from(invalid()));
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            ["kitsu", id] if !id.is_empty() => Ok(Self::Kitsu { id: id.to_string(), episode: None }),
            ["kitsu", id, episode] if !id.is_empty() => {
                Ok(Self::Kitsu { id: id.to_string(), episode: Some(number(episode)?) })
            },
            [id] if id.starts_with("tt") && id.len() > 2 => {
                Ok(Self::Imdb { id: id.to_string(), season: None, episode: None })
            },
            [id, season, episode] if id.starts_with("tt") && id.len() > 2 => Ok(Self::Imdb {
                id: id.to_string(),
                season: Some(number(season)?),
                episode: Some(number(episode)?),
            }),
            _ => exn::bail!(invalid()),
        }
    }
}

/// Canonical description of the content, as returned by a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    #[serde(default)]
    pub year: Option<String>,
    pub category: Category,
    /// Season to search for. May differ from the requested one (absolute
    /// anime numbering remapped to a season).
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
}

/// A search handed to a scraping source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentQuery {
    pub category: Category,
    pub title: String,
    pub year: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}
impl ContentQuery {
    pub fn movie(title: impl Into<String>, year: Option<String>) -> Self {
        Self { category: Category::Movie, title: title.into(), year, season: None, episode: None }
    }

    pub fn episode_of(category: Category, title: impl Into<String>, season: u32, episode: u32) -> Self {
        Self { category, title: title.into(), year: None, season: Some(season), episode: Some(episode) }
    }

    /// Season and episode, only when both are known.
    pub fn episode_pair(&self) -> Option<(u32, u32)> {
        self.season.zip(self.episode)
    }

    /// Cache namespace for a given source. Episode-scoped searches get their
    /// own namespace, so a cached episode never answers for another one.
    pub fn cache_category(&self, source: &str) -> String {
        match self.episode_pair() {
            Some((season, episode)) => format!("{source}_{}_s{season}e{episode}", self.category),
            None => format!("{source}_{}", self.category),
        }
    }
}
impl From<Metadata> for ContentQuery {
    fn from(meta: Metadata) -> Self {
        Self {
            category: meta.category,
            title: meta.title,
            year: meta.year,
            season: meta.season,
            episode: meta.episode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tt1234567", ContentId::Imdb { id: "tt1234567".into(), season: None, episode: None })]
    #[case("tt1234567:2:10", ContentId::Imdb { id: "tt1234567".into(), season: Some(2), episode: Some(10) })]
    #[case("kitsu:1", ContentId::Kitsu { id: "1".into(), episode: None })]
    #[case("kitsu:1:5", ContentId::Kitsu { id: "1".into(), episode: Some(5) })]
    fn test_parse_content_id(#[case] input: &str, #[case] expected: ContentId) {
        let parsed: ContentId = input.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("tt")]
    #[case("12345")]
    #[case("tt1:x:1")]
    #[case("tt1:1")]
    #[case("kitsu:")]
    fn test_parse_content_id_rejects(#[case] input: &str) {
        let err = input.parse::<ContentId>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidContentId(_)));
    }

    #[test]
    fn test_cache_category_is_episode_scoped() {
        let movie = ContentQuery::movie("Heat", Some("1995".into()));
        assert_eq!(movie.cache_category("wawacity"), "wawacity_movie");
        let episode = ContentQuery::episode_of(Category::Series, "Dark", 1, 3);
        assert_eq!(episode.cache_category("darki-api"), "darki-api_series_s1e3");
    }
}
