//! Resolution detection and quality ranking.
//!
//! Scrapers hand over quality as free text ("1080p WEB-DL", "4K REMUX",
//! "HDLight 720p", "N/A", ...). Everything here works on that text directly.

use crate::error::{Error, ErrorKind};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Rank given to qualities that could not be recognised at all.
const UNKNOWN_RANK: u16 = 999;

/// Values scrapers use when they have no idea what the quality is.
fn is_unknown(quality: &str) -> bool {
    matches!(quality.trim().to_uppercase().as_str(), "" | "N/A" | "NULL" | "UNKNOWN" | "INCONNU")
}

/// Clean up scraped quality text, collapsing the many spellings of "no
/// idea" into `Unknown`.
pub fn normalize_quality(raw: &str) -> String {
    if is_unknown(raw) { "Unknown".to_string() } else { raw.trim().to_string() }
}

/// Video resolution bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    P2160,
    P1080,
    P720,
    P480,
    Unknown,
}
impl Resolution {
    /// Every bucket, best first.
    pub const ALL: [Resolution; 5] = [Self::P2160, Self::P1080, Self::P720, Self::P480, Self::Unknown];

    /// Detect the resolution from free-text quality.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_model::Resolution;
    /// assert_eq!(Resolution::detect("4K HDR REMUX"), Resolution::P2160);
    /// assert_eq!(Resolution::detect("HD"), Resolution::P1080);
    /// assert_eq!(Resolution::detect("HDLight 720p"), Resolution::P720);
    /// assert_eq!(Resolution::detect("DVDRip"), Resolution::Unknown);
    /// ```
    pub fn detect(quality: &str) -> Self {
        let upper = quality.trim().to_uppercase();
        if ["2160", "4K", "UHD", "ULTRA"].iter().any(|needle| upper.contains(needle)) {
            Self::P2160
        } else if upper.contains("1080") || upper == "HD" {
            Self::P1080
        } else if upper.contains("720") {
            Self::P720
        } else if upper.contains("480") {
            Self::P480
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P2160 => "2160p",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::Unknown => "Unknown",
        }
    }

    /// Sort rank used by [`QualityRank`]. 480p is deliberately not ranked
    /// above "unknown": scrapers rarely label low resolutions correctly.
    fn rank(&self) -> u16 {
        match self {
            Self::P2160 => 0,
            Self::P1080 => 1,
            Self::P720 => 2,
            Self::P480 | Self::Unknown => 99,
        }
    }
}
impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
impl FromStr for Resolution {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "2160p" | "4k" => Self::P2160,
            "1080p" => Self::P1080,
            "720p" => Self::P720,
            "480p" => Self::P480,
            "unknown" => Self::Unknown,
            _ => exn::bail!(ErrorKind::ParseError { field: "resolution", value: s.to_string() }),
        })
    }
}

/// Release type, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReleaseType {
    Remux,
    BluRay,
    WebDl,
    HdLight,
    WebRip,
    HdRip,
    Hdtv,
    DvdRip,
    TvRip,
    Other,
}
impl ReleaseType {
    pub fn detect(quality: &str) -> Self {
        let upper = quality.trim().to_uppercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| upper.contains(needle));
        if has(&["REMUX"]) {
            Self::Remux
        } else if has(&["BLURAY", "BLU-RAY", "BDRIP", "BRRIP", "BD-RIP", "BR-RIP"]) {
            Self::BluRay
        } else if has(&["WEB-DL", "WEBDL"]) || (upper.contains("WEB") && !upper.contains("WEBRIP")) {
            Self::WebDl
        } else if has(&["LIGHT"]) {
            Self::HdLight
        } else if has(&["WEBRIP", "WEB-RIP"]) {
            Self::WebRip
        } else if has(&["HDRIP", "HD-RIP"]) {
            Self::HdRip
        } else if has(&["HDTV", "HD-TV"]) {
            Self::Hdtv
        } else if has(&["DVDRIP", "DVD-RIP"]) {
            Self::DvdRip
        } else if has(&["TVRIP", "TV-RIP"]) {
            Self::TvRip
        } else {
            Self::Other
        }
    }

    fn rank(&self) -> u16 {
        match self {
            Self::Remux => 0,
            Self::BluRay => 1,
            Self::WebDl => 2,
            Self::HdLight => 3,
            Self::WebRip => 4,
            Self::HdRip => 5,
            Self::Hdtv => 6,
            Self::DvdRip => 7,
            Self::TvRip => 8,
            Self::Other => 99,
        }
    }
}

/// Sortable quality: lower is better.
///
/// Ordering is by resolution first, then release type. Unrecognisable
/// quality text always sorts last.
///
/// # Examples
///
/// ```
/// use debrix_model::QualityRank;
/// let remux = QualityRank::of("2160p REMUX");
/// let webdl = QualityRank::of("2160p WEB-DL");
/// let hd = QualityRank::of("1080p REMUX");
/// let unknown = QualityRank::of("N/A");
/// assert!(remux < webdl);
/// assert!(webdl < hd);
/// assert!(hd < unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QualityRank {
    resolution: u16,
    release: u16,
}
impl QualityRank {
    pub fn of(quality: &str) -> Self {
        if is_unknown(quality) {
            return Self { resolution: UNKNOWN_RANK, release: UNKNOWN_RANK };
        }
        Self {
            resolution: Resolution::detect(quality).rank(),
            release: ReleaseType::detect(quality).rank(),
        }
    }
}
impl Ord for QualityRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.resolution.cmp(&other.resolution).then(self.release.cmp(&other.release))
    }
}
impl PartialOrd for QualityRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
