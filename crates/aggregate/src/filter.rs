//! User-configured result filters.
//!
//! Candidate filters run before probing, so nothing the user would never
//! see costs a provider call. Stream filters need the provider's file name
//! and run on the formatted output.

use crate::format::{FILE_MARKER, Stream};
use debrix_config::UserConfig;
use debrix_model::{LinkCandidate, Resolution};
use std::collections::HashMap;
use tracing::{debug, warn};

const ARCHIVE_EXTENSIONS: [&str; 5] = [".rar", ".zip", ".7z", ".tar", ".gz"];

/// Language, resolution, per-resolution cap and maximum size, in that
/// order.
pub fn candidates(candidates: Vec<LinkCandidate>, config: &UserConfig) -> Vec<LinkCandidate> {
    let candidates = by_language(candidates, &config.languages);
    let candidates = by_resolution(candidates, &config.resolutions);
    let candidates = cap_per_resolution(candidates, config.max_results_per_resolution);
    by_max_size(candidates, config.max_size_gb)
}

/// Archive exclusion, then keyword exclusion.
pub fn streams(streams: Vec<Stream>, config: &UserConfig) -> Vec<Stream> {
    without_keywords(without_archives(streams), &config.excluded_keywords)
}

pub fn by_language(candidates: Vec<LinkCandidate>, allowed: &[String]) -> Vec<LinkCandidate> {
    if allowed.is_empty() {
        return candidates;
    }
    let before = candidates.len();
    let kept: Vec<LinkCandidate> = candidates.into_iter().filter(|c| c.language().matches(allowed)).collect();
    debug!(before, after = kept.len(), "language filter");
    kept
}

/// Keep candidates whose detected resolution is allowed. An empty list
/// allows everything.
pub fn by_resolution(candidates: Vec<LinkCandidate>, allowed: &[String]) -> Vec<LinkCandidate> {
    if allowed.is_empty() {
        return candidates;
    }
    let allowed: Vec<Resolution> = allowed
        .iter()
        .filter_map(|name| match name.parse() {
            Ok(resolution) => Some(resolution),
            Err(error) => {
                warn!(%error, "ignoring resolution");
                None
            },
        })
        .collect();
    let before = candidates.len();
    let kept: Vec<LinkCandidate> = candidates.into_iter().filter(|c| allowed.contains(&c.resolution())).collect();
    debug!(before, after = kept.len(), "resolution filter");
    kept
}

/// Keep the first `max` candidates of each resolution, `0` for unlimited.
/// Input order is preserved.
pub fn cap_per_resolution(candidates: Vec<LinkCandidate>, max: usize) -> Vec<LinkCandidate> {
    if max == 0 {
        return candidates;
    }
    let before = candidates.len();
    let mut seen: HashMap<Resolution, usize> = HashMap::new();
    let kept: Vec<LinkCandidate> = candidates
        .into_iter()
        .filter(|c| {
            let count = seen.entry(c.resolution()).or_default();
            *count += 1;
            *count <= max
        })
        .collect();
    debug!(before, after = kept.len(), max, "per-resolution cap");
    kept
}

/// Keep candidates no larger than `max_gb`, `0` to disable. Candidates of
/// unknown size are dropped while the limit is on.
pub fn by_max_size(candidates: Vec<LinkCandidate>, max_gb: f64) -> Vec<LinkCandidate> {
    if max_gb <= 0.0 {
        return candidates;
    }
    let before = candidates.len();
    let kept: Vec<LinkCandidate> =
        candidates.into_iter().filter(|c| c.size_gb().is_some_and(|size| size <= max_gb)).collect();
    debug!(before, after = kept.len(), max_gb, "size filter");
    kept
}

/// Drop streams whose file is an archive, which media clients can't play.
pub fn without_archives(streams: Vec<Stream>) -> Vec<Stream> {
    let before = streams.len();
    let kept: Vec<Stream> = streams.into_iter().filter(|s| !is_archive(s)).collect();
    debug!(before, after = kept.len(), "archive filter");
    kept
}

fn is_archive(stream: &Stream) -> bool {
    let Some((_, file)) = stream.description.rsplit_once(FILE_MARKER) else {
        return false;
    };
    let file = file.trim().to_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| file.ends_with(ext))
}

/// Drop streams mentioning any keyword in their name or description, case
/// insensitively.
pub fn without_keywords(streams: Vec<Stream>, keywords: &[String]) -> Vec<Stream> {
    let keywords: Vec<String> =
        keywords.iter().map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty()).collect();
    if keywords.is_empty() {
        return streams;
    }
    let before = streams.len();
    let kept: Vec<Stream> = streams
        .into_iter()
        .filter(|s| {
            let text = format!("{} {}", s.name, s.description).to_lowercase();
            !keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .collect();
    debug!(before, after = kept.len(), "keyword filter");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn urls(candidates: &[LinkCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.url.as_str()).collect()
    }

    fn stream(description: &str) -> Stream {
        Stream { name: "[AD ⚡] debrix".into(), description: description.into(), url: "https://x".into() }
    }

    #[test]
    fn test_language_filter_reads_multi_labels() {
        let candidates = vec![
            LinkCandidate::new("a", "s").with_language("Multi (French, English)"),
            LinkCandidate::new("b", "s").with_language("English"),
            LinkCandidate::new("c", "s").with_language("VOSTFR"),
        ];
        assert_eq!(urls(&by_language(candidates.clone(), &strings(&["French", "VOSTFR"]))), ["a", "c"]);
        assert_eq!(by_language(candidates, &[]).len(), 3);
    }

    #[rstest]
    #[case(&["1080p"], &["b"])]
    #[case(&["2160p", "Unknown"], &["a", "d"])]
    #[case(&["720p", "nonsense"], &["c"])]
    #[case(&[], &["a", "b", "c", "d"])]
    fn test_resolution_filter(#[case] allowed: &[&str], #[case] expected: &[&str]) {
        let candidates = vec![
            LinkCandidate::new("a", "s").with_quality("4K REMUX"),
            LinkCandidate::new("b", "s").with_quality("1080p WEB-DL"),
            LinkCandidate::new("c", "s").with_quality("HDLight 720p"),
            LinkCandidate::new("d", "s").with_quality("DVDRip"),
        ];
        assert_eq!(urls(&by_resolution(candidates, &strings(allowed))), expected);
    }

    #[test]
    fn test_cap_per_resolution_keeps_first() {
        let candidates = vec![
            LinkCandidate::new("a", "s").with_quality("1080p"),
            LinkCandidate::new("b", "s").with_quality("720p"),
            LinkCandidate::new("c", "s").with_quality("1080p"),
            LinkCandidate::new("d", "s").with_quality("1080p"),
        ];
        assert_eq!(urls(&cap_per_resolution(candidates.clone(), 2)), ["a", "b", "c"]);
        assert_eq!(cap_per_resolution(candidates, 0).len(), 4);
    }

    #[rstest]
    #[case(0.0, &["a", "b", "c"])]
    #[case(3.0, &["a"])]
    #[case(50.0, &["a", "b"])]
    fn test_max_size(#[case] max_gb: f64, #[case] expected: &[&str]) {
        let candidates = vec![
            LinkCandidate::new("a", "s").with_size("1.4 GB"),
            LinkCandidate::new("b", "s").with_size("12 Go"),
            LinkCandidate::new("c", "s"),
        ];
        assert_eq!(urls(&by_max_size(candidates, max_gb)), expected);
    }

    #[rstest]
    #[case("🌍 wawacity\r\n📁 Heat.1995.part1.RAR", true)]
    #[case("🌍 wawacity\r\n📁 Heat.1995.mkv", false)]
    #[case("🌍 wawacity ☁️ rar.host", false)]
    fn test_archive_detection(#[case] description: &str, #[case] archive: bool) {
        assert_eq!(without_archives(vec![stream(description)]).is_empty(), archive);
    }

    #[test]
    fn test_keywords_match_name_and_description() {
        let streams = vec![stream("🎞️ 1080p CAM"), stream("🎞️ 1080p WEB-DL"), stream("📁 Heat.TS.mkv")];
        let kept = without_keywords(streams, &strings(&["cam", " .ts. ", ""]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].description, "🎞️ 1080p WEB-DL");
        assert!(without_keywords(vec![stream("x")], &strings(&["debrix"])).is_empty());
    }
}
