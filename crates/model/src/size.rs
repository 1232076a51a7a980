use regex::Regex;
use std::sync::LazyLock;

static SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([\d.]+)\s*(GB|MB|KB|GO|MO|KO)").expect("size pattern is valid"));

/// Parse a human size ("1.4 GB", "700 MB") into gigabytes.
///
/// French unit spellings (`Go`, `Mo`, `Ko`) are accepted as scrapers of
/// French catalogs regularly emit them. Anything else yields `None`.
///
/// # Examples
///
/// ```
/// use debrix_model::parse_size_gb;
/// assert_eq!(parse_size_gb("2 GB"), Some(2.0));
/// assert_eq!(parse_size_gb("512 MB"), Some(0.5));
/// assert_eq!(parse_size_gb("Unknown"), None);
/// ```
pub fn parse_size_gb(size: &str) -> Option<f64> {
    let captures = SIZE.captures(size)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    match captures.get(2)?.as_str().to_uppercase().as_str() {
        "GB" | "GO" => Some(value),
        "MB" | "MO" => Some(value / 1024.0),
        "KB" | "KO" => Some(value / (1024.0 * 1024.0)),
        _ => None,
    }
}
