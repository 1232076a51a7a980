/// Build the logical cache key for a search.
///
/// The title is lowercased and percent-encoded so that any title is safe to
/// use as a key, and so that "Heat" and "heat" share an entry.
///
/// # Examples
///
/// ```
/// use debrix_store::cache_key;
/// assert_eq!(cache_key("wawacity_movie", "Heat", Some("1995")), "wawacity_movie:heat:1995");
/// assert_eq!(cache_key("darki-api_series_s1e3", "The Office", None), "darki-api_series_s1e3:the%20office");
/// ```
pub fn cache_key(category: &str, title: &str, year: Option<&str>) -> String {
    let title = urlencoding::encode(&title.trim().to_lowercase()).into_owned();
    match year.map(str::trim).filter(|year| !year.is_empty()) {
        Some(year) => format!("{category}:{title}:{year}"),
        None => format!("{category}:{title}"),
    }
}
