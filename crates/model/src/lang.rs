//! Language labels as scrapers emit them.
//!
//! A label is either a single language ("French", "VOSTFR") or a list of
//! audio tracks written as `Multi (French, English)`.

use std::fmt::{Display, Formatter, Result as FmtResult};

const MULTI_PREFIX: &str = "Multi (";

/// Parsed language label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    Single(String),
    Multi(Vec<String>),
}
impl Language {
    /// Parse a scraped label.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_model::Language;
    /// let multi = Language::parse("Multi (French, English)");
    /// assert_eq!(multi, Language::Multi(vec!["French".into(), "English".into()]));
    /// assert_eq!(Language::parse("VOSTFR"), Language::Single("VOSTFR".into()));
    /// ```
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        match label.strip_prefix(MULTI_PREFIX).and_then(|rest| rest.strip_suffix(')')) {
            Some(inner) => Self::Multi(
                inner.split(',').map(str::trim).filter(|lang| !lang.is_empty()).map(str::to_string).collect(),
            ),
            None => Self::Single(label.to_string()),
        }
    }

    /// All languages carried by this label.
    pub fn languages(&self) -> Vec<&str> {
        match self {
            Self::Single(lang) => vec![lang.as_str()],
            Self::Multi(langs) => langs.iter().map(String::as_str).collect(),
        }
    }

    /// Whether any of the carried languages is in the allow-list. An empty
    /// allow-list allows everything.
    pub fn matches(&self, allowed: &[String]) -> bool {
        allowed.is_empty() || self.languages().iter().any(|lang| allowed.iter().any(|a| a == lang))
    }

    /// Restrict a multi-language label to the allowed languages, for display.
    ///
    /// Single labels and labels with no overlap are returned unchanged.
    pub fn narrowed(&self, allowed: &[String]) -> Self {
        match self {
            Self::Multi(langs) if !allowed.is_empty() => {
                let kept: Vec<String> = langs.iter().filter(|lang| allowed.contains(lang)).cloned().collect();
                if kept.is_empty() { self.clone() } else { Self::Multi(kept) }
            },
            _ => self.clone(),
        }
    }
}
impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Single(lang) => f.write_str(lang),
            Self::Multi(langs) => write!(f, "{MULTI_PREFIX}{})", langs.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn allow(langs: &[&str]) -> Vec<String> {
        langs.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("French", &["French"], true)]
    #[case("French", &["English"], false)]
    #[case("Multi (French, English)", &["English"], true)]
    #[case("Multi (French, English)", &["German"], false)]
    #[case("Anything", &[], true)]
    fn test_matches(#[case] label: &str, #[case] allowed: &[&str], #[case] expected: bool) {
        assert_eq!(Language::parse(label).matches(&allow(allowed)), expected);
    }

    #[rstest]
    #[case("Multi (French, English, German)", &["German", "French"], "Multi (French, German)")]
    #[case("Multi (French, English)", &["Italian"], "Multi (French, English)")]
    #[case("Multi (French, English)", &[], "Multi (French, English)")]
    #[case("French", &["English"], "French")]
    fn test_narrowed(#[case] label: &str, #[case] allowed: &[&str], #[case] expected: &str) {
        assert_eq!(Language::parse(label).narrowed(&allow(allowed)).to_string(), expected);
    }

    #[test]
    fn test_display_round_trips_label() {
        let label = "Multi (French, English)";
        assert_eq!(Language::parse(label).to_string(), label);
    }
}
