//! Per-request user configuration.
//!
//! Media clients embed the user's preferences in every URL as base64-encoded
//! JSON. It carries the provider credentials, so it is never logged whole.

use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

/// Service names accepted in [`ProviderCredential::service`].
pub const SERVICES: [&str; 4] = ["alldebrid", "torbox", "premiumize", "1fichier"];

const MAX_TIMEOUT_SECS: u64 = 120;

/// One enabled provider and the user's key for it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub service: String,
    pub api_key: String,
}
impl Debug for ProviderCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProviderCredential").field("service", &self.service).field("api_key", &"***").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Enabled providers, in the order results should prefer them.
    pub providers: Vec<ProviderCredential>,
    /// Include usenet (NZB) links for providers that can fetch them.
    pub enable_usenet: bool,
    /// Allowed languages. Empty allows all.
    pub languages: Vec<String>,
    /// Allowed resolutions ("2160p", "1080p", "720p", "480p", "Unknown").
    pub resolutions: Vec<String>,
    /// Cap per resolution bucket, `0` for unlimited.
    pub max_results_per_resolution: usize,
    /// Largest accepted size in GB, `0` to disable.
    pub max_size_gb: f64,
    /// Case-insensitive keywords that hide a result.
    pub excluded_keywords: Vec<String>,
    /// Only return results that play instantly.
    pub cached_only: bool,
    /// Overall time budget of a stream request.
    pub timeout_secs: u64,
}
impl Default for UserConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            enable_usenet: false,
            languages: Vec::new(),
            resolutions: ["2160p", "1080p", "720p", "480p", "Unknown"].map(String::from).to_vec(),
            max_results_per_resolution: 0,
            max_size_gb: 0.0,
            excluded_keywords: Vec::new(),
            cached_only: false,
            timeout_secs: 20,
        }
    }
}
impl UserConfig {
    /// Decode and validate the config segment of a request URL.
    ///
    /// URL-safe base64 is expected, but the standard alphabet and padded
    /// variants are accepted too since clients aren't consistent about it.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_config::{ProviderCredential, UserConfig};
    /// let mut config = UserConfig::default();
    /// config.providers.push(ProviderCredential { service: "torbox".into(), api_key: "k".into() });
    /// let decoded = UserConfig::decode(&config.encode()).unwrap();
    /// assert_eq!(decoded, config);
    /// ```
    pub fn decode(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .or_else(|_| URL_SAFE.decode(encoded))
            .or_else(|_| STANDARD.decode(encoded))
            .or_raise(|| ErrorKind::Decode)?;
        let config: Self = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn encode(&self) -> String {
        // Serializing plain data to JSON can't fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> { exn::bail!(ErrorKind::Invalid(message)) };
        if self.providers.is_empty() {
            return invalid("at least one provider is required".to_string());
        }
        if let Some(unknown) = self.providers.iter().find(|p| !SERVICES.contains(&p.service.as_str())) {
            return invalid(format!("unknown provider {:?}", unknown.service));
        }
        if !self.max_size_gb.is_finite() || self.max_size_gb < 0.0 {
            return invalid("max_size_gb must be a positive number or 0".to_string());
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return invalid(format!("timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credential for a service, if the user enabled it.
    pub fn credential(&self, service: &str) -> Option<&ProviderCredential> {
        self.providers.iter().find(|p| p.service.eq_ignore_ascii_case(service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config_with(service: &str) -> UserConfig {
        UserConfig {
            providers: vec![ProviderCredential { service: service.to_string(), api_key: "secret".to_string() }],
            ..UserConfig::default()
        }
    }

    #[test]
    fn test_decode_fills_defaults() {
        let json = r#"{"providers": [{"service": "alldebrid", "api_key": "k"}], "cached_only": true}"#;
        let config = UserConfig::decode(&STANDARD.encode(json)).unwrap();
        assert!(config.cached_only);
        assert_eq!(config.timeout_secs, 20);
        assert_eq!(config.resolutions.len(), 5);
    }

    #[rstest]
    #[case::url_safe(URL_SAFE_NO_PAD.encode(config_with("torbox").encode_json()))]
    #[case::url_safe_padded(URL_SAFE.encode(config_with("torbox").encode_json()))]
    #[case::standard(STANDARD.encode(config_with("torbox").encode_json()))]
    fn test_decode_accepts_alphabets(#[case] encoded: String) {
        assert_eq!(UserConfig::decode(&encoded).unwrap().providers[0].service, "torbox");
    }

    #[rstest]
    #[case::not_base64("!!!")]
    #[case::not_json("bm90IGpzb24")]
    fn test_decode_rejects_garbage(#[case] encoded: &str) {
        let err = UserConfig::decode(encoded).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode));
    }

    #[test]
    fn test_validate() {
        assert!(config_with("premiumize").validate().is_ok());
        assert!(config_with("realdebrid").validate().is_err());
        assert!(UserConfig::default().validate().is_err(), "no providers");

        let mut config = config_with("1fichier");
        config.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.timeout_secs = 20;
        config.max_size_gb = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let printed = format!("{:?}", config_with("torbox"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_credential_lookup_ignores_case() {
        let config = config_with("torbox");
        assert!(config.credential("TorBox").is_some());
        assert!(config.credential("alldebrid").is_none());
    }

    impl UserConfig {
        fn encode_json(&self) -> Vec<u8> {
            serde_json::to_vec(self).unwrap()
        }
    }
}
