//! Process-wide settings.
//!
//! Layered with figment: built-in defaults, then a TOML file, then
//! `DEBRIX_`-prefixed environment variables (nested keys separated by a
//! double underscore, e.g. `DEBRIX_SERVER__PORT=8080`).

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "DEBRIX_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shown in stream names and sent as the user agent/agent name to
    /// providers that want one.
    pub addon_name: String,
    /// Fallback tracing filter when `RUST_LOG` isn't set.
    pub log_level: String,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub lock: LockSettings,
    pub http: HttpSettings,
    pub debrid: DebridSettings,
    pub sources: Vec<SourceSettings>,
    pub metadata: MetadataSettings,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            addon_name: "Debrix".to_string(),
            log_level: "info".to_string(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            cache: CacheSettings::default(),
            lock: LockSettings::default(),
            http: HttpSettings::default(),
            debrid: DebridSettings::default(),
            sources: Vec::new(),
            metadata: MetadataSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used when building resolve links.
    /// Derived from the request's Host header when unset.
    pub public_url: Option<String>,
}
impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 7000, public_url: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}
impl Default for DatabaseSettings {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", "debrix")
            .map(|dirs| dirs.data_dir().join("debrix.sqlite"))
            .unwrap_or_else(|| PathBuf::from("debrix.sqlite"));
        Self { path }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub content_ttl_secs: u64,
    pub dead_link_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}
impl Default for CacheSettings {
    fn default() -> Self {
        Self { content_ttl_secs: 3600, dead_link_ttl_secs: 30 * 24 * 3600, sweep_interval_secs: 60 }
    }
}
impl CacheSettings {
    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }

    pub fn dead_link_ttl(&self) -> Duration {
        Duration::from_secs(self.dead_link_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub ttl_secs: u64,
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
}
impl Default for LockSettings {
    fn default() -> Self {
        Self { ttl_secs: 300, wait_timeout_secs: 30, poll_interval_ms: 1000 }
    }
}
impl LockSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout for provider and collaborator calls.
    pub timeout_secs: u64,
    /// Tighter timeout for cache probes, which run in large batches.
    pub probe_timeout_secs: u64,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}
impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 15, probe_timeout_secs: 3, proxy: None, user_agent: None }
    }
}
impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebridSettings {
    /// Attempts for a provider-level transient error ("host busy", ...).
    pub max_attempts: u32,
    pub attempt_delay_secs: u64,
    /// Retries for HTTP 429/5xx responses within a single call.
    pub http_max_retries: u32,
    pub http_retry_delay_ms: u64,
    /// Consecutive failed probes after which a provider is considered down
    /// for the rest of the request.
    pub max_consecutive_http_errors: u32,
    /// Pause between two probe batches, to stay under rate limits.
    pub batch_delay_ms: u64,
    /// Default overall time budget of one aggregation request.
    pub request_timeout_secs: u64,
    pub alldebrid: ProviderSettings,
    pub torbox: ProviderSettings,
    pub premiumize: ProviderSettings,
    pub onefichier: ProviderSettings,
}
impl Default for DebridSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_delay_secs: 4,
            http_max_retries: 5,
            http_retry_delay_ms: 1000,
            max_consecutive_http_errors: 5,
            batch_delay_ms: 1000,
            request_timeout_secs: 20,
            alldebrid: ProviderSettings::new(
                "https://api.alldebrid.com/v4",
                &["1fichier", "turbobit", "rapidgator"],
                &["wawacity", "darki-api"],
                12,
            ),
            torbox: ProviderSettings::new(
                "https://api.torbox.app/v1/api",
                &["1fichier", "turbobit", "rapidgator", "dailyuploads", "sendcm", "darkibox"],
                &["darki-api"],
                50,
            ),
            premiumize: ProviderSettings::new(
                "https://www.premiumize.me/api",
                &["1fichier", "turbobit", "rapidgator", "dailyuploads"],
                &["darki-api"],
                12,
            ),
            onefichier: ProviderSettings::new("https://api.1fichier.com/v1", &["1fichier"], &[], 12),
        }
    }
}
impl DebridSettings {
    pub fn attempt_delay(&self) -> Duration {
        Duration::from_secs(self.attempt_delay_secs)
    }

    pub fn http_retry_delay(&self) -> Duration {
        Duration::from_millis(self.http_retry_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn providers(&self) -> [(&'static str, &ProviderSettings); 4] {
        [
            ("alldebrid", &self.alldebrid),
            ("torbox", &self.torbox),
            ("premiumize", &self.premiumize),
            ("onefichier", &self.onefichier),
        ]
    }
}

/// Per-provider endpoint and support matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_url: String,
    /// Hoster names (matched as a case-insensitive substring of the
    /// candidate's hoster). Empty means every hoster.
    pub hosts: Vec<String>,
    /// Scraping sources the provider accepts links from. Empty means all.
    pub sources: Vec<String>,
    /// Concurrent probes per batch.
    pub batch_size: usize,
    /// TorBox only: base URL that NZB ids are rewritten against before
    /// hashing and submitting.
    pub usenet_base_url: Option<String>,
}
impl Default for ProviderSettings {
    fn default() -> Self {
        Self::new("", &[], &[], 12)
    }
}
impl ProviderSettings {
    pub fn new(api_url: &str, hosts: &[&str], sources: &[&str], batch_size: usize) -> Self {
        Self {
            api_url: api_url.to_string(),
            hosts: hosts.iter().map(|s| s.to_string()).collect(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            batch_size,
            usenet_base_url: None,
        }
    }
}

/// A remote scraping source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Source name stamped on candidates, e.g. `wawacity` or `darki-api`.
    pub name: String,
    pub url: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Base URL of the metadata service; content ids are appended.
    pub url: Option<String>,
}

impl Settings {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "debrix").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The layered figment, without extracting or validating it.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                if let Some(default) = Self::default_path() {
                    debug!(path = %default.display(), "looking for configuration file");
                    figment = figment.merge(Toml::file(default));
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, merge and validate settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings: Settings = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> { exn::bail!(ErrorKind::Invalid(message)) };
        if self.server.port == 0 {
            return invalid("server.port must not be 0".to_string());
        }
        if self.debrid.max_attempts == 0 {
            return invalid("debrid.max_attempts must be at least 1".to_string());
        }
        if self.debrid.http_max_retries == 0 {
            return invalid("debrid.http_max_retries must be at least 1".to_string());
        }
        if self.debrid.request_timeout_secs == 0 {
            return invalid("debrid.request_timeout_secs must be at least 1".to_string());
        }
        for (name, provider) in self.debrid.providers() {
            if provider.api_url.trim().is_empty() {
                return invalid(format!("debrid.{name}.api_url must not be empty"));
            }
            if provider.batch_size == 0 {
                return invalid(format!("debrid.{name}.batch_size must be at least 1"));
            }
        }
        if let Some(source) = self.sources.iter().find(|s| s.name.trim().is_empty() || s.url.trim().is_empty()) {
            return invalid(format!("source {:?} needs both a name and a url", source.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_default_durations() {
        let settings = Settings::default();
        assert_eq!(settings.cache.content_ttl(), Duration::from_secs(3600));
        assert_eq!(settings.cache.dead_link_ttl(), Duration::from_secs(2_592_000));
        assert_eq!(settings.lock.wait_timeout(), Duration::from_secs(30));
        assert_eq!(settings.debrid.request_timeout(), Duration::from_secs(20));
        assert_eq!(settings.debrid.alldebrid.batch_size, 12);
    }

    #[test]
    fn test_explicit_file_is_merged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            addon_name = "Test"

            [server]
            port = 9000

            [debrid.torbox]
            usenet_base_url = "https://nzb.example"

            [[sources]]
            name = "darki-api"
            url = "https://scraper.example/search"
            "#
        )
        .unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.addon_name, "Test");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0", "unset keys keep their defaults");
        assert_eq!(settings.debrid.torbox.usenet_base_url.as_deref(), Some("https://nzb.example"));
        assert_eq!(settings.debrid.torbox.api_url, "https://api.torbox.app/v1/api");
        assert_eq!(settings.sources.len(), 1);
        assert!(settings.sources[0].enabled);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let err = Settings::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingFile(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[server]\nport = 9000\n")?;
            jail.set_env("DEBRIX_SERVER__PORT", "9100");
            jail.set_env("DEBRIX_DEBRID__MAX_ATTEMPTS", "2");
            let settings = Settings::load(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(settings.server.port, 9100);
            assert_eq!(settings.debrid.max_attempts, 2);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut settings = Settings::default();
        settings.debrid.premiumize.api_url = " ".to_string();
        let err = settings.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains("premiumize")));

        let mut settings = Settings::default();
        settings.debrid.max_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
