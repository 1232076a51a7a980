//! TorBox: hash-addressed cache for web downloads and usenet.
//!
//! Links are identified by the MD5 of their cleaned URL, which lets a whole
//! batch be checked in a single request. Resolving means creating a
//! download and then requesting a playback URL for one of its files.

use crate::error::{ErrorKind, Result};
use crate::http::HttpClient;
use crate::outcome::{ErrorClass, ProbeResult, ResolutionOutcome, Step, normalize, resolve_error, with_attempts};
use crate::provider::{Credential, Episode, Provider, strip_affiliate, supports_file, supports_source};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_asyncutils::Deadline;
use debrix_config::ProviderSettings;
use debrix_model::{LinkCandidate, LinkKind};
use exn::ResultExt;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, instrument, warn};

/// Rate limiting reported in the response body rather than the status.
const COOLDOWN: &str = "COOLDOWN_LIMIT";

const RETRYABLE_CODES: [&str; 2] = ["DOWNLOAD_SERVER_ERROR", "NO_SERVERS_AVAILABLE_ERROR"];

fn classify(code: &str) -> ErrorClass {
    match code {
        "LINK_OFFLINE" => ErrorClass::LinkDown,
        code if RETRYABLE_CODES.contains(&code) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

/// Web downloads and usenet downloads live under different endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadType {
    Web,
    Usenet,
}
impl DownloadType {
    fn of_link(link: &str) -> Self {
        if link.contains("/nzb/") { Self::Usenet } else { Self::Web }
    }

    fn of(candidate: &LinkCandidate) -> Self {
        match candidate.kind {
            LinkKind::Usenet => Self::Usenet,
            LinkKind::File => Self::of_link(&candidate.url),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Web => "webdl",
            Self::Usenet => "usenet",
        }
    }

    fn create_path(self) -> &'static str {
        match self {
            Self::Web => "webdl/createwebdownload",
            Self::Usenet => "usenet/createusenetdownload",
        }
    }

    fn id_field(self) -> &'static str {
        match self {
            Self::Web => "webdownload_id",
            Self::Usenet => "usenetdownload_id",
        }
    }

    fn id_param(self) -> &'static str {
        match self {
            Self::Web => "web_id",
            Self::Usenet => "usenet_id",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "succeeded")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
}

fn succeeded() -> bool {
    true
}

impl Envelope {
    /// The API error code, if the call failed.
    fn error_code(&self) -> Option<&str> {
        match (&self.error, self.success) {
            (Some(code), false) => Some(code.as_str()),
            (Some(code), true) if code == COOLDOWN => Some(code.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TorBoxFile {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    size: u64,
}

/// Pick the file to play out of a multi-file download: the largest one
/// whose name carries the episode marker, else the largest overall.
fn pick_file<'a>(files: &'a [TorBoxFile], episode: Option<&Episode>) -> Option<&'a TorBoxFile> {
    let pattern = episode.and_then(Episode::pattern);
    pattern
        .and_then(|pattern| {
            files.iter().filter(|f| f.short_name.to_uppercase().contains(&pattern)).max_by_key(|f| f.size)
        })
        .or_else(|| files.iter().max_by_key(|f| f.size))
}

fn files_of(value: &Value) -> Vec<TorBoxFile> {
    value.get("files").and_then(|files| serde_json::from_value(files.clone()).ok()).unwrap_or_default()
}

pub struct TorBox {
    http: HttpClient,
    settings: ProviderSettings,
}
impl TorBox {
    pub fn new(http: HttpClient, settings: ProviderSettings) -> Self {
        Self { http, settings }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_url.trim_end_matches('/'), path)
    }

    /// The link TorBox knows a download by. Usenet links are rewritten to
    /// the NZB download URL.
    fn canonical_link(&self, link: &str, kind: DownloadType) -> String {
        match kind {
            DownloadType::Web => strip_affiliate(link).to_string(),
            DownloadType::Usenet => {
                let id = link.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
                let base = match &self.settings.usenet_base_url {
                    Some(base) => base.trim_end_matches('/'),
                    None => link.split("/nzb/").next().unwrap_or_default(),
                };
                format!("{base}/nzb/{id}/download")
            },
        }
    }

    fn hash(&self, link: &str, kind: DownloadType) -> String {
        format!("{:x}", md5::compute(self.canonical_link(link, kind)))
    }

    /// One `checkcached` request for `hashes`, retrying on cooldown.
    ///
    /// `Ok(None)` means the provider refused outright (bad key or unknown
    /// endpoint) and every link should be hidden.
    async fn check_cached(&self, kind: DownloadType, hashes: &[String], key: &str) -> Result<Option<Map<String, Value>>> {
        let url = self.url(&format!("{}/checkcached", kind.prefix()));
        let mut query: Vec<(&str, &str)> = hashes.iter().map(|h| ("hash", h.as_str())).collect();
        query.push(("format", "object"));
        if kind == DownloadType::Usenet {
            query.push(("list_files", "true"));
        }
        let mut cooldowns = 0;
        loop {
            let response = self
                .http
                .send(|client| client.get(&url).query(&query).bearer_auth(key).timeout(self.http.probe_timeout()))
                .await?;
            match response.status() {
                StatusCode::OK => {},
                StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
                    error!(status = %response.status(), "TorBox refused cache check");
                    return Ok(None);
                },
                status => {
                    debug!(%status, "unexpected cache check status");
                    return Ok(Some(Map::new()));
                },
            }
            let envelope: Envelope = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
            if envelope.error_code() == Some(COOLDOWN) {
                cooldowns += 1;
                if cooldowns >= self.http.policy().http_max_retries {
                    warn!(cooldowns, "TorBox cooldown persisted");
                    exn::bail!(ErrorKind::RetryExhausted(StatusCode::TOO_MANY_REQUESTS.as_u16()));
                }
                tokio::time::sleep(self.http.policy().http_retry_delay).await;
                continue;
            }
            return Ok(Some(match envelope.data {
                Value::Object(map) => map,
                _ => Map::new(),
            }));
        }
    }

    /// Probe candidates of a single download type with one request.
    async fn probe_kind(&self, kind: DownloadType, candidates: &[&LinkCandidate], key: &str) -> Vec<ProbeResult> {
        let hashes: Vec<String> = candidates.iter().map(|c| self.hash(&c.url, kind)).collect();
        let cached = match self.check_cached(kind, &hashes, key).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return candidates.iter().map(|_| ProbeResult::hidden()).collect(),
            Err(err) => {
                debug!(%err, "cache check failed");
                let failure = if err.is_retryable() { ProbeResult::http_failure() } else { ProbeResult::uncached() };
                return vec![failure; candidates.len()];
            },
        };
        candidates
            .iter()
            .zip(&hashes)
            .map(|(candidate, hash)| match cached.get(hash) {
                Some(info @ Value::Object(_)) => {
                    let filename = match kind {
                        DownloadType::Usenet => {
                            let files = files_of(info);
                            pick_file(&files, Episode::of(candidate).as_ref()).map(|f| f.short_name.clone())
                        },
                        DownloadType::Web => info.get("name").and_then(Value::as_str).map(String::from),
                    };
                    ProbeResult::cached(None, filename)
                },
                _ => ProbeResult::uncached(),
            })
            .collect()
    }

    /// Create a download for `link`. Returns its id when `want_id` is set.
    async fn create_download(&self, link: &str, kind: DownloadType, key: &str, want_id: bool) -> std::result::Result<u64, ResolutionOutcome> {
        let url = self.url(kind.create_path());
        let url = url.as_str();
        let cooldowns = AtomicU32::new(0);
        let cooldowns = &cooldowns;
        with_attempts(self.http.policy(), "torbox create download", |attempt| async move {
            let sent = self
                .http
                .send(|client| {
                    let mut form = vec![("link", link)];
                    if kind == DownloadType::Web {
                        form.push(("add_only_if_cached", "false"));
                    }
                    client.post(url).form(&form).bearer_auth(key)
                })
                .await;
            let envelope = match self.envelope(sent).await {
                Ok(envelope) => envelope,
                Err(step) => return step,
            };
            if let Some(code) = envelope.error_code() {
                return self.api_error(code, attempt, cooldowns).await;
            }
            if !want_id {
                return Step::Continue(0);
            }
            let id = envelope.data.get(kind.id_field()).and_then(|id| id.as_u64().or_else(|| id.as_str()?.parse().ok()));
            match id {
                Some(id) => Step::Continue(id),
                None => {
                    error!(field = kind.id_field(), "download created without an id");
                    Step::Retry
                },
            }
        })
        .await
    }

    /// Status and body checks shared by every resolution step.
    async fn envelope<T>(&self, sent: Result<reqwest::Response>) -> std::result::Result<Envelope, Step<T>> {
        let response = sent.map_err(|err| resolve_error(&err))?;
        match response.status() {
            StatusCode::OK => {},
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(status = %response.status(), "TorBox rejected the API key");
                return Err(Step::Stop(ResolutionOutcome::Fatal));
            },
            status => {
                error!(%status, "unexpected HTTP status");
                return Err(Step::Retry);
            },
        }
        response.json::<Envelope>().await.map_err(|err| {
            debug!(%err, "unreadable TorBox response");
            Step::Retry
        })
    }

    async fn api_error<T>(&self, code: &str, attempt: u32, cooldowns: &AtomicU32) -> Step<T> {
        if code == COOLDOWN {
            if cooldowns.fetch_add(1, Ordering::Relaxed) + 1 >= self.http.policy().http_max_retries {
                return Step::Stop(ResolutionOutcome::RetryExhausted);
            }
            tokio::time::sleep(self.http.policy().http_retry_delay).await;
            return Step::Retry;
        }
        debug!(code, "TorBox error");
        normalize(classify(code), attempt, self.http.policy())
    }

    /// Pick the file to play out of a usenet download.
    async fn usenet_file(&self, id: u64, key: &str, episode: Option<&Episode>) -> Option<u64> {
        let url = self.url("usenet/mylist");
        let response = self.http.send(|client| client.get(&url).query(&[("id", id)]).bearer_auth(key)).await.ok()?;
        if response.status() != StatusCode::OK {
            error!(status = %response.status(), "could not list usenet download files");
            return None;
        }
        let envelope: Envelope = response.json().await.ok()?;
        if !envelope.success {
            return None;
        }
        let files = files_of(&envelope.data);
        pick_file(&files, episode).map(|f| f.id)
    }

    async fn request_link(&self, id: u64, file_id: u64, kind: DownloadType, key: &str) -> std::result::Result<String, ResolutionOutcome> {
        let url = self.url(&format!("{}/requestdl", kind.prefix()));
        let (id, file_id) = (id.to_string(), file_id.to_string());
        let (url, id, file_id) = (url.as_str(), id.as_str(), file_id.as_str());
        let cooldowns = AtomicU32::new(0);
        let cooldowns = &cooldowns;
        with_attempts(self.http.policy(), "torbox request link", |attempt| async move {
            let query = [("token", key), (kind.id_param(), id), ("file_id", file_id), ("zip_link", "false")];
            let sent = self.http.send(|client| client.get(url).query(&query).bearer_auth(key)).await;
            let envelope = match self.envelope(sent).await {
                Ok(envelope) => envelope,
                Err(step) => return step,
            };
            if let Some(code) = envelope.error_code() {
                return self.api_error(code, attempt, cooldowns).await;
            }
            match envelope.data.as_str() {
                Some(link) if !link.is_empty() => Step::Continue(link.to_string()),
                _ => {
                    error!("no playback link in response");
                    Step::Retry
                },
            }
        })
        .await
    }
}

#[async_trait]
impl Provider for TorBox {
    fn name(&self) -> &str {
        "TorBox"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::TorBox
    }

    fn supports(&self, candidate: &LinkCandidate, credential: &Credential) -> bool {
        if credential.is_empty() {
            return false;
        }
        match candidate.kind {
            LinkKind::Usenet => credential.usenet,
            LinkKind::File => supports_file(&self.settings, candidate),
        }
    }

    fn supports_source(&self, source: &str) -> bool {
        supports_source(&self.settings, source)
    }

    fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    async fn probe(&self, candidate: &LinkCandidate, credential: &Credential) -> ProbeResult {
        if credential.is_empty() {
            return ProbeResult::hidden();
        }
        let kind = DownloadType::of(candidate);
        self.probe_kind(kind, &[candidate], &credential.api_key).await.pop().unwrap_or_else(ProbeResult::uncached)
    }

    /// Web and usenet links are each checked with a single request.
    async fn probe_batch(
        &self,
        candidates: &[LinkCandidate],
        credential: &Credential,
        deadline: Deadline,
    ) -> Vec<ProbeResult> {
        if credential.is_empty() {
            return candidates.iter().map(|_| ProbeResult::hidden()).collect();
        }
        let (usenet, web): (Vec<(usize, &LinkCandidate)>, Vec<(usize, &LinkCandidate)>) =
            candidates.iter().enumerate().partition(|(_, c)| DownloadType::of(c) == DownloadType::Usenet);
        let mut results = vec![ProbeResult::uncached(); candidates.len()];
        for (kind, group) in [(DownloadType::Web, web), (DownloadType::Usenet, usenet)] {
            if group.is_empty() {
                continue;
            }
            let members: Vec<&LinkCandidate> = group.iter().map(|(_, c)| *c).collect();
            let Some(probed) = deadline.within(self.probe_kind(kind, &members, &credential.api_key)).await else {
                debug!(kind = kind.prefix(), "cache check ran out of time");
                break;
            };
            for ((index, _), result) in group.iter().zip(probed) {
                results[*index] = result;
            }
        }
        results
    }

    #[instrument("resolving with TorBox", skip_all)]
    async fn resolve(&self, link: &str, credential: &Credential, episode: Option<&Episode>) -> ResolutionOutcome {
        if credential.is_empty() {
            error!("empty API key");
            return ResolutionOutcome::Fatal;
        }
        let key = credential.api_key.as_str();
        let kind = DownloadType::of_link(link);
        let canonical = self.canonical_link(link, kind);

        let candidate = LinkCandidate::new(link, "");
        let probed = self.probe_kind(kind, &[&candidate], key).await;
        let cached = probed.first().is_some_and(ProbeResult::is_cached);
        if !cached {
            return match self.create_download(&canonical, kind, key, false).await {
                Ok(_) => {
                    debug!("download started, not cached yet");
                    ResolutionOutcome::LinkUncached
                },
                Err(outcome) => outcome,
            };
        }

        let id = match self.create_download(&canonical, kind, key, true).await {
            Ok(id) => id,
            Err(outcome) => return outcome,
        };
        let file_id = match kind {
            DownloadType::Web => 0,
            DownloadType::Usenet => match self.usenet_file(id, key, episode).await {
                Some(file_id) => file_id,
                None => return ResolutionOutcome::Fatal,
            },
        };
        match self.request_link(id, file_id, kind, key).await {
            Ok(direct) => ResolutionOutcome::Resolved(direct),
            Err(outcome) => outcome,
        }
    }
}
