//! AllDebrid: unlocks hoster links on demand.
//!
//! There's no cache to ask. A link is "cached" when unlocking it yields a
//! direct link straight away, and "delayed" when AllDebrid has to fetch the
//! file first.

use crate::error::{ErrorKind, Result};
use crate::http::HttpClient;
use crate::outcome::{ErrorClass, ProbeResult, ResolutionOutcome, Step, normalize, resolve_error, with_attempts};
use crate::provider::{Credential, Episode, Provider, supports_file, supports_source};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_config::ProviderSettings;
use debrix_model::LinkCandidate;
use exn::ResultExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, instrument};

/// Hosters that can be unlocked directly. Anything else goes through the
/// redirector first.
const DIRECT_HOSTS: [&str; 3] = ["1fichier.com", "turbobit.net", "rapidgator.net"];

/// Provider-side hiccups worth another attempt.
const RETRYABLE_CODES: [&str; 6] = [
    "LINK_HOST_UNAVAILABLE",
    "LINK_TEMPORARY_UNAVAILABLE",
    "LINK_TOO_MANY_DOWNLOADS",
    "LINK_HOST_FULL",
    "LINK_HOST_LIMIT_REACHED",
    "REDIRECTOR_ERROR",
];

fn classify(code: &str) -> ErrorClass {
    match code {
        "LINK_DOWN" => ErrorClass::LinkDown,
        code if RETRYABLE_CODES.contains(&code) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<LinkData>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkData {
    link: Option<String>,
    filename: Option<String>,
    /// Redirector output.
    links: Vec<String>,
    /// Present (with a delay id) when the file isn't ready yet.
    delayed: Option<serde_json::Value>,
}

/// What one API call came back with.
#[derive(Debug)]
enum Reply {
    /// Non-200 status that isn't worth an HTTP-level retry.
    Status(StatusCode),
    Failed(String),
    Data(LinkData),
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Unlock,
    Redirector,
}
impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Self::Unlock => "link/unlock",
            Self::Redirector => "link/redirector",
        }
    }

    fn for_link(link: &str) -> Self {
        if DIRECT_HOSTS.iter().any(|host| link.contains(host)) { Self::Unlock } else { Self::Redirector }
    }
}

pub struct AllDebrid {
    http: HttpClient,
    settings: ProviderSettings,
    agent: String,
}
impl AllDebrid {
    /// `agent` identifies this application to AllDebrid.
    pub fn new(http: HttpClient, settings: ProviderSettings, agent: impl Into<String>) -> Self {
        Self { http, settings, agent: agent.into() }
    }

    async fn call(&self, endpoint: Endpoint, key: &str, link: &str, probing: bool) -> Result<Reply> {
        let url = format!("{}/{}", self.settings.api_url.trim_end_matches('/'), endpoint.path());
        let response = self
            .http
            .send(|client| {
                let request = client.get(&url).query(&[("agent", self.agent.as_str()), ("apikey", key), ("link", link)]);
                if probing { request.timeout(self.http.probe_timeout()) } else { request }
            })
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(Reply::Status(response.status()));
        }
        let envelope: Envelope = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        if envelope.status != "success" {
            let code = envelope.error.map(|e| e.code).unwrap_or_default();
            return Ok(Reply::Failed(code));
        }
        Ok(Reply::Data(envelope.data.unwrap_or_default()))
    }

    /// Unlock `link`, going through the redirector when needed, and map the
    /// final answer to a probe result.
    async fn check(&self, link: &str, key: &str) -> ProbeResult {
        let endpoint = Endpoint::for_link(link);
        let data = match self.call(endpoint, key, link, true).await {
            Ok(Reply::Data(data)) => data,
            Ok(reply) => return probe_failure(reply),
            Err(err) => return probe_error(&err),
        };
        if data.delayed.is_some() {
            return ProbeResult::uncached();
        }
        let data = match endpoint {
            Endpoint::Unlock => data,
            Endpoint::Redirector => {
                let Some(first) = data.links.first() else {
                    return ProbeResult::uncached();
                };
                match self.call(Endpoint::Unlock, key, first, true).await {
                    Ok(Reply::Data(data)) if data.delayed.is_none() => data,
                    Ok(Reply::Failed(code)) if classify(&code) == ErrorClass::LinkDown => return ProbeResult::hidden(),
                    Ok(_) => return ProbeResult::uncached(),
                    Err(err) => return probe_error(&err),
                }
            },
        };
        match data.link {
            Some(direct) => ProbeResult::cached(Some(direct), data.filename),
            None => ProbeResult::uncached(),
        }
    }

    /// One unlock step of a resolution attempt.
    async fn unlock_step(&self, endpoint: Endpoint, key: &str, link: &str, attempt: u32) -> Step<LinkData> {
        match self.call(endpoint, key, link, false).await {
            Ok(Reply::Data(data)) if data.delayed.is_some() => {
                debug!(link, "delayed, not cached");
                Step::Stop(ResolutionOutcome::LinkUncached)
            },
            Ok(Reply::Data(data)) => Step::Continue(data),
            Ok(Reply::Status(status)) => {
                error!(%status, endpoint = endpoint.path(), "unexpected HTTP status");
                Step::Retry
            },
            Ok(Reply::Failed(code)) => {
                debug!(code, "AllDebrid error");
                normalize(classify(&code), attempt, self.http.policy())
            },
            Err(err) => resolve_error(&err),
        }
    }
}

fn probe_failure(reply: Reply) -> ProbeResult {
    match reply {
        Reply::Status(StatusCode::NOT_FOUND) => ProbeResult::hidden(),
        Reply::Failed(code) if classify(&code) == ErrorClass::Transient => ProbeResult::uncached(),
        Reply::Failed(code) => {
            debug!(code, "hiding link");
            ProbeResult::hidden()
        },
        Reply::Status(_) | Reply::Data(_) => ProbeResult::uncached(),
    }
}

fn probe_error(err: &crate::Error) -> ProbeResult {
    debug!(%err, "probe failed");
    if err.is_retryable() { ProbeResult::http_failure() } else { ProbeResult::uncached() }
}

#[async_trait]
impl Provider for AllDebrid {
    fn name(&self) -> &str {
        "AllDebrid"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AllDebrid
    }

    fn supports(&self, candidate: &LinkCandidate, credential: &Credential) -> bool {
        !credential.is_empty() && supports_file(&self.settings, candidate)
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
        self.check(&candidate.url, &credential.api_key).await
    }

    #[instrument("resolving with AllDebrid", skip_all)]
    async fn resolve(&self, link: &str, credential: &Credential, _episode: Option<&Episode>) -> ResolutionOutcome {
        if credential.is_empty() {
            error!("empty API key");
            return ResolutionOutcome::Fatal;
        }
        let key = credential.api_key.as_str();
        let endpoint = Endpoint::for_link(link);
        let resolved = with_attempts(self.http.policy(), "alldebrid unlock", |attempt| async move {
            let data = match self.unlock_step(endpoint, key, link, attempt).await {
                Step::Continue(data) => data,
                Step::Retry => return Step::Retry,
                Step::Stop(outcome) => return Step::Stop(outcome),
            };
            let data = match endpoint {
                Endpoint::Unlock => data,
                Endpoint::Redirector => {
                    let Some(first) = data.links.first() else {
                        error!("redirector returned no links");
                        return Step::Retry;
                    };
                    match self.unlock_step(Endpoint::Unlock, key, first, attempt).await {
                        Step::Continue(data) => data,
                        Step::Retry => return Step::Retry,
                        Step::Stop(outcome) => return Step::Stop(outcome),
                    }
                },
            };
            match data.link {
                Some(direct) => Step::Continue(direct),
                None => Step::Retry,
            }
        })
        .await;
        match resolved {
            Ok(direct) => ResolutionOutcome::Resolved(direct),
            Err(outcome) => outcome,
        }
    }
}
