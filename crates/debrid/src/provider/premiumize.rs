//! Premiumize: no usable cache check, so every supported link counts as
//! cached and the real work happens in [`resolve`](Provider::resolve).

use crate::http::HttpClient;
use crate::outcome::{ErrorClass, ProbeResult, ResolutionOutcome, Step, normalize, resolve_error, with_attempts};
use crate::provider::{Credential, Episode, Provider, supports_file, supports_source};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_config::ProviderSettings;
use debrix_model::LinkCandidate;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, instrument};

/// Matched case-insensitively.
const LINK_DOWN_MESSAGES: [&str; 3] = ["not found", "not available", "offline"];
/// Matched as is.
const RETRYABLE_MESSAGES: [&str; 2] = ["Fair use limit reached!", "maximum of 25 active downloads"];

fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if LINK_DOWN_MESSAGES.iter().any(|m| lower.contains(m)) {
        ErrorClass::LinkDown
    } else if RETRYABLE_MESSAGES.iter().any(|m| message.contains(m)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

#[derive(Debug, Deserialize)]
struct DirectDl {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    content: Vec<Content>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    link: Option<String>,
}

pub struct Premiumize {
    http: HttpClient,
    settings: ProviderSettings,
}
impl Premiumize {
    pub fn new(http: HttpClient, settings: ProviderSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl Provider for Premiumize {
    fn name(&self) -> &str {
        "Premiumize"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Premiumize
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

    async fn probe(&self, _candidate: &LinkCandidate, credential: &Credential) -> ProbeResult {
        if credential.is_empty() {
            return ProbeResult::hidden();
        }
        ProbeResult::cached(None, None)
    }

    #[instrument("resolving with Premiumize", skip_all)]
    async fn resolve(&self, link: &str, credential: &Credential, _episode: Option<&Episode>) -> ResolutionOutcome {
        if credential.is_empty() {
            error!("empty API key");
            return ResolutionOutcome::Fatal;
        }
        let key = credential.api_key.as_str();
        let url = format!("{}/transfer/directdl", self.settings.api_url.trim_end_matches('/'));
        let url = url.as_str();
        let resolved = with_attempts(self.http.policy(), "premiumize directdl", |attempt| async move {
            let response = match self.http.send(|client| client.get(url).query(&[("apikey", key), ("src", link)])).await {
                Ok(response) => response,
                Err(err) => return resolve_error(&err),
            };
            match response.status() {
                StatusCode::OK => {},
                status @ (StatusCode::UNAUTHORIZED | StatusCode::PAYMENT_REQUIRED | StatusCode::NOT_FOUND) => {
                    error!(%status, "Premiumize refused the request");
                    return Step::Stop(ResolutionOutcome::Fatal);
                },
                status => {
                    error!(%status, "unexpected HTTP status");
                    return Step::Retry;
                },
            }
            let body: DirectDl = match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(%err, "unreadable response");
                    return Step::Retry;
                },
            };
            if body.status != "success" {
                let message = body.message.unwrap_or_default();
                debug!(message, "Premiumize error");
                return normalize(classify(&message), attempt, self.http.policy());
            }
            let direct = match body.content.into_iter().next() {
                Some(content) => content.link,
                None => body.location,
            };
            match direct {
                Some(direct) if !direct.is_empty() => Step::Continue(direct),
                _ => {
                    error!("no direct link in response");
                    Step::Retry
                },
            }
        })
        .await;
        match resolved {
            Ok(direct) => ResolutionOutcome::Resolved(direct),
            Err(outcome) => outcome,
        }
    }
}
