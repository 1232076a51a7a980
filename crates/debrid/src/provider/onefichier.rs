//! 1fichier premium accounts: the hoster itself hands out download tokens.

use crate::http::HttpClient;
use crate::outcome::{ProbeResult, ResolutionOutcome, Step, resolve_error, with_attempts};
use crate::provider::{Credential, Episode, Provider, strip_affiliate, supports_file, supports_source};
use crate::registry::ProviderKind;
use async_trait::async_trait;
use debrix_config::ProviderSettings;
use debrix_model::LinkCandidate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    url: &'a str,
    inline: u8,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct OneFichier {
    http: HttpClient,
    settings: ProviderSettings,
}
impl OneFichier {
    pub fn new(http: HttpClient, settings: ProviderSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait]
impl Provider for OneFichier {
    fn name(&self) -> &str {
        "1fichier"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OneFichier
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

    #[instrument("resolving with 1fichier", skip_all)]
    async fn resolve(&self, link: &str, credential: &Credential, _episode: Option<&Episode>) -> ResolutionOutcome {
        if credential.is_empty() {
            error!("empty API key");
            return ResolutionOutcome::Fatal;
        }
        let key = credential.api_key.as_str();
        let url = format!("{}/download/get_token.cgi", self.settings.api_url.trim_end_matches('/'));
        let url = url.as_str();
        let body = TokenRequest { url: strip_affiliate(link), inline: 1 };
        let body = &body;
        let resolved = with_attempts(self.http.policy(), "1fichier token", |_| async move {
            let response = match self.http.send(|client| client.post(url).json(body).bearer_auth(key)).await {
                Ok(response) => response,
                Err(err) => return resolve_error(&err),
            };
            match response.status() {
                StatusCode::OK => {},
                status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    error!(%status, "1fichier refused the API key");
                    return Step::Stop(ResolutionOutcome::Fatal);
                },
                status @ (StatusCode::NOT_FOUND | StatusCode::GONE) => {
                    debug!(%status, "link is gone");
                    return Step::Stop(ResolutionOutcome::LinkDown);
                },
                status => {
                    error!(%status, "unexpected HTTP status");
                    return Step::Retry;
                },
            }
            let token: TokenResponse = match response.json().await {
                Ok(token) => token,
                Err(err) => {
                    debug!(%err, "unreadable response");
                    return Step::Retry;
                },
            };
            if token.status.as_deref() == Some("KO") {
                debug!(message = token.message.as_deref().unwrap_or_default(), "link is gone");
                return Step::Stop(ResolutionOutcome::LinkDown);
            }
            match token.url {
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
