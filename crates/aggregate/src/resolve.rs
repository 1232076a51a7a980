//! On-demand resolution of a deferred playback link.

use debrix_asyncutils::Deadline;
use debrix_config::UserConfig;
use debrix_debrid::{Credential, Episode, ProviderHandle, ProviderKind, Providers, ResolutionOutcome};
use debrix_store::DeadLinks;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(20);

/// Turns a hoster link into a direct URL with one of the user's providers,
/// remembering links the provider reports as gone.
#[derive(Clone)]
pub struct Resolver {
    providers: Providers,
    dead_links: DeadLinks,
    timeout: Duration,
}
impl Resolver {
    pub fn new(providers: Providers, dead_links: DeadLinks) -> Self {
        Self { providers, dead_links, timeout: DEFAULT_RESOLVE_TIMEOUT }
    }

    /// Upper bound on one provider resolution, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve `link` with `service`, or the user's first provider.
    ///
    /// A link already marked dead is answered without calling the provider.
    /// A provider answering [`ResolutionOutcome::LinkDown`] marks it dead.
    /// A provider still busy when the timeout passes counts as
    /// [`ResolutionOutcome::Fatal`].
    #[instrument("resolving link", skip_all, fields(service = tracing::field::Empty))]
    pub async fn resolve(
        &self,
        link: &str,
        config: &UserConfig,
        service: Option<&str>,
        episode: Option<&Episode>,
    ) -> ResolutionOutcome {
        let Some((provider, credential)) = self.pick(config, service) else {
            return ResolutionOutcome::Fatal;
        };
        tracing::Span::current().record("service", provider.kind().as_str());

        match self.dead_links.is_dead(link).await {
            Ok(true) => {
                debug!("link is marked dead");
                return ResolutionOutcome::LinkDown;
            },
            Ok(false) => {},
            Err(error) => warn!(%error, "dead link lookup failed"),
        }

        let deadline = Deadline::after(self.timeout);
        let Some(outcome) = deadline.within(provider.resolve(link, &credential, episode)).await else {
            error!(timeout_ms = self.timeout.as_millis() as u64, "provider did not answer in time");
            return ResolutionOutcome::Fatal;
        };
        if outcome == ResolutionOutcome::LinkDown
            && let Err(error) = self.dead_links.mark(link).await
        {
            warn!(%error, "could not mark link as dead");
        }
        info!(outcome = outcome.sentinel().unwrap_or("resolved"), "resolution done");
        outcome
    }

    fn pick(&self, config: &UserConfig, service: Option<&str>) -> Option<(ProviderHandle, Credential)> {
        let entry = match service.map(str::trim).filter(|s| !s.is_empty()) {
            Some(service) => {
                let kind: ProviderKind = match service.parse() {
                    Ok(kind) => kind,
                    Err(error) => {
                        error!(%error, "cannot resolve");
                        return None;
                    },
                };
                config.credential(kind.as_str())
            },
            None => config.providers.first(),
        };
        let Some(entry) = entry else {
            error!(service, "provider not enabled in user config");
            return None;
        };
        let handle = entry.service.parse::<ProviderKind>().ok().and_then(|kind| self.providers.get(kind));
        let Some(handle) = handle else {
            error!(service = %entry.service, "provider not available");
            return None;
        };
        Some((handle.clone(), Credential::new(entry.api_key.clone()).with_usenet(config.enable_usenet)))
    }
}
