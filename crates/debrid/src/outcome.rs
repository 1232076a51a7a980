//! What providers report back, and how their error codes are folded into it.

use crate::error::ErrorKind;
use crate::http::RetryPolicy;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;
use tracing::debug;

/// Whether a link plays instantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    Cached,
    Uncached,
    /// The provider refused outright (bad key, unsupported host, dead link).
    /// Never retried and never shown.
    Hidden,
}

/// Answer to "is this link cached?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    /// Ready-to-play URL, for providers that hand one out while probing.
    pub direct_link: Option<String>,
    /// Provider's idea of the file name, usually better than the scraper's.
    pub filename: Option<String>,
    /// The probe failed at the HTTP level (transport error or 429/5xx
    /// retries exhausted). Feeds provider outage detection.
    pub http_error: bool,
}
impl ProbeResult {
    pub fn cached(direct_link: Option<String>, filename: Option<String>) -> Self {
        Self { status: ProbeStatus::Cached, direct_link, filename, http_error: false }
    }

    pub fn uncached() -> Self {
        Self { status: ProbeStatus::Uncached, direct_link: None, filename: None, http_error: false }
    }

    pub fn hidden() -> Self {
        Self { status: ProbeStatus::Hidden, direct_link: None, filename: None, http_error: false }
    }

    /// Uncached because the provider couldn't be reached properly.
    pub fn http_failure() -> Self {
        Self { http_error: true, ..Self::uncached() }
    }

    pub fn is_cached(&self) -> bool {
        self.status == ProbeStatus::Cached
    }
}

/// Final answer of turning a link into something playable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionOutcome {
    /// Direct, playable URL.
    Resolved(String),
    /// Permanently gone. Worth remembering so nobody asks again.
    LinkDown,
    /// Not instantly available; the provider may be fetching it now.
    LinkUncached,
    /// Provider kept failing transiently. Trying again later may work.
    RetryExhausted,
    /// Configuration or authentication problem. Retrying won't help.
    Fatal,
}
impl ResolutionOutcome {
    /// Name of the fallback page shown for a failed resolution.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            Self::Resolved(_) => None,
            Self::LinkDown => Some("link_down"),
            Self::LinkUncached => Some("uncached"),
            Self::RetryExhausted => Some("retry_error"),
            Self::Fatal => Some("fatal_error"),
        }
    }
}
impl Display for ResolutionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Resolved(url) => write!(f, "resolved: {url}"),
            Self::LinkDown => f.write_str("link down"),
            Self::LinkUncached => f.write_str("link uncached"),
            Self::RetryExhausted => f.write_str("retries exhausted"),
            Self::Fatal => f.write_str("fatal error"),
        }
    }
}

/// What a provider-specific error code means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    LinkDown,
    /// Provider-side hiccup ("host busy", "cooldown"), worth another try.
    Transient,
    Fatal,
}

/// Control flow after one attempt of a multi-attempt provider call.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Continue(T),
    Retry,
    Stop(ResolutionOutcome),
}

/// Turn an error class into the next step of attempt `attempt` (0-based).
///
/// A transient error on the last attempt becomes
/// [`ResolutionOutcome::RetryExhausted`].
pub(crate) fn normalize<T>(class: ErrorClass, attempt: u32, policy: &RetryPolicy) -> Step<T> {
    match class {
        ErrorClass::LinkDown => Step::Stop(ResolutionOutcome::LinkDown),
        ErrorClass::Fatal => Step::Stop(ResolutionOutcome::Fatal),
        ErrorClass::Transient if attempt + 1 >= policy.max_attempts => Step::Stop(ResolutionOutcome::RetryExhausted),
        ErrorClass::Transient => Step::Retry,
    }
}

/// Next step after an HTTP-level failure: retry exhaustion is final,
/// anything else (transport, unreadable body) is worth another attempt.
pub(crate) fn resolve_error<T>(err: &crate::Error) -> Step<T> {
    match &**err {
        ErrorKind::RetryExhausted(_) => Step::Stop(ResolutionOutcome::RetryExhausted),
        _ => {
            debug!(%err, "attempt failed");
            Step::Retry
        },
    }
}

/// Run `attempt` up to `policy.max_attempts` times, sleeping between
/// retries. Running out of attempts without a verdict is fatal.
pub(crate) async fn with_attempts<T, F, Fut>(policy: &RetryPolicy, what: &str, mut attempt: F) -> Result<T, ResolutionOutcome>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Step<T>>,
{
    for n in 0..policy.max_attempts {
        match attempt(n).await {
            Step::Continue(value) => return Ok(value),
            Step::Stop(outcome) => return Err(outcome),
            Step::Retry if n + 1 < policy.max_attempts => {
                debug!(what, attempt = n + 1, "retrying");
                tokio::time::sleep(policy.attempt_delay).await;
            },
            Step::Retry => {},
        }
    }
    debug!(what, attempts = policy.max_attempts, "no attempt succeeded");
    Err(ResolutionOutcome::Fatal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[rstest]
    #[case(ErrorClass::LinkDown, 0, Some(ResolutionOutcome::LinkDown))]
    #[case(ErrorClass::Fatal, 0, Some(ResolutionOutcome::Fatal))]
    #[case(ErrorClass::Transient, 0, None)]
    #[case(ErrorClass::Transient, 2, Some(ResolutionOutcome::RetryExhausted))]
    fn test_normalize(#[case] class: ErrorClass, #[case] attempt: u32, #[case] expected: Option<ResolutionOutcome>) {
        let policy = RetryPolicy::immediate(3);
        match (normalize::<()>(class, attempt, &policy), expected) {
            (Step::Stop(got), Some(want)) => assert_eq!(got, want),
            (Step::Retry, None) => {},
            (step, want) => panic!("unexpected {step:?} for {want:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_attempts_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);
        let result = with_attempts(&policy, "test", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Step::Retry } else { Step::Continue(n) } }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_attempts_gives_up_fatal() {
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> = with_attempts(&policy, "test", |_| async { Step::Retry }).await;
        assert_eq!(result, Err(ResolutionOutcome::Fatal));
    }

    #[tokio::test]
    async fn test_with_attempts_transient_exhausts() {
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> =
            with_attempts(&policy, "test", |n| async move { normalize(ErrorClass::Transient, n, &RetryPolicy::immediate(3)) })
                .await;
        assert_eq!(result, Err(ResolutionOutcome::RetryExhausted));
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(ResolutionOutcome::Resolved("https://x".into()).sentinel(), None);
        assert_eq!(ResolutionOutcome::LinkDown.sentinel(), Some("link_down"));
        assert_eq!(ResolutionOutcome::RetryExhausted.sentinel(), Some("retry_error"));
    }
}
