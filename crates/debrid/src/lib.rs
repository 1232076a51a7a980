//! Debrid providers and the engine that asks them what's cached.
//!
//! A [`Provider`] answers two questions about a hoster link: is it
//! instantly playable ([`Provider::probe`]), and what is its direct URL
//! ([`Provider::resolve`]). Provider failures never surface as errors;
//! they're folded into [`ProbeResult`] and [`ResolutionOutcome`].
//!
//! [`enrich`] runs a provider over a whole result list within a time
//! budget, probing as few links as it can.

mod enrich;
pub mod error;
mod http;
mod outcome;
mod provider;
mod registry;

pub use crate::enrich::{EnrichOptions, Enriched, enrich};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::http::{HttpClient, RETRYABLE_STATUSES, RetryPolicy};
pub use crate::outcome::{ErrorClass, ProbeResult, ProbeStatus, ResolutionOutcome};
#[cfg(any(test, feature = "mock"))]
pub use crate::provider::mock;
pub use crate::provider::{
    AllDebrid, Credential, Episode, OneFichier, Premiumize, Provider, ProviderHandle, TorBox,
};
pub use crate::registry::{ProviderKind, Providers};
