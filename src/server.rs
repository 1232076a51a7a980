//! HTTP front end.

use crate::error::{ErrorKind, Result};
use crate::remote::{RemoteMetadata, RemoteSource};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, HOST, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use debrix_aggregate::{Aggregator, CachedSource, Resolver, Stream};
use debrix_config::{SERVICES, Settings, UserConfig};
use debrix_debrid::{EnrichOptions, Episode, ProviderKind, Providers, ResolutionOutcome};
use debrix_model::Resolution;
use debrix_store::{ContentCache, Database, DeadLinks, SearchLock};
use exn::ResultExt;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(RustEmbed)]
#[folder = "assets/sentinel/"]
struct Sentinels;

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub resolver: Resolver,
    /// Externally visible base URL. Derived from the request when unset.
    pub public_url: Option<String>,
}
impl AppState {
    /// Wire the aggregator and resolver to the store and the remote services.
    pub fn from_settings(settings: &Settings, db: &Database) -> Result<Self> {
        let mut client = reqwest::Client::builder()
            .timeout(settings.http.timeout())
            .user_agent(settings.http.user_agent.clone().unwrap_or_else(|| settings.addon_name.clone()));
        if let Some(proxy) = &settings.http.proxy {
            client = client.proxy(reqwest::Proxy::all(proxy).or_raise(|| ErrorKind::Client)?);
        }
        let client = client.build().or_raise(|| ErrorKind::Client)?;

        let Some(metadata_url) = &settings.metadata.url else {
            exn::bail!(ErrorKind::Unconfigured("metadata.url"));
        };
        let metadata = Arc::new(RemoteMetadata::new(client.clone(), metadata_url));
        let providers = Providers::from_settings(settings).or_raise(|| ErrorKind::Providers)?;
        let dead_links = DeadLinks::from(db).with_ttl(settings.cache.dead_link_ttl());
        let cache = ContentCache::from(db).with_ttl(settings.cache.content_ttl());
        let lock = SearchLock::from(db)
            .with_ttl(settings.lock.ttl())
            .with_wait_timeout(settings.lock.wait_timeout())
            .with_poll_interval(settings.lock.poll_interval());

        let mut aggregator = Aggregator::new(metadata, providers.clone(), dead_links.clone())
            .with_options(EnrichOptions::from(&settings.debrid))
            .with_addon_name(&settings.addon_name);
        for source in settings.sources.iter().filter(|s| s.enabled) {
            let remote = Arc::new(RemoteSource::new(client.clone(), &source.name, &source.url));
            aggregator = aggregator.with_source(CachedSource::new(remote, cache.clone(), lock.clone()));
        }
        Ok(Self {
            aggregator,
            resolver: Resolver::new(providers, dead_links).with_timeout(settings.debrid.request_timeout()),
            public_url: settings.server.public_url.clone(),
        })
    }
}

/// Base URL for links pointing back at this service.
fn base_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url {
        return url.trim_end_matches('/').to_string();
    }
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header(HOST.as_str()).unwrap_or("localhost");
    format!("{scheme}://{host}")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/available/resolutions", get(resolutions))
        .route("/available/services", get(services))
        .route("/resolve", get(resolve))
        .route("/{config}/stream/{kind}/{id}", get(streams))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

async fn resolutions() -> Json<Vec<&'static str>> {
    Json(Resolution::ALL.iter().map(Resolution::as_str).collect())
}

#[derive(Serialize)]
struct Service {
    id: &'static str,
    name: &'static str,
    tag: &'static str,
}

async fn services() -> Json<Vec<Service>> {
    Json(
        SERVICES
            .iter()
            .filter_map(|id| id.parse::<ProviderKind>().ok())
            .map(|kind| Service { id: kind.as_str(), name: kind.display_name(), tag: kind.tag() })
            .collect(),
    )
}

#[derive(Serialize)]
struct Streams {
    streams: Vec<Stream>,
}

/// Stream list for one title. Anything going wrong yields an empty list,
/// which media clients handle gracefully.
async fn streams(
    State(state): State<Arc<AppState>>,
    Path((config, kind, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Json<Streams> {
    let id = id.strip_suffix(".json").unwrap_or(&id);
    let config = match UserConfig::decode(&config) {
        Ok(config) => config,
        Err(error) => {
            warn!(%error, "rejecting user config");
            return Json(Streams { streams: Vec::new() });
        },
    };
    let base_url = base_url(state.public_url.as_deref(), &headers);
    let streams = match state.aggregator.streams(id, &config, &base_url).await {
        Ok(streams) => streams,
        Err(error) => {
            warn!(%error, %kind, id, "stream request failed");
            Vec::new()
        },
    };
    Json(Streams { streams })
}

#[derive(Debug, Deserialize)]
struct ResolveParams {
    link: Option<String>,
    config: Option<String>,
    service: Option<String>,
    season: Option<String>,
    episode: Option<String>,
}

/// Redirect to the direct link, or show a page explaining why there isn't
/// one.
async fn resolve(State(state): State<Arc<AppState>>, Query(params): Query<ResolveParams>) -> Response {
    let (Some(link), Some(config)) = (params.link, params.config) else {
        warn!("resolve request without a link or user config");
        return outcome_response(ResolutionOutcome::Fatal);
    };
    let config = match UserConfig::decode(&config) {
        Ok(config) => config,
        Err(error) => {
            warn!(%error, "rejecting user config");
            return outcome_response(ResolutionOutcome::Fatal);
        },
    };
    let episode = match (params.season, params.episode) {
        (Some(season), Some(episode)) => Some(Episode::new(season, episode)),
        _ => None,
    };
    let outcome = state.resolver.resolve(&link, &config, params.service.as_deref(), episode.as_ref()).await;
    match &outcome {
        ResolutionOutcome::Resolved(url) => {
            info!(outcome = "resolved", "resolve request done");
            debug!(%url, "redirecting");
        },
        failed => info!(outcome = failed.sentinel().unwrap_or("fatal_error"), "resolve request done"),
    }
    outcome_response(outcome)
}

fn outcome_response(outcome: ResolutionOutcome) -> Response {
    let page = match outcome {
        ResolutionOutcome::Resolved(url) => return (StatusCode::FOUND, [(LOCATION, url)]).into_response(),
        failed => failed.sentinel().unwrap_or("fatal_error"),
    };
    match Sentinels::get(&format!("{page}.html")) {
        Some(file) => ([(CONTENT_TYPE, "text/html; charset=utf-8")], file.data.into_owned()).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, page).into_response(),
    }
}
