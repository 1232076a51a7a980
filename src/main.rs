mod error;
mod logging;
mod remote;
mod server;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use debrix_aggregate::Resolver;
use debrix_config::{ProviderCredential, Settings, UserConfig};
use debrix_debrid::{Episode, Providers, ResolutionOutcome};
use debrix_store::{Database, DeadLinks, Sweeper};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file, merged over the default location.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Delete expired cache entries, locks and dead links once.
    Sweep,
    /// Resolve one link to a direct URL.
    Resolve {
        link: String,
        #[arg(long, short)]
        service: String,
        #[arg(long)]
        api_key: String,
        #[arg(long, requires = "episode")]
        season: Option<String>,
        #[arg(long, requires = "season")]
        episode: Option<String>,
        #[arg(long)]
        usenet: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Settings) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("{error:?}");
            return ExitCode::FAILURE;
        },
    };
    logging::init(&settings.log_level);

    let result = match cli.command {
        Command::Serve => serve(settings).await,
        Command::Sweep => sweep(&settings).await,
        Command::Resolve { link, service, api_key, season, episode, usenet } => {
            let config = UserConfig {
                providers: vec![ProviderCredential { service: service.clone(), api_key }],
                enable_usenet: usenet,
                ..UserConfig::default()
            };
            let episode = season.zip(episode).map(|(season, episode)| Episode::new(season, episode));
            resolve(&settings, &link, &config, &service, episode.as_ref()).await
        },
    };
    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error:?}");
            ExitCode::FAILURE
        },
    }
}

async fn serve(settings: Settings) -> Result<ExitCode> {
    let db = Database::connect(&settings.database.path).await.or_raise(|| ErrorKind::Store)?;
    let state = server::AppState::from_settings(&settings, &db)?;
    let sweeper = Sweeper::new(db.clone(), settings.cache.sweep_interval()).spawn();

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await.or_raise(|| ErrorKind::Bind(address.clone()))?;
    info!(%address, "listening");
    let served = axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Serve);

    sweeper.abort();
    db.close().await;
    info!("shut down");
    served.map(|()| ExitCode::SUCCESS)
}

async fn sweep(settings: &Settings) -> Result<ExitCode> {
    let db = Database::connect(&settings.database.path).await.or_raise(|| ErrorKind::Store)?;
    let report = db.sweep().await.or_raise(|| ErrorKind::Store);
    db.close().await;
    let report = report?;
    println!("removed {} expired rows", report.total());
    Ok(ExitCode::SUCCESS)
}

async fn resolve(
    settings: &Settings,
    link: &str,
    config: &UserConfig,
    service: &str,
    episode: Option<&Episode>,
) -> Result<ExitCode> {
    let db = Database::connect(&settings.database.path).await.or_raise(|| ErrorKind::Store)?;
    let providers = Providers::from_settings(settings).or_raise(|| ErrorKind::Providers)?;
    let resolver = Resolver::new(providers, DeadLinks::from(&db).with_ttl(settings.cache.dead_link_ttl()))
        .with_timeout(settings.debrid.request_timeout());
    let outcome = resolver.resolve(link, config, Some(service), episode).await;
    db.close().await;
    Ok(match outcome {
        ResolutionOutcome::Resolved(url) => {
            println!("{url}");
            ExitCode::SUCCESS
        },
        failed => {
            eprintln!("{failed}");
            ExitCode::FAILURE
        },
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(error) => {
                warn!(%error, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_episode_needs_both_parts() {
        let parsed = Cli::try_parse_from(["debrix", "resolve", "https://x", "-s", "alldebrid", "--api-key", "k", "--season", "1"]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from([
            "debrix", "--config", "debrix.toml", "resolve", "https://x", "-s", "alldebrid", "--api-key", "k", "--season",
            "1", "--episode", "2",
        ])
        .unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("debrix.toml")));
        assert!(matches!(parsed.command, Command::Resolve { episode: Some(ref e), .. } if e == "2"));
    }
}
