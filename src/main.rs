//! YouTube Music companion control
//!
//! Connects to the companion socket and reads queries from stdin. Each line
//! prints the matching results; prefix a line with `!` to run the top
//! result's action.

use ytm_control::artwork::ArtworkCache;
use ytm_control::bus::{self, BusEvent};
use ytm_control::client::PlaybackClient;
use ytm_control::config;
use ytm_control::query::{QueryEngine, QueryResult};
use ytm_control::session::ConnectionSession;
use ytm_control::supervisor;

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytm_control=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "Starting ytm-control v{} ({})",
        env!("YTMC_VERSION"),
        env!("YTMC_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    tracing::info!("Configuration loaded, endpoint: {}:{}", config.host, config.port);

    let bus = bus::create_bus();
    let session = Arc::new(ConnectionSession::new(config.session(), bus.clone()));
    let artwork = Arc::new(ArtworkCache::new(config.cache_dir())?);
    tracing::info!("Artwork cache at {}", artwork.dir().display());
    let client = Arc::new(PlaybackClient::new(session, artwork));

    let shutdown = CancellationToken::new();

    // Log bus traffic
    let logger = {
        let mut events = bus.subscribe();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(BusEvent::SongChanged { track }) => {
                            tracing::info!("Now playing: {} by {}", track.title, track.artist);
                        }
                        Ok(event) => tracing::debug!("Bus event: {:?}", event),
                        Err(RecvError::Lagged(n)) => tracing::debug!("Bus logger lagged by {}", n),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    };

    let supervisor = if config.auto_reconnect {
        tracing::info!("Auto-reconnect enabled");
        Some(tokio::spawn(supervisor::supervise(
            client.clone(),
            config.retry(),
            shutdown.clone(),
        )))
    } else {
        if let Err(e) = client.connect().await {
            tracing::warn!("Initial connection failed: {}", e);
        }
        None
    };

    tokio::select! {
        result = run_queries(&client) => {
            if let Err(e) = result {
                tracing::warn!("Query input failed: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    // Cleanup
    tracing::info!("Shutting down...");
    bus.publish(BusEvent::ShuttingDown);
    shutdown.cancel();
    client.close().await;
    if let Some(supervisor) = supervisor {
        let _ = supervisor.await;
    }
    let _ = logger.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Read queries from stdin until EOF
async fn run_queries(client: &PlaybackClient) -> Result<()> {
    let engine = QueryEngine::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let (execute, text) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line.as_str()),
        };

        let results = engine.query(client, text).await;
        if !execute {
            print_results(&results);
            continue;
        }

        let mut ranked: Vec<&QueryResult> = results.iter().filter(|r| r.action.is_some()).collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        let Some((result, action)) = ranked
            .first()
            .and_then(|r| r.action.map(|action| (*r, action)))
        else {
            println!("Nothing to run for {:?}", text);
            continue;
        };

        match action.execute(client).await {
            Ok(dispatch) => println!("{}: {:?}", result.title, dispatch),
            Err(e) => println!("{}: {}", result.title, e),
        }
    }

    Ok(())
}

fn print_results(results: &[QueryResult]) {
    for result in results {
        let marker = if result.action.is_some() { "*" } else { " " };
        println!("{} {:<28} {}", marker, result.title, result.subtitle);
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
