//! Impairment service daemon
//!
//! Opens one netlink session for the namespace it runs in, serves
//! `SetInterface` calls on the configured port and closes the session on
//! SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use netns_impair::config::Cli;
use netns_impair::service::{self, ImpairService};
use netns_impair::{ImpairmentEngine, PschedClock, RtnetlinkSession};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.server_config();

    let ticks = PschedClock::from_proc().context("cannot read packet scheduler clock")?;
    let session = Arc::new(
        RtnetlinkSession::open()
            .await
            .context("cannot open netlink session")?,
    );
    let engine = ImpairmentEngine::new(session.clone(), Arc::new(ticks));
    let service = Arc::new(ImpairService::new(engine, session));

    let listener = match TcpListener::bind(config.socket_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            stop(&service).await;
            return Err(e).with_context(|| format!("cannot listen on {}", config.socket_addr()));
        }
    };
    info!("impairment server listening on {}", listener.local_addr()?);

    let served = service::serve(listener, service.clone(), shutdown_signal()).await;
    stop(&service).await;

    served.context("server terminated")?;
    info!("impairment server stopped");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// Nobody waits on shutdown, so a failed close is only logged.
async fn stop(service: &ImpairService) {
    if let Err(e) = service.stop().await {
        error!("error stopping impairment service: {}", e);
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
