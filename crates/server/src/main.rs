use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use hookline_gateway::RetryScheduler;
use hookline_server::config::HooklineConfig;
use hookline_state_memory::MemoryRepository;
use hookline_webhook::HttpTransport;

/// Hookline webhook server.
#[derive(Parser, Debug)]
#[command(name = "hookline-server", about = "Standalone HTTP server for Hookline")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "hookline.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from TOML file, or use defaults if the file does not exist.
    let config_found = Path::new(&cli.config).exists();
    let mut config = if config_found {
        HooklineConfig::from_toml(&std::fs::read_to_string(&cli.config)?)?
    } else {
        HooklineConfig::default()
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    hookline_server::telemetry::init(&config.logging);
    if !config_found {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let repository = Arc::new(MemoryRepository::new());
    let transport = Arc::new(HttpTransport::new(config.dispatcher.http.clone())?);
    let state = hookline_server::app::build_state(&config, repository, transport).await?;
    let dispatcher = state.dispatcher.clone();

    let recovered = dispatcher.recover().await?;
    if recovered > 0 {
        info!(recovered, "re-queued persisted retries");
    }
    let (mut scheduler, scheduler_shutdown) = RetryScheduler::new(dispatcher.clone());
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let app = hookline_server::api::router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%addr, "starting hookline server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("listener stopped, draining deliveries");
    if scheduler_shutdown.send(()).await.is_err() {
        warn!("retry scheduler already stopped");
    }
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "retry scheduler task failed");
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if tokio::time::timeout(shutdown_timeout, dispatcher.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, in-flight attempts abandoned"
        );
    }

    info!("hookline server stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
