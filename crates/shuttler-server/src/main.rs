//! shuttler-server binary: CLI parsing, logging setup and signal handling.

use clap::Parser;
use shuttler_server::config::{CliOverrides, ServerConfig};
use shuttler_server::identity::HttpIdentityVerifier;
use shuttler_server::RelayServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// shuttler-server — WebSocket relay for authenticated clients
#[derive(Parser, Debug)]
#[command(name = "shuttler-server", version, about = "WebSocket relay for authenticated clients")]
struct Cli {
    /// Listen address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// HTTP path upgraded to WebSocket
    #[arg(long)]
    path: Option<String>,

    /// Base URL of the identity service
    #[arg(long)]
    identity_url: Option<String>,

    /// Identity service request timeout in seconds
    #[arg(long)]
    identity_timeout: Option<u64>,

    /// Accept upgrades whose Origin differs from Host
    #[arg(long)]
    allow_cross_origin: bool,

    /// Config file path
    #[arg(long, default_value = "~/.shuttler/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting shuttler-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = CliOverrides {
        listen: cli.listen,
        path: cli.path,
        identity_url: cli.identity_url,
        identity_timeout: cli.identity_timeout,
        allow_cross_origin: cli.allow_cross_origin,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let verifier =
        match HttpIdentityVerifier::new(&server_config.identity_url, server_config.identity_timeout)
        {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to create identity client");
                std::process::exit(1);
            }
        };

    let relay = RelayServer::new(server_config, Arc::new(verifier));

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("shuttler-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
