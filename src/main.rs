//! Veilsocks - local SOCKS5 front-end over an obfuscated tunnel
//!
//! This is the main entry point for the Veilsocks application.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use veilsocks::client::run_client;
use veilsocks::config::{load_config, Config, TransportType};

/// Veilsocks - SOCKS5 proxy multiplexed over a single obfuscated tunnel
#[derive(Parser, Debug)]
#[command(name = "veilsocks")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local SOCKS5 listen address
    #[arg(short = 'l', long)]
    local: Option<String>,

    /// Remote server address
    #[arg(short, long)]
    server: Option<String>,

    /// Shared pre-key
    #[arg(short, long)]
    key: Option<String>,

    /// Transport protocol (tcp, ws, wss)
    #[arg(short, long)]
    protocol: Option<TransportType>,

    /// Connect directly to private and loopback destinations
    #[arg(long)]
    bypass: bool,

    /// Enable XOR obfuscation
    #[arg(long)]
    obfs: bool,

    /// Enable payload compression
    #[arg(long)]
    compress: bool,

    /// Enable length padding
    #[arg(long)]
    padding: bool,

    /// Skip certificate verification for wss
    #[arg(long)]
    insecure: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn apply(&self, config: &mut Config) {
        if let Some(local) = &self.local {
            config.local_addr = local.clone();
        }
        if let Some(server) = &self.server {
            config.server_addr = server.clone();
        }
        if let Some(key) = &self.key {
            config.key = key.clone();
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        config.bypass |= self.bypass;
        config.obfs |= self.obfs;
        config.compress |= self.compress;
        config.padding |= self.padding;
        config.insecure |= self.insecure;
        config.verbose |= self.verbose;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    let level = if config.verbose { "debug" } else { args.log_level.as_str() };
    setup_logging(level, args.json_log)?;

    info!("Veilsocks v{}", veilsocks::VERSION);
    if let Some(path) = &args.config {
        info!("Configuration loaded from: {:?}", path);
    }
    info!(
        "obfs={} compress={} padding={} bypass={}",
        config.obfs, config.compress, config.padding, config.bypass
    );

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    run_client(config, shutdown_rx).await
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
