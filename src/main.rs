//! # hass-mcp
//!
//! Tool server that exposes a Home Assistant instance to an AI agent host.
//! Speaks line-delimited JSON over stdio: one request per input line, one
//! response per output line, handled strictly in order.
//!
//! ## Architecture
//!
//! ```text
//! main.rs    - entry point, config loading, logging, shutdown signals
//! config.rs  - CLI / env-var / JSON file configuration
//! client.rs  - HTTP client for the Home Assistant REST API
//! mcp.rs     - request envelope parsing, dispatch, response writing
//! tools.rs   - tool definitions and handlers
//! ```
//!
//! ## Tools
//!
//! `get_state`, `toggle_entity`, `trigger_automation`, `list_entities`
//!
//! Logs go to stderr; stdout carries protocol lines only.

mod client;
mod config;
mod mcp;
mod tools;

#[cfg(test)]
mod test_support;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use client::HassClient;
use config::Cli;
use mcp::Server;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let resolved = match config::load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("hass-mcp: configuration error: {e}");
            std::process::exit(1);
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| resolved.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = match HassClient::new(&resolved.url, resolved.token, resolved.timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("hass-mcp: failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "hass-mcp v{} serving {} over stdio",
        env!("CARGO_PKG_VERSION"),
        client.base_url()
    );

    let server = Server::new(client);
    let reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        () = mcp::run(&server, reader, &mut stdout) => info!("stdin closed, exiting"),
        () = shutdown_signal() => {
            info!("shutting down");
            // A pending stdin read would otherwise block runtime shutdown.
            std::process::exit(0);
        }
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C only on non-unix).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
