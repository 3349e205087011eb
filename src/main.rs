#![forbid(unsafe_code)]

//! `mcp-clock` — minimal MCP demo server binary.
//!
//! Bootstraps configuration and serves a single `get_current_time` tool
//! over the streamable HTTP transport (or stdio with `--stdio`).

use std::net::IpAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_clock::config::{ServerConfig, DEFAULT_PORT};
use mcp_clock::mcp::handler::AppState;
use mcp_clock::mcp::{http, transport};
use mcp_clock::session::SessionRegistry;
use mcp_clock::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-clock", about = "Minimal MCP current-time demo server", version, long_about = None)]
struct Cli {
    /// Port for the streamable HTTP transport.
    #[arg(long, env = "MCP_CLOCK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address the HTTP listener binds to.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve over stdio instead of HTTP.
    #[arg(long)]
    stdio: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mcp-clock server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(ServerConfig {
        bind_addr: args.bind,
        http_port: args.port,
    });
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
    });
    info!(port = config.http_port, "configuration loaded");

    let ct = CancellationToken::new();

    if args.stdio {
        // The process lifetime is the session; no registry is involved.
        let signal_ct = ct.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_ct.cancel();
        });
        return transport::serve_stdio(state, ct).await;
    }

    // The registry is owned here and passed in, so several independent
    // server instances can coexist in one process.
    let registry = Arc::new(SessionRegistry::new());

    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_registry = Arc::clone(&registry);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_http(http_state, http_registry, http_ct).await {
            error!(%err, "http transport failed");
        }
    });

    info!("MCP server ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle);
    info!("mcp-clock shut down");

    Ok(())
}

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
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
