//! runcode daemon
//!
//! HTTP server that compiles and runs short programs on the host toolchains,
//! one throwaway session per request.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use runcode_daemon::{backend::HostBackend, config::Config, http, runner::CodeRunner};

#[derive(Parser, Debug)]
#[command(name = "runcode-daemon")]
#[command(about = "HTTP daemon for ephemeral multi-language code execution")]
struct Args {
    /// JSON configuration file (otherwise `RUN_CODE_CONFIG` or defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Root directory for session scratch space, overriding the configuration
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.temp_dir {
        config.temp_dir = dir;
    }

    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("Failed to create temp dir {}", config.temp_dir.display()))?;

    info!(
        bind = %config.bind_addr,
        temp_dir = %config.temp_dir.display(),
        timeout_seconds = config.timeout_seconds,
        max_output_bytes = config.max_output_bytes,
        max_concurrent = ?config.max_concurrent,
        "Loaded configuration"
    );

    for (language, program) in config.missing_toolchains() {
        warn!(%language, %program, "Toolchain not found on PATH; requests for this language will fail");
    }

    let runner = Arc::new(CodeRunner::new(&config, HostBackend::new()));
    http::serve(config.bind_addr, runner).await
}
