//! Flick API server.
//!
//! ```text
//!     Client ──▶ listener ──▶ request id ─▶ trace ─▶ metrics ─▶ catch panic
//!                                  ─▶ cors ─▶ rate limit ─▶ timeout ─▶ body limit ─▶ handler
//!
//!     SIGINT/SIGTERM ──▶ shutdown coordinator ──▶ stop accepting
//!                          ──▶ drain connections ──▶ wait background tasks
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use flick_api::config::{self, AppConfig, Environment};
use flick_api::lifecycle::{startup, SignalListener};
use flick_api::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "flick-api")]
#[command(about = "JSON API server with per-client rate limiting and graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    env: Option<Environment>,

    /// Rate limiter maximum requests per second
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Graceful shutdown deadline in seconds
    #[arg(long)]
    shutdown_timeout_secs: Option<u64>,

    /// Trusted CORS origins (space separated)
    #[arg(long)]
    cors_trusted_origins: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{port}"),
            };
        }
        if let Some(env) = self.env {
            config.environment = env;
        }
        if let Some(rps) = self.limiter_rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.rate_limit.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.rate_limit.enabled = enabled;
        }
        if let Some(secs) = self.shutdown_timeout_secs {
            config.shutdown.timeout_secs = secs;
        }
        if let Some(origins) = self.cors_trusted_origins {
            config.cors.trusted_origins = origins.split_whitespace().map(str::to_owned).collect();
        }
    }
}

fn load(cli: Cli) -> Result<AppConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("flick-api: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);

    match serve(config).await {
        Ok(()) => {
            tracing::info!("stopped server");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: AppConfig) -> flick_api::Result<()> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        env = %config.environment,
        limiter_enabled = config.rate_limit.enabled,
        limiter_rps = config.rate_limit.requests_per_second,
        limiter_burst = config.rate_limit.burst,
        cors_trusted_origins = ?config.cors.trusted_origins,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let signals = SignalListener::install()?;
    startup::run(config, signals).await
}
