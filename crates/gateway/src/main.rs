//! # Scanproof Gateway
//!
//! Turns scanned tokens into verification verdicts, proxies browser calls to
//! allow-listed backend hosts, and runs voucher redemption actions.
//!
//! ## Architecture
//! ```text
//! Browser → Gateway ──┬─→ Backend API (allow-listed hosts)
//!                     ↓
//!                  Redis (per-org encryption config, optional)
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cache;
mod codec;
mod config;
mod keys;
mod proxy;
mod routes;
mod state;
#[cfg(test)]
mod testing;
mod verify;
mod voucher;

use config::AppConfig;
use state::AppState;
use voucher::{HttpVoucherApi, RedemptionDriver, VoucherSession};

/// Scanproof Gateway - verification and proxy service
#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gateway.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Backend API base URL (overrides config)
    #[arg(long, env = "API_BASE_URL")]
    api_base_url: Option<String>,

    /// Static fallback encryption key
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Static fallback encryption IV
    #[arg(long, env = "ENCRYPTION_IV", hide_env_values = true)]
    encryption_iv: Option<String>,

    /// Runtime environment (production, test, development)
    #[arg(long, env = "RUNTIME_ENV")]
    runtime_env: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify (and optionally approve) a voucher against a running gateway
    Redeem {
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        gateway_url: String,

        /// Organisation code
        #[arg(long)]
        org: String,

        /// Voucher number (PIN mode)
        #[arg(long)]
        voucher_no: Option<String>,

        /// Voucher PIN
        #[arg(long)]
        pin: Option<String>,

        /// Barcode (barcode mode)
        #[arg(long)]
        barcode: Option<String>,

        /// Base64 JSON hint from a voucher link
        #[arg(long)]
        hint: Option<String>,

        /// Approve after a successful verify
        #[arg(long, default_value = "false")]
        approve: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads the environment
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    match args.command {
        Some(Command::Redeem {
            ref gateway_url,
            ref org,
            ref voucher_no,
            ref pin,
            ref barcode,
            ref hint,
            approve,
        }) => {
            let request = RedeemRequest {
                gateway_url,
                org,
                voucher_no: voucher_no.as_deref(),
                pin: pin.as_deref(),
                barcode: barcode.as_deref(),
                hint: hint.as_deref(),
                approve,
            };
            redeem(request).await
        }
        None => serve(&args).await,
    }
}

async fn serve(args: &Args) -> Result<()> {
    info!(
        "🔥 Starting Scanproof Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = AppConfig::load(&args.config, args)?;
    info!("📋 Configuration loaded from {}", args.config);
    info!(
        env = config.runtime_env.cache_segment(),
        api_base_url = %config.api_base_url,
        allowed_hosts = ?config.allowed_hosts,
        static_keys = config.encryption.keys().is_some(),
        "Gateway settings"
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Gateway listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Gateway shutdown complete");
    Ok(())
}

struct RedeemRequest<'a> {
    gateway_url: &'a str,
    org: &'a str,
    voucher_no: Option<&'a str>,
    pin: Option<&'a str>,
    barcode: Option<&'a str>,
    hint: Option<&'a str>,
    approve: bool,
}

/// Headless redemption; prints the final session as JSON
async fn redeem(request: RedeemRequest<'_>) -> Result<()> {
    let mut session = match request.hint {
        Some(hint) => VoucherSession::with_hint(request.org, hint).context("Invalid voucher hint")?,
        None => VoucherSession::new(request.org),
    };

    if let Some(barcode) = request.barcode {
        session.set_barcode(barcode)?;
        if request.voucher_no.is_none() {
            session.set_mode(voucher::VoucherMode::Barcode)?;
        }
    }
    if let Some(voucher_no) = request.voucher_no {
        session.set_voucher_no(voucher_no)?;
        session.set_mode(voucher::VoucherMode::Pin)?;
    }
    if let Some(pin) = request.pin {
        session.set_pin(pin)?;
    }

    let api = HttpVoucherApi::new(request.gateway_url, Duration::from_secs(30))?;
    let driver = RedemptionDriver::new(api);

    driver.verify(&mut session).await?;
    if request.approve && matches!(session.step(), voucher::Step::Verified { .. }) {
        driver.approve(&mut session).await?;
    }

    let snapshot = serde_json::to_string_pretty(&session)?;
    println!("{snapshot}");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
