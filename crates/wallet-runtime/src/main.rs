//! `cmm-wallet`: runs the wallet core until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use wallet_runtime::{init_logging, AppContext, Args, WalletConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = WalletConfig::load(&args).context("failed to load configuration")?;
    init_logging(&config.logging)?;

    let mut context = AppContext::new(config)?;
    if let Err(e) = context.start().await {
        error!(error = %format!("{e:#}"), "Start-up failed");
        context.shutdown().await;
        return Err(e);
    }

    info!("Wallet is running. Press Ctrl+C to stop.");
    let signal = tokio::signal::ctrl_c().await;

    context.shutdown().await;
    signal.context("failed to listen for Ctrl+C")?;
    Ok(())
}
