//! Command-line flags. Every flag is optional and overrides the file and
//! environment layers.

use clap::Parser;
use std::path::PathBuf;

/// Headless Commercium wallet core
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(name = "cmm-wallet")]
#[command(about = "Connects to (or launches) commerciumd and runs the Sprout to Sapling migration")]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Never launch a daemon; only attach to one that is already running
    #[arg(long)]
    pub no_embedded: bool,

    /// Use the test network
    #[arg(long)]
    pub testnet: bool,

    /// Route RPC and downloads through the local Tor proxy (127.0.0.1:9050)
    #[arg(long)]
    pub tor: bool,

    /// Daemon data directory
    #[arg(long, value_name = "DIR")]
    pub datadir: Option<PathBuf>,

    /// RPC host; selects manual connection mode
    #[arg(long)]
    pub host: Option<String>,

    /// RPC port
    #[arg(long)]
    pub port: Option<u16>,

    /// RPC username
    #[arg(long)]
    pub rpc_user: Option<String>,

    /// RPC password
    #[arg(long)]
    pub rpc_password: Option<String>,

    /// Start migrating Sprout funds to this Sapling address once connected
    #[arg(long, value_name = "ZADDR")]
    pub migrate_to: Option<String>,

    /// Sprout address to drain (repeatable); defaults to every Sprout address
    #[arg(long, value_name = "ZADDR", requires = "migrate_to")]
    pub migrate_from: Vec<String>,

    /// Log filter, e.g. `info` or `wc_04_turnstile=debug`
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,
}
