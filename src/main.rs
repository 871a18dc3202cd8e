use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use connectord::bootstrap::Server;
use connectord::config::Config;
use connectord::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "connectord")]
#[command(author, version, about = "SMS gateway connector control plane")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting connectord"
    );

    info!(
        gateway = %config.gateway.host,
        telnet_port = config.gateway.telnet_port,
        http_port = config.gateway.http_port,
        admin_address = %config.admin.address,
        reconcile_interval = ?config.reconciler.interval,
        "configuration loaded"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    Server::new(config).run().await
}
