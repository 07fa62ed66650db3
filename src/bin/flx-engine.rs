//! `flx-engine`: the routing engine peer.
//!
//! Creates both queues at startup, answers each request envelope with a
//! correlated routing decision, and unlinks the queues on shutdown.

use std::path::PathBuf;

use clap::Parser;

use telroute::config::{loader, RouterConfig};
use telroute::engine::Engine;
use telroute::lifecycle::ShutdownFlag;
use telroute::observability::logging;

#[derive(Parser)]
#[command(name = "flx-engine")]
#[command(about = "FLX routing engine: subscriber lookup and policy decisions", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init(&config.observability.log_level);

    tracing::info!(
        request_queue = %config.ipc.request_queue,
        response_queue = %config.ipc.response_queue,
        "FLX engine starting"
    );

    let engine = Engine::create(&config.ipc)?;

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers()?;

    let served = engine.serve(&shutdown);

    Engine::unlink_queues(&config.ipc);
    tracing::info!("FLX engine stopping");

    served?;
    Ok(())
}
