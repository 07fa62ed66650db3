//! `router`: the TCP front-end of the signalling router.
//!
//! Startup order matters: the engine owns queue creation, so opening the
//! queues doubles as a liveness check; the listener binds last so clients
//! are only accepted once the dispatch fabric is in place.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use telroute::config::{loader, RouterConfig};
use telroute::dispatch::{demux, CorrelationTable, Dispatcher, WorkerPool};
use telroute::ipc::MessageQueue;
use telroute::lifecycle::ShutdownFlag;
use telroute::net::{bind_listener, Reactor, ReactorHandle};
use telroute::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "router")]
#[command(about = "Telecom signalling router front-end", long_about = None)]
struct Cli {
    /// Bind host; overrides the config file.
    host: Option<String>,

    /// Bind port; overrides the config file.
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(host) = cli.host {
        config.listener.host = host;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    logging::init(&config.observability.log_level);

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        request_queue = %config.ipc.request_queue,
        response_queue = %config.ipc.response_queue,
        workers = config.dispatch.worker_count(),
        "Routing server starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // The engine creates both queues; opening them proves it is up.
    let requests = Arc::new(MessageQueue::open(&config.ipc.router_request_queue())?);
    let responses = Arc::new(MessageQueue::open(&config.ipc.router_response_queue())?);

    let table = Arc::new(CorrelationTable::new());

    let demux_running = Arc::new(AtomicBool::new(true));
    let demux_thread = demux::spawn(
        Arc::clone(&table),
        Arc::clone(&responses),
        Arc::clone(&demux_running),
    )?;

    let (handle, completions, wake_rx) = ReactorHandle::channel()?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&table),
        Arc::clone(&requests),
        handle,
        config.dispatch.clone(),
    ));
    let pool = WorkerPool::spawn(dispatcher, config.dispatch.worker_count())?;

    let listener = bind_listener(
        &config.listener.host,
        config.listener.port,
        config.listener.backlog,
    )?;
    let mut reactor = Reactor::new(listener, pool.sender(), completions, wake_rx)?;

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers()?;

    reactor.run(&shutdown)?;

    // Drain: dropping the reactor closes the job queue, workers finish their
    // bounded waits, and only then does the demultiplexer stop.
    drop(reactor);
    pool.join();
    demux_running.store(false, Ordering::Release);
    let _ = demux_thread.join();

    // Queues are left for the engine to unlink.
    tracing::info!("Shutdown complete");
    Ok(())
}
