//! linefetch: a line-retrieval server and its load client
//!
//! The server memory-maps a text file, indexes its lines in parallel
//! (dropping the first third of each line and reversing the rest) and
//! answers index lookups over a small binary TCP protocol.
//!
//! The client opens many pipelined connections, fetches every line once,
//! and writes numbered results to an output file while reporting
//! throughput.
//!
//! Configuration via CLI arguments or TOML file.

mod aggregator;
mod client;
mod config;
mod error;
mod indexer;
mod protocol;
mod server;
mod stats;
mod table;
mod transform;

use client::Client;
use config::{ClientOptions, Config, Mode, ServerOptions};
use error::{Error, Result};
use indexer::LineIndexer;
use server::Server;
use std::sync::Arc;
use table::LineTable;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().map_err(Error::from)?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let workers = if config.workers == 0 {
        num_cpus()
    } else {
        config.workers
    };
    let runtime = build_runtime(workers)?;

    match config.mode {
        Mode::Server(options) => run_server(&runtime, options, workers)?,
        Mode::Client(options) => run_client(&runtime, options, workers)?,
    }
    Ok(())
}

fn build_runtime(workers: usize) -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?)
}

/// Index the source file, then serve it
fn run_server(
    runtime: &tokio::runtime::Runtime,
    options: ServerOptions,
    workers: usize,
) -> Result<()> {
    info!(
        file = %options.file.display(),
        listen = %options.listen,
        parse_workers = options.parse_workers,
        runtime_workers = workers,
        "Starting linefetch server"
    );

    let table = match LineTable::load(&options.file, LineIndexer::new(options.parse_workers)) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            error!(error = %e, "Cannot start server");
            return Err(e);
        }
    };

    let server = Server::new(options, table);
    runtime.block_on(server.run())?;
    Ok(())
}

/// Fetch every line and write the output file
fn run_client(
    runtime: &tokio::runtime::Runtime,
    options: ClientOptions,
    workers: usize,
) -> Result<()> {
    info!(runtime_workers = workers, "Starting linefetch client");

    let client = Client::new(options);
    let summary = runtime.block_on(client.run())?;

    let failed = summary.workers.iter().filter(|w| w.received == 0).count();
    info!(
        lines = summary.lines,
        batches = summary.output.batches,
        workers = summary.workers.len(),
        idle_workers = failed,
        use_time = ?summary.elapsed,
        "Run complete"
    );
    Ok(())
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
