//! Load-generating client.
//!
//! Opens `connections` pipelined connections to the server, each fetching
//! its own interleaved share of line indices, and funnels the formatted
//! results into one output file.
//!
//! ```text
//!  worker 0 ──┐
//!  worker 1 ──┼── batch channels ──> Aggregator ──> output file
//!  worker N ──┘
//! ```

mod plan;
mod tokens;
mod worker;

pub use plan::PartitionPlan;
pub use tokens::{TokenPool, DEFAULT_TOKENS};
pub use worker::{Worker, WorkerReport};

use crate::aggregator::{AggregateStats, Aggregator};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::stats::{Counter, StatsReporter};
use std::time::{Duration, Instant};
use tokio::io::BufWriter;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Batches a worker may queue ahead of the aggregator.
const BATCH_QUEUE_DEPTH: usize = 10;

/// Output file write buffer size
const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Outcome of a client run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workers: Vec<WorkerReport>,
    pub output: AggregateStats,
    /// Lines counted by the throughput reporter.
    pub lines: u64,
    pub elapsed: Duration,
}

pub struct Client {
    options: ClientOptions,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        Client { options }
    }

    /// Run all workers to completion and write the output file.
    pub async fn run(&self) -> Result<RunSummary> {
        let options = &self.options;
        let start = Instant::now();

        let file = tokio::fs::File::create(&options.output)
            .await
            .map_err(|e| Error::Output(options.output.clone(), e))?;
        let sink = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);

        info!(
            addr = %options.addr,
            connections = options.connections,
            lines = options.lines,
            output = %options.output.display(),
            "Starting client"
        );

        let received = Counter::new();
        let reporter = StatsReporter::spawn(received.clone(), options.stats_interval, "lines");

        let mut receivers = Vec::with_capacity(options.connections as usize);
        let mut handles = Vec::with_capacity(options.connections as usize);
        for id in 0..options.connections {
            let (tx, rx) = mpsc::channel(BATCH_QUEUE_DEPTH);
            receivers.push(rx);

            let worker = Worker::new(
                options.addr.clone(),
                PartitionPlan::new(id, options.connections, options.lines),
                TokenPool::new(DEFAULT_TOKENS),
                tx,
                received.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        let written = Aggregator::new(receivers).run(sink).await;

        let mut workers = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => workers.push(report),
                Err(e) => warn!(error = %e, "Worker task failed"),
            }
        }
        let lines = reporter.stop().await;

        let output = written.map_err(|e| Error::Output(options.output.clone(), e))?;
        let elapsed = start.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            lines,
            bytes = output.bytes,
            "Client finished"
        );

        Ok(RunSummary {
            workers,
            output,
            lines,
            elapsed,
        })
    }
}
