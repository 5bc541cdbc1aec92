//! Throughput reporting.
//!
//! Handlers bump a shared [`Counter`]; a background task samples it once per
//! interval with an atomic swap, logs the rate and keeps a running total.
//! Nothing reads the counter for control flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Shared event counter. Cloning shares the underlying value.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Read and reset in one step.
    #[inline]
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to a running reporter task.
pub struct StatsReporter {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl StatsReporter {
    /// Start sampling `counter` every `interval`. `label` names the unit in logs.
    pub fn spawn(counter: Counter, interval: Duration, label: &'static str) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(report_task(counter, interval, label, stopped));
        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Stop the reporter and return the total it observed.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap_or(0)
    }
}

async fn report_task(
    counter: Counter,
    interval: Duration,
    label: &'static str,
    mut stopped: oneshot::Receiver<()>,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately
    ticker.tick().await;

    let mut total = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let speed = counter.take();
                total += speed;
                info!(unit = label, speed, total, "Throughput");
            }
            _ = &mut stopped => {
                total += counter.take();
                info!(unit = label, total, "Final total");
                return total;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_take_resets() {
        let counter = Counter::new();
        let shared = counter.clone();
        shared.incr();
        shared.add(4);
        assert_eq!(counter.get(), 5);
        assert_eq!(counter.take(), 5);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn test_reporter_accumulates_total() {
        let counter = Counter::new();
        let reporter = StatsReporter::spawn(counter.clone(), Duration::from_millis(10), "lines");

        counter.add(3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        counter.add(2);

        assert_eq!(reporter.stop().await, 5);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn test_reporter_stop_without_ticks() {
        let counter = Counter::new();
        let reporter = StatsReporter::spawn(counter.clone(), Duration::from_secs(3600), "requests");
        counter.incr();
        assert_eq!(reporter.stop().await, 1);
    }
}
