//! Fan-in of result batches from many client workers.
//!
//! Each worker owns the sending side of one channel. The aggregator visits
//! the channels in a fixed rotation, waits for one batch from each, and
//! writes it to the sink as-is. A channel that is closed and empty leaves
//! the rotation; the run ends when none are left.
//!
//! The output is therefore a fair interleaving of per-worker streams: every
//! worker's batches appear in the order that worker produced them, but there
//! is no ordering between workers.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Totals written by one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub batches: u64,
    pub bytes: u64,
}

pub struct Aggregator {
    /// (worker id, channel) in rotation order.
    channels: Vec<(usize, mpsc::Receiver<Bytes>)>,
}

impl Aggregator {
    /// Build a rotation over `receivers`; worker ids are their positions.
    pub fn new(receivers: Vec<mpsc::Receiver<Bytes>>) -> Self {
        Self {
            channels: receivers.into_iter().enumerate().collect(),
        }
    }

    /// Drain every channel into `sink`, then flush it.
    pub async fn run<W>(mut self, mut sink: W) -> std::io::Result<AggregateStats>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stats = AggregateStats::default();

        while !self.channels.is_empty() {
            let mut i = 0;
            while i < self.channels.len() {
                let (worker, rx) = &mut self.channels[i];
                match rx.recv().await {
                    Some(batch) => {
                        sink.write_all(&batch).await?;
                        stats.batches += 1;
                        stats.bytes += batch.len() as u64;
                        i += 1;
                    }
                    None => {
                        debug!(worker = *worker, "Worker channel closed");
                        self.channels.remove(i);
                    }
                }
            }
        }

        sink.flush().await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channels(batches: Vec<Vec<&'static str>>) -> Vec<mpsc::Receiver<Bytes>> {
        batches
            .into_iter()
            .map(|worker| {
                let (tx, rx) = mpsc::channel(worker.len().max(1));
                for batch in worker {
                    tx.try_send(Bytes::from_static(batch.as_bytes())).unwrap();
                }
                rx
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let receivers = channels(vec![
            vec!["a1 ", "a2 "],
            vec!["b1 "],
            vec!["c1 ", "c2 ", "c3 "],
        ]);

        let mut out = Vec::new();
        let stats = Aggregator::new(receivers).run(&mut out).await.unwrap();

        assert_eq!(out, b"a1 b1 c1 a2 c2 c3 ");
        assert_eq!(stats.batches, 6);
        assert_eq!(stats.bytes, 18);
    }

    #[tokio::test]
    async fn test_empty_channels() {
        let receivers = channels(vec![vec![], vec!["x"], vec![]]);
        let mut out = Vec::new();
        let stats = Aggregator::new(receivers).run(&mut out).await.unwrap();
        assert_eq!(out, b"x");
        assert_eq!(stats.batches, 1);

        let mut out = Vec::new();
        let stats = Aggregator::new(Vec::new()).run(&mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(stats, AggregateStats::default());
    }

    #[tokio::test]
    async fn test_waits_for_slow_worker() {
        let (fast_tx, fast_rx) = mpsc::channel(4);
        let (slow_tx, slow_rx) = mpsc::channel(4);

        fast_tx.send(Bytes::from_static(b"f1 ")).await.unwrap();
        fast_tx.send(Bytes::from_static(b"f2 ")).await.unwrap();
        drop(fast_tx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            slow_tx.send(Bytes::from_static(b"s1 ")).await.unwrap();
        });

        let mut out = Vec::new();
        Aggregator::new(vec![fast_rx, slow_rx])
            .run(&mut out)
            .await
            .unwrap();

        // The rotation blocks on the slow channel before revisiting the fast one.
        assert_eq!(out, b"f1 s1 f2 ");
    }
}
