//! One pipelined client connection.
//!
//! A worker owns a single TCP connection and runs two tasks over it:
//!
//! - the **sender** walks the worker's partition plan round by round and
//!   writes one request per index, taking a token from the pool first;
//! - the **receiver** reads responses in the same order, formats each one
//!   as a numbered record, gives the token back, and hands every completed
//!   round to the aggregator as one batch.
//!
//! The two tasks share nothing but the connection and the token pool, so at
//! most `capacity` requests are ever in flight on the connection.
//!
//! ## End of a run
//!
//! The server closes the connection when asked for an index past the end of
//! its table. The receiver sees end-of-stream, delivers whatever the current
//! round has collected, and stops. Closing the token pool then wakes and
//! stops the sender.

use super::plan::PartitionPlan;
use super::tokens::{PoolClosed, TokenPool};
use crate::protocol::{encode_request, REQUEST_LEN};
use crate::stats::Counter;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Socket read buffer size
const BUFFER_SIZE: usize = 64 * 1024;

/// Initial batch capacity per requested line
const BYTES_PER_LINE: usize = 256;

/// Upper bound on the up-front batch reservation
const MAX_BATCH_RESERVE: usize = 4 * 1024 * 1024;

/// Summary of one finished worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: u32,
    /// Requests issued, each under a token.
    pub sent: u64,
    /// Complete responses received.
    pub received: u64,
    /// Batches handed to the aggregator.
    pub batches: u64,
}

/// A client connection and its plan.
pub struct Worker {
    addr: String,
    plan: PartitionPlan,
    tokens: TokenPool,
    batches: mpsc::Sender<Bytes>,
    received: Counter,
}

impl Worker {
    pub fn new(
        addr: String,
        plan: PartitionPlan,
        tokens: TokenPool,
        batches: mpsc::Sender<Bytes>,
        received: Counter,
    ) -> Self {
        Self {
            addr,
            plan,
            tokens,
            batches,
            received,
        }
    }

    /// Connect and run until the connection ends.
    ///
    /// Failures end this worker only. Its batch channel closes when this
    /// returns.
    pub async fn run(self) -> WorkerReport {
        let id = self.plan.id();
        let mut report = WorkerReport {
            id,
            ..Default::default()
        };

        let stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(worker = id, addr = %self.addr, error = %e, "Failed to connect");
                return report;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(worker = id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let sender = tokio::spawn(send_loop(writer, self.tokens.clone(), self.plan));

        let (received, batches) = receive_loop(
            reader,
            &self.tokens,
            self.plan,
            &self.batches,
            &self.received,
        )
        .await;
        report.received = received;
        report.batches = batches;

        self.tokens.close();
        match sender.await {
            Ok(Ok(sent)) => report.sent = sent,
            Ok(Err(e)) => debug!(worker = id, error = %e, "Sender stopped"),
            Err(e) => warn!(worker = id, error = %e, "Sender task failed"),
        }

        debug!(
            worker = id,
            sent = report.sent,
            received = report.received,
            batches = report.batches,
            "Worker finished"
        );
        report
    }
}

/// Write requests for every round of `plan` until the pool closes or a write
/// fails. Returns the number of requests that reached the connection.
async fn send_loop<W>(mut writer: W, tokens: TokenPool, plan: PartitionPlan) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut pending = BytesMut::with_capacity(tokens.capacity() * REQUEST_LEN);
    let mut sent = 0u64;

    for range in plan.rounds() {
        for index in range {
            let acquired = match tokens.try_acquire() {
                Ok(true) => Ok(()),
                Ok(false) => {
                    // Pool is empty: push out what is buffered before waiting,
                    // otherwise the responses that refill it never come.
                    sent += write_pending(&mut writer, &mut pending).await?;
                    tokens.acquire().await
                }
                Err(e) => Err(e),
            };

            if let Err(PoolClosed) = acquired {
                // Anything still buffered is never written
                trace!(worker = plan.id(), sent, "Token pool closed");
                return Ok(sent);
            }

            encode_request(index, &mut pending);
        }
    }

    // Plan exhausted the index space
    sent += write_pending(&mut writer, &mut pending).await?;
    Ok(sent)
}

/// Write buffered requests and return how many there were.
async fn write_pending<W>(writer: &mut W, pending: &mut BytesMut) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    if pending.is_empty() {
        return Ok(0);
    }
    writer.write_all(pending).await?;
    let written = (pending.len() / REQUEST_LEN) as u64;
    pending.clear();
    Ok(written)
}

/// Read responses round by round, delivering one batch per round.
///
/// Returns the number of complete responses and delivered batches.
async fn receive_loop(
    reader: OwnedReadHalf,
    tokens: &TokenPool,
    plan: PartitionPlan,
    batches: &mpsc::Sender<Bytes>,
    counter: &Counter,
) -> (u64, u64) {
    let id = plan.id();
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, reader);
    let mut received = 0u64;
    let mut delivered = 0u64;

    for range in plan.rounds() {
        let reserve = BYTES_PER_LINE.saturating_mul(range.len()).min(MAX_BATCH_RESERVE);
        let mut batch = BytesMut::with_capacity(reserve);
        let mut finished = false;

        for index in range.clone() {
            let len = match reader.read_u32_le().await {
                Ok(len) => len as usize,
                Err(e) => {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        debug!(worker = id, index, "Server closed connection");
                    } else {
                        warn!(worker = id, index, error = %e, "Failed to read length");
                    }
                    finished = true;
                    break;
                }
            };

            push_record_prefix(index, &mut batch);
            let result = read_payload(&mut reader, &mut batch, len).await;
            // Complete or not, the record ends with a newline
            batch.put_u8(b'\n');

            match result {
                Ok(n) if n == len => {
                    received += 1;
                    counter.incr();
                    tokens.release();
                }
                Ok(n) => {
                    warn!(worker = id, index, expected = len, got = n, "Truncated line data");
                    finished = true;
                    break;
                }
                Err(e) => {
                    warn!(worker = id, index, error = %e, "Failed to read line data");
                    finished = true;
                    break;
                }
            }
        }

        if !batch.is_empty() {
            trace!(worker = id, start = range.start, bytes = batch.len(), "Round complete");
            if batches.send(batch.freeze()).await.is_err() {
                debug!(worker = id, "Aggregator gone");
                break;
            }
            delivered += 1;
        }

        if finished {
            break;
        }
    }

    (received, delivered)
}

/// Append the 1-based decimal line number that starts a record.
pub fn push_record_prefix(index: u32, out: &mut BytesMut) {
    out.extend_from_slice((u64::from(index) + 1).to_string().as_bytes());
}

/// Read up to `len` payload bytes onto the end of `out`.
///
/// Returns the number of bytes read, fewer than `len` only if the stream
/// ended. On error, the bytes read so far stay in `out`. The buffer grows
/// with the data actually received, not with the length the peer claimed.
async fn read_payload<R>(reader: &mut R, out: &mut BytesMut, len: usize) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    out.reserve(len.min(BUFFER_SIZE));
    let mut payload = (&mut *reader).take(len as u64);

    let mut filled = 0;
    while filled < len {
        match payload.read_buf(out).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
