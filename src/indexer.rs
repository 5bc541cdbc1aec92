//! Parallel line indexer.
//!
//! Splits a byte buffer into `\n`-terminated lines across several worker
//! threads and applies the line transform to each one. The result is the
//! same sequence a single sequential scan would produce.
//!
//! ## Partitioning
//!
//! The buffer is cut into `workers` contiguous ranges of near-equal size.
//! A line belongs to the range in which it starts, so each range (except
//! the first) first moves its start forward to the next line boundary, and
//! the last line of a range may run past the range's nominal end.
//!
//! ```text
//! buffer:  aaaa\nbbbbbbbb\ncc\ndddd\n
//! ranges:  [0 ....... 11)[11 ......... 22)
//! lines:   "aaaa" "bbbbbbbb" | "cc" "dddd"
//! ```
//!
//! ## Known limitations
//!
//! - A final line with no trailing `\n` is ignored.
//! - If the buffer starts with `\n`, that empty first line produces no record.

use crate::transform::transform_into;
use bytes::{Bytes, BytesMut};
use std::io;
use std::ops::Range;
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Builds line records from a raw buffer using a fixed number of threads.
#[derive(Debug, Clone, Copy)]
pub struct LineIndexer {
    workers: usize,
}

impl LineIndexer {
    /// Create an indexer. A worker count of zero is treated as one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Number of worker threads used per call to [`index`](Self::index).
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Split `data` into transformed line records, in file order.
    pub fn index(&self, data: &[u8]) -> io::Result<Vec<Bytes>> {
        let ranges = partition(data.len(), self.workers);
        if ranges.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();

        let parts = thread::scope(|scope| -> io::Result<Vec<Vec<Bytes>>> {
            let mut handles = Vec::with_capacity(ranges.len());

            for (id, range) in ranges.iter().cloned().enumerate() {
                let handle = thread::Builder::new()
                    .name(format!("indexer-{id}"))
                    .spawn_scoped(scope, move || index_range(data, range))?;
                handles.push(handle);
            }

            // Joined in spawn order, so range order holds whatever order
            // the threads finish in.
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| io::Error::new(io::ErrorKind::Other, "indexer thread panicked"))
                })
                .collect()
        })?;

        let total = parts.iter().map(Vec::len).sum();
        let mut lines = Vec::with_capacity(total);
        for part in parts {
            lines.extend(part);
        }

        debug!(
            bytes = data.len(),
            workers = ranges.len(),
            lines = lines.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Indexed buffer"
        );

        Ok(lines)
    }
}

/// Cut `len` bytes into at most `workers` non-empty nominal ranges.
///
/// Every range has `len / workers` bytes except the last, which absorbs the
/// remainder.
fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }

    let workers = workers.clamp(1, len);
    let chunk = len / workers;

    (0..workers)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 == workers { len } else { start + chunk };
            start..end
        })
        .collect()
}

/// Move a nominal range start to the first line start at or after it.
fn align_start(data: &[u8], start: usize) -> usize {
    if start == 0 {
        // Leading empty line is skipped
        return if data.first() == Some(&b'\n') { 1 } else { 0 };
    }

    if data[start - 1] == b'\n' {
        return start;
    }

    match find_newline(&data[start..]) {
        Some(pos) => start + pos + 1,
        None => data.len(),
    }
}

/// Extract and transform every line that starts inside `range`.
fn index_range(data: &[u8], range: Range<usize>) -> Vec<Bytes> {
    let mut pos = align_start(data, range.start);
    let mut arena = BytesMut::with_capacity(range.end.saturating_sub(pos));
    let mut lines = Vec::new();

    while pos < range.end {
        let Some(len) = find_newline(&data[pos..]) else {
            // Unterminated final line
            break;
        };

        transform_into(&data[pos..pos + len], &mut arena);
        lines.push(arena.split().freeze());
        pos += len + 1;
    }

    lines
}

#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}
