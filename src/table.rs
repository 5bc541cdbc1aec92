//! Immutable table of transformed lines.
//!
//! Built once at server startup from a memory-mapped source file and then
//! shared read-only (behind an `Arc`) by every connection handler.

use crate::error::{Error, Result};
use crate::indexer::LineIndexer;
use crate::protocol::MAX_LINE_LEN;
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Ordered, read-only sequence of line records indexed from zero.
#[derive(Debug, Default)]
pub struct LineTable {
    lines: Vec<Bytes>,
}

impl LineTable {
    /// Build a table from raw bytes.
    ///
    /// Fails if any line is too long for a response length prefix.
    pub fn build(data: &[u8], indexer: LineIndexer) -> io::Result<Self> {
        let lines = indexer.index(data)?;
        for (index, line) in lines.iter().enumerate() {
            check_line_len(index, line.len())?;
        }
        Ok(Self { lines })
    }

    /// Memory-map `path` and build a table from its contents.
    pub fn load(path: &Path, indexer: LineIndexer) -> Result<Self> {
        let load_err = |e| Error::Load(path.to_path_buf(), e);

        let start = Instant::now();
        let file = File::open(path).map_err(load_err)?;
        let len = file.metadata().map_err(load_err)?.len();

        // Mapping a zero-length file fails on some platforms
        if len == 0 {
            info!(path = %path.display(), "Source file is empty");
            return Ok(Self::default());
        }

        // SAFETY: the file is opened read-only and the map is dropped before
        // this function returns. Records are copied out by the indexer.
        let mmap = unsafe { Mmap::map(&file) }.map_err(load_err)?;
        info!(
            path = %path.display(),
            bytes = mmap.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Mapped source file"
        );

        let start = Instant::now();
        let table = Self::build(&mmap, indexer).map_err(load_err)?;
        info!(
            lines = table.len(),
            workers = indexer.workers(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed source file"
        );

        Ok(table)
    }

    /// Look up a record. `None` when `index` is past the end.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Bytes> {
        self.lines.get(index as usize)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.lines.iter()
    }
}

fn check_line_len(index: usize, len: usize) -> io::Result<()> {
    if len > MAX_LINE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "line {} is {} bytes, longer than the {} byte limit",
                index + 1,
                len,
                MAX_LINE_LEN
            ),
        ));
    }
    Ok(())
}
