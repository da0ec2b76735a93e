//! Per-commit latency records, appended as CSV when `benchmark_path`
//! is configured.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::warn;

/// Current wall clock, Unix nanoseconds.
pub(crate) fn now_unix_nano() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(_) => 0,
    }
}

/// Appends one record per committed block:
/// `height,block_timestamp,commit_start,commit_end,tx_count`.
pub struct Benchmark {
    writer: Mutex<BufWriter<File>>,
}

impl Benchmark {
    /// Open (or create) the record file at `path`.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one commit record and flush it.
    pub fn record(
        &self,
        height: u64,
        block_timestamp: i64,
        commit_start: i64,
        commit_end: i64,
        tx_count: usize,
    ) {
        let mut writer = self.writer.lock();
        let result = writeln!(
            writer,
            "{},{},{},{},{}",
            height, block_timestamp, commit_start, commit_end, tx_count
        )
        .and_then(|_| writer.flush());
        if let Err(err) = result {
            warn!(%err, "failed to write benchmark record");
        }
    }
}
