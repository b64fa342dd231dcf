use std::time::Duration;

/// Minimum interval between progress callback invocations.
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(200);

/// Capacity of the decompressor-to-pipeline line queue.
pub const LINE_QUEUE_CAPACITY: usize = 32;

/// Wikipedia SQL dumps emit roughly 1 MiB of uncompressed text per
/// INSERT line; record-count estimation leans on this.
pub const BYTES_PER_INSERT_LINE: u64 = 1024 * 1024;

/// Tuning knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Minimum interval between progress callbacks.
    pub refresh_rate: Duration,
    /// Worker threads for tuple parsing. 1 parses inline on the
    /// pipeline thread; 0 uses all available hardware threads.
    pub parallelism: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            parallelism: 1,
        }
    }
}
