//! Streaming line reader for gzip-compressed dump files.
//!
//! A background thread decompresses the file and feeds lines into a
//! bounded queue; the pipeline thread drains it. Progress is measured
//! in compressed bytes so the reported fraction matches how much of
//! the on-disk file has been consumed.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::config::LINE_QUEUE_CAPACITY;
use crate::models::ReadProgress;

/// Counts the bytes pulled through an inner reader, observable from
/// another thread. Wrapped around the compressed file so the decoder's
/// offset into the compressed stream is visible.
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

pub struct LineReader {
    lines: Receiver<String>,
    total_bytes: u64,
    current_bytes: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
}

impl LineReader {
    /// Open a gzip file and start the background decompression thread.
    /// A missing or unreadable file is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let total_bytes = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

        let (sender, receiver) = bounded(LINE_QUEUE_CAPACITY);
        let current_bytes = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let counter = Arc::clone(&current_bytes);
        let failure_flag = Arc::clone(&failed);
        let file_name = path.display().to_string();
        // Detached on purpose: the producer exits on EOF, on error, or
        // when the receiver goes away.
        let _producer = thread::Builder::new()
            .name("line-reader".into())
            .spawn(move || {
                let decoder = MultiGzDecoder::new(CountingReader {
                    inner: file,
                    count: counter,
                });
                let mut reader = BufReader::new(decoder);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if line.ends_with('\n') {
                                line.pop();
                                if line.ends_with('\r') {
                                    line.pop();
                                }
                            }
                            if sender.send(std::mem::take(&mut line)).is_err() {
                                // receiver dropped, nobody is listening
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                file = %file_name,
                                "decompression failed mid-stream, ending early"
                            );
                            failure_flag.store(true, Ordering::Release);
                            break;
                        }
                    }
                }
                debug!(file = %file_name, "reader finished");
                // sender drops here, which the receiver sees as
                // end-of-stream once the queue drains
            })
            .context("failed to spawn reader thread")?;

        Ok(Self {
            lines: receiver,
            total_bytes,
            current_bytes,
            failed,
        })
    }

    /// Blocking dequeue. `None` only after the producer finished and
    /// the queue drained; a partial line at end-of-input is delivered
    /// as the final line.
    pub fn next_line(&self) -> Option<String> {
        self.lines.recv().ok()
    }

    pub fn progress(&self) -> ReadProgress {
        ReadProgress {
            total_bytes: self.total_bytes,
            current_bytes: self.current_bytes.load(Ordering::Relaxed),
        }
    }

    /// Whether the stream ended on a decompression error rather than
    /// end-of-file.
    pub fn had_error(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gz_fixture(content: &str) -> NamedTempFile {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(content.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&compressed).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    fn drain(reader: &LineReader) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn reads_all_lines_in_order() {
        let tmp = gz_fixture("first\nsecond\nthird\n");
        let reader = LineReader::open(tmp.path()).unwrap();
        assert_eq!(drain(&reader), vec!["first", "second", "third"]);
        assert!(!reader.had_error());
    }

    #[test]
    fn partial_final_line_is_delivered() {
        let tmp = gz_fixture("complete\npartial");
        let reader = LineReader::open(tmp.path()).unwrap();
        assert_eq!(drain(&reader), vec!["complete", "partial"]);
    }

    #[test]
    fn empty_input_yields_no_lines() {
        let tmp = gz_fixture("");
        let reader = LineReader::open(tmp.path()).unwrap();
        assert!(drain(&reader).is_empty());
        assert!(!reader.had_error());
    }

    #[test]
    fn progress_reaches_total_after_drain() {
        let tmp = gz_fixture(&"line\n".repeat(10_000));
        let reader = LineReader::open(tmp.path()).unwrap();
        let total = reader.progress().total_bytes;
        assert!(total > 0);
        drain(&reader);
        let progress = reader.progress();
        assert_eq!(progress.current_bytes, total);
    }

    #[test]
    fn nonexistent_file_is_fatal() {
        assert!(LineReader::open(Path::new("/nonexistent/dump.sql.gz")).is_err());
    }

    #[test]
    fn corrupt_input_flags_error_and_ends_stream() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"this is not a gzip stream at all").unwrap();
        tmp.flush().unwrap();

        let reader = LineReader::open(tmp.path()).unwrap();
        assert!(drain(&reader).is_empty());
        assert!(reader.had_error());
    }

    #[test]
    fn handles_lines_longer_than_queue_buffering() {
        let long_line = "x".repeat(100_000);
        let content = format!("{}\nshort\n", long_line);
        let tmp = gz_fixture(&content);
        let reader = LineReader::open(tmp.path()).unwrap();
        let lines = drain(&reader);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 100_000);
        assert_eq!(lines[1], "short");
    }
}
