//! Dispatches `INSERT INTO` lines from a reader to a parse function.
//!
//! Everything that is not an INSERT line (DDL, comments, blank
//! separators) is discarded. Parsing can run inline or on a worker
//! pool; either way results are handed to the consumer in file order,
//! because downstream inserts assign dense indices by arrival.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::mpsc;

use crate::reader::LineReader;

const INSERT_PREFIX: &str = "INSERT INTO";

/// Feed every INSERT line through `parse` and hand each result to
/// `handle`, with `is_first` set for the very first parsed batch so
/// the caller can pre-size containers from it.
///
/// `parallelism` of 1 parses inline on the calling thread. Any other
/// value spawns a pool (0 uses all hardware threads) and bounds
/// in-flight work at twice the pool size: each task owns a result
/// slot, slots are drained front-first, so submission order survives
/// the parallel parse.
pub fn for_each_insert_line<T, F>(
    reader: &LineReader,
    parallelism: usize,
    parse: fn(&str) -> T,
    mut handle: F,
) -> Result<()>
where
    T: Send + 'static,
    F: FnMut(T, bool),
{
    let mut first = true;

    if parallelism == 1 {
        while let Some(line) = reader.next_line() {
            if !line.starts_with(INSERT_PREFIX) {
                continue;
            }
            handle(parse(&line), first);
            first = false;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .thread_name(|i| format!("parse-{}", i))
        .build()
        .context("failed to build parse worker pool")?;
    let max_in_flight = pool.current_num_threads() * 2;

    let mut in_flight: VecDeque<mpsc::Receiver<T>> = VecDeque::with_capacity(max_in_flight);

    while let Some(line) = reader.next_line() {
        if !line.starts_with(INSERT_PREFIX) {
            continue;
        }
        let (slot, result) = mpsc::channel();
        pool.spawn(move || {
            let _ = slot.send(parse(&line));
        });
        in_flight.push_back(result);

        if in_flight.len() >= max_in_flight {
            if let Some(result) = in_flight.pop_front() {
                if let Ok(batch) = result.recv() {
                    handle(batch, first);
                    first = false;
                }
            }
        }
    }

    while let Some(result) = in_flight.pop_front() {
        if let Ok(batch) = result.recv() {
            handle(batch, first);
            first = false;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gz_fixture(lines: &[&str]) -> NamedTempFile {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        for line in lines {
            encoder.write_all(line.as_bytes()).unwrap();
            encoder.write_all(b"\n").unwrap();
        }
        let compressed = encoder.finish().unwrap();

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&compressed).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    fn first_number(line: &str) -> u32 {
        line.split('#').nth(1).and_then(|n| n.parse().ok()).unwrap()
    }

    #[test]
    fn filters_non_insert_lines() {
        let tmp = gz_fixture(&[
            "-- MySQL dump",
            "CREATE TABLE `page` (id int);",
            "INSERT INTO page #1",
            "",
            "INSERT INTO page #2",
        ]);
        let reader = LineReader::open(tmp.path()).unwrap();

        let mut seen = Vec::new();
        for_each_insert_line(&reader, 1, first_number, |n, _| seen.push(n)).unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn first_batch_flagged_once() {
        let tmp = gz_fixture(&["INSERT INTO x #1", "INSERT INTO x #2", "INSERT INTO x #3"]);
        let reader = LineReader::open(tmp.path()).unwrap();

        let mut firsts = Vec::new();
        for_each_insert_line(&reader, 1, first_number, |n, is_first| {
            firsts.push((n, is_first));
        })
        .unwrap();
        assert_eq!(firsts, vec![(1, true), (2, false), (3, false)]);
    }

    #[test]
    fn parallel_parse_preserves_file_order() {
        let lines: Vec<String> = (0..500)
            .map(|i| format!("INSERT INTO x #{}", i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let tmp = gz_fixture(&refs);
        let reader = LineReader::open(tmp.path()).unwrap();

        let mut seen = Vec::new();
        for_each_insert_line(&reader, 4, first_number, |n, _| seen.push(n)).unwrap();
        assert_eq!(seen, (0..500).collect::<Vec<u32>>());
    }

    #[test]
    fn empty_stream_invokes_nothing() {
        let tmp = gz_fixture(&[]);
        let reader = LineReader::open(tmp.path()).unwrap();
        let mut calls = 0;
        for_each_insert_line(&reader, 1, first_number, |_, _| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }
}
