//! Tuple-level parsing of MediaWiki `INSERT INTO ... VALUES` lines.
//!
//! Tuples are split on the literal `),(` at the top level. This relies
//! on MediaWiki escaping `(` and `)` inside string literals with `\`,
//! so the three-byte delimiter can never occur inside a quoted value
//! for the targeted schemas. String literals themselves are scanned
//! with full escape awareness, so titles containing `\'` decode
//! correctly.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::config::BYTES_PER_INSERT_LINE;

/// Rows parsed out of one INSERT line, plus the count of rows dropped
/// because a field failed to parse. Rows outside the main namespace
/// are filtered without being counted as malformed.
#[derive(Debug)]
pub struct ParsedRows<T> {
    pub rows: Vec<T>,
    pub malformed: u64,
}

/// Split an `INSERT INTO ... VALUES (...),(...);` line into one `&str`
/// per tuple, parentheses stripped.
pub fn extract_tuples(line: &str) -> Vec<&str> {
    let Some(open) = line.find('(') else {
        return Vec::new();
    };
    let body = line[open + 1..].trim_end();
    let body = body.strip_suffix(");").unwrap_or(body);
    if body.is_empty() {
        return Vec::new();
    }
    body.split("),(").collect()
}

/// Cursor over the fields of a single tuple. Each `next_*` consumes
/// the value and the delimiter preceding it.
pub struct TupleParser<'a> {
    tuple: &'a str,
    pos: usize,
}

impl<'a> TupleParser<'a> {
    pub fn new(tuple: &'a str) -> Self {
        Self { tuple, pos: 0 }
    }

    fn consume_delimiter(&mut self) {
        if self.tuple.as_bytes().get(self.pos) == Some(&b',') {
            self.pos += 1;
        }
    }

    /// Parse the next integer field: an optional sign and a digit run,
    /// ending at a comma or end-of-tuple.
    pub fn next_int<T: FromStr>(&mut self) -> Option<T> {
        self.consume_delimiter();
        let bytes = self.tuple.as_bytes();
        let start = self.pos;
        let mut end = start;
        if matches!(bytes.get(end), Some(&(b'-' | b'+'))) {
            end += 1;
        }
        while matches!(bytes.get(end), Some(&(b'0'..=b'9'))) {
            end += 1;
        }
        let value = self.tuple[start..end].parse().ok()?;
        self.pos = end;
        Some(value)
    }

    /// Parse the next boolean field, encoded as an integer; non-zero
    /// is true.
    pub fn next_bool(&mut self) -> Option<bool> {
        self.next_int::<i64>().map(|value| value != 0)
    }

    /// Parse the next string literal. The literal opens with `'` and
    /// ends at the next unescaped `'`. Decoding: `\\` to `\`, `\'` to
    /// `'`, any other `\x` to `x`, and `_` to a space (MediaWiki title
    /// normalization).
    pub fn next_string(&mut self) -> Option<String> {
        self.consume_delimiter();
        let bytes = self.tuple.as_bytes();
        if bytes.get(self.pos) != Some(&b'\'') {
            return None;
        }
        let start = self.pos + 1;

        let mut i = start;
        let mut escaped = false;
        let end = loop {
            match bytes.get(i) {
                None => return None, // no closing quote
                Some(&b'\\') if !escaped => escaped = true,
                Some(&b'\'') if !escaped => break i,
                _ => escaped = false,
            }
            i += 1;
        };

        let slice = &self.tuple[start..end];
        self.pos = end + 1;

        // Fast path: no escapes, only underscore normalization.
        if !slice.contains('\\') {
            return Some(slice.replace('_', " "));
        }

        let mut out = String::with_capacity(slice.len());
        let mut escape = false;
        for c in slice.chars() {
            if escape {
                out.push(c);
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '_' {
                out.push(' ');
            } else {
                out.push(c);
            }
        }
        Some(out)
    }
}

/// Estimate how many records a gzip dump holds, from the record count
/// of its first INSERT line.
///
/// The last four bytes of a gzip file hold the uncompressed size
/// modulo 2^32; combined with the roughly 1 MiB of text per INSERT
/// line this yields `(compressed / 1 MiB) * first_line_records *
/// ratio`. Advisory only: containers grow if it undershoots.
pub fn estimate_record_count(path: &Path, records_in_first_line: usize) -> Result<u64> {
    let compressed_size = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();

    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    file.seek(SeekFrom::End(-4))
        .context("gzip file shorter than its size footer")?;
    let mut footer = [0u8; 4];
    file.read_exact(&mut footer)
        .context("failed to read gzip size footer")?;
    let uncompressed_size = u32::from_le_bytes(footer);

    let ratio = f64::from(uncompressed_size) / compressed_size as f64;
    let estimate = (compressed_size as f64 / BYTES_PER_INSERT_LINE as f64)
        * records_in_first_line as f64
        * ratio;
    let estimate = estimate as u64;

    debug!(
        estimate,
        compressed_size, uncompressed_size, records_in_first_line, "estimated record count"
    );
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn extract_tuples_splits_top_level() {
        let line = "INSERT INTO x VALUES (1,0,'A_B',0),(2,0,'C',1);";
        assert_eq!(extract_tuples(line), vec!["1,0,'A_B',0", "2,0,'C',1"]);
    }

    #[test]
    fn extract_tuples_single_tuple() {
        let line = "INSERT INTO page VALUES (42,0,'Solo',0);";
        assert_eq!(extract_tuples(line), vec!["42,0,'Solo',0"]);
    }

    #[test]
    fn extract_tuples_ignores_lines_without_parens() {
        assert!(extract_tuples("-- MySQL dump 10.19").is_empty());
        assert!(extract_tuples("").is_empty());
    }

    #[test]
    fn extract_tuples_tolerates_missing_terminator() {
        let line = "INSERT INTO x VALUES (1,0,'A',0)";
        assert_eq!(extract_tuples(line), vec!["1,0,'A',0)"]);
    }

    #[test]
    fn parse_integers_and_bool() {
        let mut parser = TupleParser::new("12,-3,0,7");
        assert_eq!(parser.next_int::<u32>(), Some(12));
        assert_eq!(parser.next_int::<i32>(), Some(-3));
        assert_eq!(parser.next_bool(), Some(false));
        assert_eq!(parser.next_bool(), Some(true));
        assert_eq!(parser.next_int::<u32>(), None);
    }

    #[test]
    fn negative_value_fails_for_unsigned() {
        let mut parser = TupleParser::new("-1");
        assert_eq!(parser.next_int::<u32>(), None);
    }

    #[test]
    fn parse_string_replaces_underscores() {
        let mut parser = TupleParser::new("'Rust_(programming_language)'");
        assert_eq!(
            parser.next_string().as_deref(),
            Some("Rust (programming language)")
        );
    }

    #[test]
    fn parse_string_decodes_escapes() {
        // (7,0,'O\'Neil\\s',0)
        let mut parser = TupleParser::new(r"7,0,'O\'Neil\\s',0");
        assert_eq!(parser.next_int::<u32>(), Some(7));
        assert_eq!(parser.next_int::<i32>(), Some(0));
        assert_eq!(parser.next_string().as_deref(), Some(r"O'Neil\s"));
        assert_eq!(parser.next_bool(), Some(false));
    }

    #[test]
    fn escaped_underscore_stays_literal() {
        let mut parser = TupleParser::new(r"'a\_b'");
        assert_eq!(parser.next_string().as_deref(), Some("a_b"));
    }

    #[test]
    fn unknown_escape_drops_backslash() {
        let mut parser = TupleParser::new(r"'a\%b'");
        assert_eq!(parser.next_string().as_deref(), Some("a%b"));
    }

    #[test]
    fn string_without_opening_quote_fails() {
        let mut parser = TupleParser::new("plain");
        assert_eq!(parser.next_string(), None);
    }

    #[test]
    fn string_without_closing_quote_fails() {
        let mut parser = TupleParser::new(r"'never ends\'");
        assert_eq!(parser.next_string(), None);
    }

    #[test]
    fn cursor_advances_past_mixed_fields() {
        let mut parser = TupleParser::new("5,0,'Title_here',1,0.5,'extra'");
        assert_eq!(parser.next_int::<u32>(), Some(5));
        assert_eq!(parser.next_int::<i32>(), Some(0));
        assert_eq!(parser.next_string().as_deref(), Some("Title here"));
        assert_eq!(parser.next_bool(), Some(true));
    }

    fn gz_file_with_content(content: &[u8]) -> NamedTempFile {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(content).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&compressed).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn estimate_tracks_first_line_density() {
        // One "line" of exactly the assumed uncompressed size makes
        // the arithmetic collapse to the first-line record count.
        let content = vec![b'x'; BYTES_PER_INSERT_LINE as usize];
        let tmp = gz_file_with_content(&content);

        let estimate = estimate_record_count(tmp.path(), 1000).unwrap();
        assert!(
            (999..=1001).contains(&estimate),
            "estimate {} out of range",
            estimate
        );
    }

    #[test]
    fn estimate_fails_on_truncated_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"xy").unwrap();
        tmp.flush().unwrap();
        assert!(estimate_record_count(tmp.path(), 10).is_err());
    }
}
