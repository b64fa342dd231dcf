//! Second ingestion stage: the `linktarget` table.
//!
//! The pagelinks table references link targets by a 64-bit id rather
//! than by title, so this stage joins `(lt_id, title)` rows against
//! the title lookup to produce `lt_id -> page index`. The map lives
//! only until edges resolve.

use anyhow::Result;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::LoadOptions;
use crate::page_loader::PageLoader;
use crate::progress::{ProgressFn, Throttle};
use crate::reader::LineReader;
use crate::sql::{self, ParsedRows, TupleParser};
use crate::stream::for_each_insert_line;

pub struct LinkTargetLoader {
    index: Option<FxHashMap<u64, u32>>,
    rows_parsed: u64,
    mapped: u64,
    title_misses: u64,
    malformed_rows: u64,
}

impl LinkTargetLoader {
    pub fn new() -> Self {
        Self {
            index: Some(FxHashMap::default()),
            rows_parsed: 0,
            mapped: 0,
            title_misses: 0,
            malformed_rows: 0,
        }
    }

    /// Parse one INSERT line of the linktarget table into
    /// `(lt_id, title)` rows. Column order: lt_id, namespace, title.
    pub fn parse_line(line: &str) -> ParsedRows<(u64, String)> {
        let tuples = sql::extract_tuples(line);
        let mut rows = Vec::with_capacity(tuples.len());
        let mut malformed = 0;

        for tuple in tuples {
            let mut parser = TupleParser::new(tuple);
            let Some(lt_id) = parser.next_int::<u64>() else {
                malformed += 1;
                continue;
            };
            let Some(namespace) = parser.next_int::<i32>() else {
                malformed += 1;
                continue;
            };
            if namespace != 0 {
                continue;
            }
            let Some(title) = parser.next_string() else {
                malformed += 1;
                continue;
            };
            rows.push((lt_id, title));
        }

        ParsedRows { rows, malformed }
    }

    pub(crate) fn insert_batch(&mut self, batch: ParsedRows<(u64, String)>, page_loader: &PageLoader) {
        self.malformed_rows += batch.malformed;
        let Some(index) = self.index.as_mut() else {
            return;
        };
        for (lt_id, title) in batch.rows {
            self.rows_parsed += 1;
            match page_loader.find_index_by_title(&title) {
                Some(page_index) => {
                    index.insert(lt_id, page_index);
                    self.mapped += 1;
                }
                None => self.title_misses += 1,
            }
        }
    }

    /// Stream the linktarget table and join it against the loaded
    /// pages.
    pub fn load(
        &mut self,
        path: &Path,
        page_loader: &PageLoader,
        options: &LoadOptions,
        on_progress: Option<&ProgressFn>,
    ) -> Result<()> {
        let reader = LineReader::open(path)?;
        let mut throttle = Throttle::new(options.refresh_rate);

        // Almost every article is the target of at least one row, so
        // the page count is a close upper bound.
        if let Some(index) = self.index.as_mut() {
            index.reserve(page_loader.page_count());
        }

        for_each_insert_line(
            &reader,
            options.parallelism,
            Self::parse_line,
            |batch, _is_first| {
                self.insert_batch(batch, page_loader);
                throttle.tick(self.mapped, reader.progress(), on_progress, false);
            },
        )?;

        throttle.tick(self.mapped, reader.progress(), on_progress, true);

        if reader.had_error() {
            warn!(
                file = %path.display(),
                "linktarget table ended early on a decompression error, continuing with partial data"
            );
        }

        info!(
            parsed = self.rows_parsed,
            mapped = self.mapped,
            title_misses = self.title_misses,
            malformed_rows = self.malformed_rows,
            "linktarget table loaded"
        );
        Ok(())
    }

    /// Look up a page index by link target id. `None` after the map
    /// has been reclaimed.
    pub fn find_index_by_linktarget_id(&self, lt_id: u64) -> Option<u32> {
        self.index.as_ref()?.get(&lt_id).copied()
    }

    /// Reclaim the map once edges are resolved.
    pub fn drop_index(&mut self) {
        if self.index.take().is_some() {
            debug!("dropping linktarget lookup");
        }
    }

    pub fn rows_parsed(&self) -> u64 {
        self.rows_parsed
    }

    pub fn mapped(&self) -> u64 {
        self.mapped
    }

    pub fn title_misses(&self) -> u64 {
        self.title_misses
    }

    pub fn malformed_rows(&self) -> u64 {
        self.malformed_rows
    }
}

impl Default for LinkTargetLoader {
    fn default() -> Self {
        Self::new()
    }
}
