//! First ingestion stage: the `page` table.
//!
//! Builds the dense page vector plus two lookups, `page_id -> index`
//! and `title -> index`. The id lookup only lives until edges resolve;
//! the title lookup survives into the query phase.

use anyhow::Result;
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::LoadOptions;
use crate::models::Page;
use crate::progress::{ProgressFn, Throttle};
use crate::reader::LineReader;
use crate::sql::{self, ParsedRows, TupleParser};
use crate::stream::for_each_insert_line;

pub struct PageLoader {
    pages: Vec<Page>,
    id_index: Option<FxHashMap<u32, u32>>,
    title_index: Option<FxHashMap<String, u32>>,
    malformed_rows: u64,
}

impl PageLoader {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            id_index: Some(FxHashMap::default()),
            title_index: Some(FxHashMap::default()),
            malformed_rows: 0,
        }
    }

    /// Parse one INSERT line of the page table into `(page_id, Page)`
    /// rows. Column order: page_id, namespace, title, is_redirect;
    /// trailing columns are ignored. Rows outside the main namespace
    /// are dropped.
    pub fn parse_line(line: &str) -> ParsedRows<(u32, Page)> {
        let tuples = sql::extract_tuples(line);
        let mut rows = Vec::with_capacity(tuples.len());
        let mut malformed = 0;

        for tuple in tuples {
            let mut parser = TupleParser::new(tuple);
            let Some(page_id) = parser.next_int::<u32>() else {
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
            let Some(is_redirect) = parser.next_bool() else {
                malformed += 1;
                continue;
            };
            rows.push((page_id, Page { title, is_redirect }));
        }

        ParsedRows { rows, malformed }
    }

    pub(crate) fn insert_batch(&mut self, batch: ParsedRows<(u32, Page)>) {
        self.malformed_rows += batch.malformed;
        let (Some(id_index), Some(title_index)) =
            (self.id_index.as_mut(), self.title_index.as_mut())
        else {
            return;
        };
        for (page_id, page) in batch.rows {
            let index = self.pages.len() as u32;
            id_index.insert(page_id, index);
            title_index.insert(page.title.clone(), index);
            self.pages.push(page);
        }
    }

    /// Stream the page table into the page vector and both lookups.
    pub fn load(
        &mut self,
        path: &Path,
        options: &LoadOptions,
        on_progress: Option<&ProgressFn>,
    ) -> Result<()> {
        let reader = LineReader::open(path)?;
        let mut throttle = Throttle::new(options.refresh_rate);

        for_each_insert_line(
            &reader,
            options.parallelism,
            Self::parse_line,
            |batch, is_first| {
                if is_first {
                    match sql::estimate_record_count(path, batch.rows.len()) {
                        Ok(estimate) => {
                            debug!(estimate, "pre-sizing page containers");
                            let estimate = estimate as usize;
                            self.pages.reserve(estimate);
                            if let Some(index) = self.id_index.as_mut() {
                                index.reserve(estimate);
                            }
                            if let Some(index) = self.title_index.as_mut() {
                                index.reserve(estimate);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "record estimation failed, containers will grow on demand");
                        }
                    }
                }
                self.insert_batch(batch);
                throttle.tick(self.pages.len() as u64, reader.progress(), on_progress, false);
            },
        )?;

        throttle.tick(self.pages.len() as u64, reader.progress(), on_progress, true);

        if reader.had_error() {
            warn!(
                file = %path.display(),
                "page table ended early on a decompression error, continuing with partial data"
            );
        }

        // The page vector outlives every other load structure, so give
        // back the reservation slack now.
        self.pages.shrink_to_fit();

        info!(
            pages = self.pages.len(),
            malformed_rows = self.malformed_rows,
            "page table loaded"
        );
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn malformed_rows(&self) -> u64 {
        self.malformed_rows
    }

    /// Look up a page index by its MediaWiki page id. `None` after the
    /// id lookup has been reclaimed.
    pub fn find_index_by_id(&self, page_id: u32) -> Option<u32> {
        self.id_index.as_ref()?.get(&page_id).copied()
    }

    /// Look up a page index by decoded title. `None` after the title
    /// lookup has been moved out.
    pub fn find_index_by_title(&self, title: &str) -> Option<u32> {
        self.title_index.as_ref()?.get(title).copied()
    }

    /// Reclaim the id lookup once edges are resolved.
    pub fn drop_id_index(&mut self) {
        if self.id_index.take().is_some() {
            debug!("dropping page id lookup");
        }
    }

    /// Move the title lookup out for the query phase; subsequent
    /// title lookups on the loader return `None`.
    pub fn take_title_index(&mut self) -> FxHashMap<String, u32> {
        self.title_index.take().unwrap_or_default()
    }

    /// Move the page vector out for the graph build; the loader is
    /// empty afterwards.
    pub fn take_pages(&mut self) -> Vec<Page> {
        std::mem::take(&mut self.pages)
    }
}

impl Default for PageLoader {
    fn default() -> Self {
        Self::new()
    }
}
