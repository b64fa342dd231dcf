//! Third ingestion stage: the `pagelinks` table.
//!
//! Each raw `(from_page_id, lt_id)` row resolves through the page id
//! lookup on one side and the linktarget lookup on the other; rows
//! that resolve on both sides become edges. Misses are counted per
//! side and reported once at the end.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::LoadOptions;
use crate::link_target_loader::LinkTargetLoader;
use crate::models::Link;
use crate::page_loader::PageLoader;
use crate::progress::{ProgressFn, Throttle};
use crate::reader::LineReader;
use crate::sql::{self, ParsedRows, TupleParser};
use crate::stream::for_each_insert_line;

pub struct LinkLoader {
    links: Vec<Link>,
    rows_parsed: u64,
    from_misses: u64,
    target_misses: u64,
    malformed_rows: u64,
}

impl LinkLoader {
    pub fn new() -> Self {
        Self {
            links: Vec::new(),
            rows_parsed: 0,
            from_misses: 0,
            target_misses: 0,
            malformed_rows: 0,
        }
    }

    /// Parse one INSERT line of the pagelinks table into
    /// `(from_page_id, lt_id)` rows. Column order: from page id,
    /// source namespace, link target id. Rows whose source page is
    /// outside the main namespace are dropped.
    pub fn parse_line(line: &str) -> ParsedRows<(u32, u64)> {
        let tuples = sql::extract_tuples(line);
        let mut rows = Vec::with_capacity(tuples.len());
        let mut malformed = 0;

        for tuple in tuples {
            let mut parser = TupleParser::new(tuple);
            let Some(from_page_id) = parser.next_int::<u32>() else {
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
            let Some(lt_id) = parser.next_int::<u64>() else {
                malformed += 1;
                continue;
            };
            rows.push((from_page_id, lt_id));
        }

        ParsedRows { rows, malformed }
    }

    pub(crate) fn insert_batch(
        &mut self,
        batch: ParsedRows<(u32, u64)>,
        page_loader: &PageLoader,
        link_target_loader: &LinkTargetLoader,
    ) {
        self.malformed_rows += batch.malformed;
        for (from_page_id, lt_id) in batch.rows {
            self.rows_parsed += 1;
            let from = page_loader.find_index_by_id(from_page_id);
            let to = link_target_loader.find_index_by_linktarget_id(lt_id);
            match (from, to) {
                (Some(from), Some(to)) => self.links.push(Link { from, to }),
                (from, to) => {
                    if from.is_none() {
                        self.from_misses += 1;
                    }
                    if to.is_none() {
                        self.target_misses += 1;
                    }
                }
            }
        }
    }

    /// Stream the pagelinks table and resolve every row into an edge.
    pub fn load(
        &mut self,
        path: &Path,
        page_loader: &PageLoader,
        link_target_loader: &LinkTargetLoader,
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
                            debug!(estimate, "pre-sizing edge list");
                            self.links.reserve(estimate as usize);
                        }
                        Err(e) => {
                            warn!(error = %e, "record estimation failed, edge list will grow on demand");
                        }
                    }
                }
                self.insert_batch(batch, page_loader, link_target_loader);
                throttle.tick(self.links.len() as u64, reader.progress(), on_progress, false);
            },
        )?;

        throttle.tick(self.links.len() as u64, reader.progress(), on_progress, true);

        if reader.had_error() {
            warn!(
                file = %path.display(),
                "pagelinks table ended early on a decompression error, continuing with partial data"
            );
        }

        info!(
            parsed = self.rows_parsed,
            inserted = self.links.len(),
            from_misses = self.from_misses,
            target_misses = self.target_misses,
            malformed_rows = self.malformed_rows,
            "pagelinks table loaded"
        );
        Ok(())
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn rows_parsed(&self) -> u64 {
        self.rows_parsed
    }

    pub fn from_misses(&self) -> u64 {
        self.from_misses
    }

    pub fn target_misses(&self) -> u64 {
        self.target_misses
    }

    pub fn malformed_rows(&self) -> u64 {
        self.malformed_rows
    }

    /// Move the edge list out for the graph build; the loader is
    /// empty afterwards.
    pub fn take_links(&mut self) -> Vec<Link> {
        std::mem::take(&mut self.links)
    }
}

impl Default for LinkLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_lookups() -> (PageLoader, LinkTargetLoader) {
        let mut pages = PageLoader::new();
        pages.insert_batch(PageLoader::parse_line(
            "INSERT INTO page VALUES (10,0,'A',0),(11,0,'B',0);",
        ));
        let mut targets = LinkTargetLoader::new();
        targets.insert_batch(
            LinkTargetLoader::parse_line("INSERT INTO linktarget VALUES (99,0,'B');"),
            &pages,
        );
        (pages, targets)
    }

    #[test]
    fn parse_line_filters_source_namespace() {
        let parsed = LinkLoader::parse_line(
            "INSERT INTO pagelinks VALUES (10,0,99),(10,4,99),(11,0,99);",
        );
        assert_eq!(parsed.rows, vec![(10, 99), (11, 99)]);
        assert_eq!(parsed.malformed, 0);
    }

    #[test]
    fn resolves_edges_through_both_lookups() {
        let (pages, targets) = loaded_lookups();
        let mut loader = LinkLoader::new();
        loader.insert_batch(
            LinkLoader::parse_line("INSERT INTO pagelinks VALUES (10,0,99);"),
            &pages,
            &targets,
        );
        assert_eq!(loader.take_links(), vec![Link { from: 0, to: 1 }]);
    }

    #[test]
    fn counts_misses_per_side() {
        let (pages, targets) = loaded_lookups();
        let mut loader = LinkLoader::new();
        loader.insert_batch(
            LinkLoader::parse_line(
                "INSERT INTO pagelinks VALUES (10,0,99),(77,0,99),(10,0,500),(77,0,500);",
            ),
            &pages,
            &targets,
        );
        assert_eq!(loader.link_count(), 1);
        assert_eq!(loader.from_misses(), 2);
        assert_eq!(loader.target_misses(), 2);
        assert_eq!(loader.rows_parsed(), 4);
    }

    #[test]
    fn take_links_leaves_loader_empty() {
        let (pages, targets) = loaded_lookups();
        let mut loader = LinkLoader::new();
        loader.insert_batch(
            LinkLoader::parse_line("INSERT INTO pagelinks VALUES (10,0,99);"),
            &pages,
            &targets,
        );
        assert_eq!(loader.take_links().len(), 1);
        assert_eq!(loader.link_count(), 0);
    }
}
