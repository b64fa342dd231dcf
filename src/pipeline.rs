//! Stage sequencing and staged memory reclamation.
//!
//! Stages run strictly in order: pages, link targets, links, graph
//! build. Auxiliary lookups are dropped at the first boundary where
//! they are no longer needed, so the edge list, the id lookups, and
//! the finished adjacency are never all live at once. What survives
//! into the query phase is the graph plus the title lookup, owned by
//! the returned [`Wiki`] value.

use anyhow::Result;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::LoadOptions;
use crate::graph::PageGraph;
use crate::link_loader::LinkLoader;
use crate::link_target_loader::LinkTargetLoader;
use crate::models::{Page, ReadProgress};
use crate::page_loader::PageLoader;
use crate::progress::{BfsProgressFn, ProgressFn};
use crate::stats::LoadStats;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadPages,
    LoadLinkTargets,
    LoadLinks,
    BuildGraph,
}

/// The three dump tables a wiki graph is assembled from.
#[derive(Debug, Clone)]
pub struct DumpFiles {
    pub pages: PathBuf,
    pub link_targets: PathBuf,
    pub page_links: PathBuf,
}

pub struct Pipeline {
    options: LoadOptions,
    callbacks: HashMap<Stage, Box<ProgressFn>>,
}

impl Pipeline {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            callbacks: HashMap::new(),
        }
    }

    /// Register an observer for one stage's progress. Observers must
    /// not call back into the pipeline.
    pub fn subscribe_progress(
        &mut self,
        stage: Stage,
        callback: impl Fn(u64, f64, ReadProgress) + Send + Sync + 'static,
    ) {
        self.callbacks.insert(stage, Box::new(callback));
    }

    fn callback(&self, stage: Stage) -> Option<&ProgressFn> {
        self.callbacks.get(&stage).map(|boxed| boxed.as_ref())
    }

    /// Run every stage and return the queryable result.
    pub fn run(self, files: &DumpFiles) -> Result<Wiki> {
        let mut durations = HashMap::new();

        let mut page_loader = PageLoader::new();
        info!(file = %files.pages.display(), "loading page table");
        let started = Instant::now();
        page_loader.load(&files.pages, &self.options, self.callback(Stage::LoadPages))?;
        durations.insert(Stage::LoadPages, started.elapsed());

        let mut link_target_loader = LinkTargetLoader::new();
        info!(file = %files.link_targets.display(), "loading linktarget table");
        let started = Instant::now();
        link_target_loader.load(
            &files.link_targets,
            &page_loader,
            &self.options,
            self.callback(Stage::LoadLinkTargets),
        )?;
        durations.insert(Stage::LoadLinkTargets, started.elapsed());
        // the title lookup stays live for user queries

        let mut link_loader = LinkLoader::new();
        info!(file = %files.page_links.display(), "loading pagelinks table");
        let started = Instant::now();
        link_loader.load(
            &files.page_links,
            &page_loader,
            &link_target_loader,
            &self.options,
            self.callback(Stage::LoadLinks),
        )?;
        durations.insert(Stage::LoadLinks, started.elapsed());

        // Both id lookups existed only to resolve edges.
        page_loader.drop_id_index();
        link_target_loader.drop_index();

        let stats = LoadStats {
            page_rows_malformed: page_loader.malformed_rows(),
            link_target_rows_parsed: link_target_loader.rows_parsed(),
            link_target_rows_malformed: link_target_loader.malformed_rows(),
            link_target_title_misses: link_target_loader.title_misses(),
            link_rows_parsed: link_loader.rows_parsed(),
            link_rows_malformed: link_loader.malformed_rows(),
            links_inserted: link_loader.link_count() as u64,
            link_from_misses: link_loader.from_misses(),
            link_target_id_misses: link_loader.target_misses(),
        };

        info!("building graph");
        let started = Instant::now();
        let titles = page_loader.take_title_index();
        let pages = page_loader.take_pages();
        let links = link_loader.take_links();
        let graph = PageGraph::build(
            pages,
            links,
            self.options.refresh_rate,
            self.callback(Stage::BuildGraph),
        );
        durations.insert(Stage::BuildGraph, started.elapsed());

        info!(
            pages = graph.page_count(),
            links = graph.link_count(),
            "pipeline complete"
        );

        Ok(Wiki {
            graph,
            titles,
            stats,
            durations,
            refresh_rate: self.options.refresh_rate,
        })
    }
}

/// The loaded, immutable result of a pipeline run: the article graph
/// plus the title lookup. Safe to share by reference across search
/// threads.
pub struct Wiki {
    graph: PageGraph,
    titles: FxHashMap<String, u32>,
    stats: LoadStats,
    durations: HashMap<Stage, Duration>,
    refresh_rate: Duration,
}

impl Wiki {
    /// Resolve an article title to its page index. Underscores are
    /// accepted in place of spaces, matching dump normalization.
    pub fn resolve_title(&self, title: &str) -> Option<u32> {
        if title.contains('_') {
            return self.titles.get(&title.replace('_', " ")).copied();
        }
        self.titles.get(title).copied()
    }

    pub fn page(&self, index: u32) -> Option<&Page> {
        self.graph.page(index)
    }

    pub fn page_count(&self) -> u32 {
        self.graph.page_count()
    }

    pub fn link_count(&self) -> u64 {
        self.graph.link_count()
    }

    pub fn graph(&self) -> &PageGraph {
        &self.graph
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn stage_duration(&self, stage: Stage) -> Option<Duration> {
        self.durations.get(&stage).copied()
    }

    /// Every shortest path between two page indices; see
    /// [`PageGraph::all_shortest_paths`].
    pub fn all_shortest_paths(
        &self,
        start: u32,
        end: u32,
        on_progress: Option<&BfsProgressFn>,
    ) -> Vec<Vec<u32>> {
        self.graph
            .all_shortest_paths(start, end, self.refresh_rate, on_progress)
    }
}
