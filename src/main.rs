use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wikipath::config::LoadOptions;
use wikipath::pipeline::{DumpFiles, Pipeline, Stage, Wiki};
use wikipath::progress::BfsProgress;

#[derive(Parser)]
#[command(name = "wikipath")]
#[command(about = "Every shortest path between two Wikipedia articles")]
#[command(version)]
struct Cli {
    /// Gzip-compressed page table dump
    #[arg(long)]
    pages: PathBuf,

    /// Gzip-compressed linktarget table dump
    #[arg(long)]
    link_targets: PathBuf,

    /// Gzip-compressed pagelinks table dump
    #[arg(long)]
    page_links: PathBuf,

    /// Start article title
    #[arg(long)]
    from: String,

    /// Destination article title
    #[arg(long)]
    to: String,

    /// Tuple-parsing worker threads (1 = inline, 0 = all cores)
    #[arg(long, default_value_t = 1)]
    parallelism: usize,

    /// Minimum milliseconds between progress updates
    #[arg(long, default_value_t = 200)]
    refresh_rate_ms: u64,

    /// Emit the result as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct SearchOutput {
    from: String,
    to: String,
    degrees: Option<u32>,
    paths: Vec<Vec<String>>,
}

fn stage_bar(bars: &MultiProgress, name: &'static str) -> ProgressBar {
    let bar = bars.add(ProgressBar::new(0));
    bar.set_style(
        ProgressStyle::with_template("{msg:>32} [{bar:40.cyan/blue}] {percent:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_message(name);
    bar
}

fn titled_path(wiki: &Wiki, path: &[u32]) -> Vec<String> {
    path.iter()
        .map(|&index| {
            wiki.page(index)
                .map(|page| page.title.clone())
                .unwrap_or_default()
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let options = LoadOptions {
        refresh_rate: Duration::from_millis(cli.refresh_rate_ms),
        parallelism: cli.parallelism,
    };
    let mut pipeline = Pipeline::new(options);

    let bars = MultiProgress::new();
    let stages = [
        (Stage::LoadPages, "pages"),
        (Stage::LoadLinkTargets, "link targets"),
        (Stage::LoadLinks, "links"),
        (Stage::BuildGraph, "graph"),
    ];
    for (stage, name) in stages {
        let bar = stage_bar(&bars, name);
        pipeline.subscribe_progress(stage, move |count, speed, read| {
            bar.set_length(read.total_bytes.max(1));
            bar.set_position(read.current_bytes);
            bar.set_message(format!("{} {} ({:.0}/s)", name, count, speed));
        });
    }

    let files = DumpFiles {
        pages: cli.pages,
        link_targets: cli.link_targets,
        page_links: cli.page_links,
    };

    let load_started = Instant::now();
    let wiki = pipeline.run(&files)?;
    bars.clear().ok();

    println!("# ----- Loaded ----- #");
    println!(
        "{} pages, {} links in {:.1}s",
        wiki.page_count(),
        wiki.link_count(),
        load_started.elapsed().as_secs_f64()
    );
    for (stage, name) in stages {
        if let Some(duration) = wiki.stage_duration(stage) {
            println!("  {:>12}: {:.1}s", name, duration.as_secs_f64());
        }
    }

    let Some(start) = wiki.resolve_title(&cli.from) else {
        println!("Article not found: {}", cli.from);
        std::process::exit(1);
    };
    let Some(end) = wiki.resolve_title(&cli.to) else {
        println!("Article not found: {}", cli.to);
        std::process::exit(1);
    };

    println!("# ----- Searching ----- #");
    let spinner = ProgressBar::new_spinner();
    let spinner_clone = spinner.clone();
    let search_callback = move |progress: BfsProgress| {
        spinner_clone.set_message(format!(
            "layer {} ({}/{} nodes), {} explored",
            progress.current_layer,
            progress.layer_explored,
            progress.layer_size,
            progress.total_explored
        ));
        spinner_clone.tick();
    };
    let search_started = Instant::now();
    let paths = wiki.all_shortest_paths(start, end, Some(&search_callback));
    spinner.finish_and_clear();
    info!(
        paths = paths.len(),
        elapsed = ?search_started.elapsed(),
        "search finished"
    );

    let degrees = paths.first().map(|path| path.len() as u32 - 1);
    let titled: Vec<Vec<String>> = paths.iter().map(|path| titled_path(&wiki, path)).collect();

    if cli.json {
        let output = SearchOutput {
            from: cli.from,
            to: cli.to,
            degrees,
            paths: titled,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match degrees {
        None => println!("No path from {} to {}", cli.from, cli.to),
        Some(degrees) => {
            println!(
                "{} shortest path(s), {} degree(s) apart:",
                titled.len(),
                degrees
            );
            for path in &titled {
                println!("  {}", path.join(" -> "));
            }
        }
    }
    Ok(())
}
