//! Catalog crawler main entry point
//!
//! Command-line interface for crawling a retailer's product catalog into a
//! JSON Lines dataset.

use anyhow::Context;
use catalog_crawler::config::{load_config_with_hash, Config, PaginationConfig};
use catalog_crawler::crawler::{crawl, RunReport};
use catalog_crawler::output::{load_statistics, print_statistics};
use catalog_crawler::sites::router_for;
use catalog_crawler::state::counters::{CATEGORIES, DUPLICATES, PRODUCTS};
use catalog_crawler::storage::open_storage;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog crawler: resumable product catalog scraping
///
/// Walks a retailer's category tree and paginated listings, writes each
/// product once to a JSON Lines dataset and checkpoints its progress so an
/// interrupted crawl picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Resumable product catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a new run and forget previously emitted products
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawler=info,warn"),
            1 => EnvFilter::new("catalog_crawler=debug,info"),
            2 => EnvFilter::new("catalog_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let router = router_for(&config.site)?;

    println!("=== Catalog Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max attempts per request: {}", config.crawler.max_retries);
    println!(
        "  Max requests per minute: {}",
        config.crawler.max_requests_per_minute
    );
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!(
        "  Checkpoint interval: {}s",
        config.crawler.checkpoint_interval_secs
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Dataset: {}", config.output.dataset_path);

    println!("\nSite: {}", router.site());
    let labels: Vec<&str> = router.labels().iter().map(|l| l.as_str()).collect();
    println!("  Routes: {}", labels.join(", "));
    match &config.site.pagination {
        PaginationConfig::CountedTotal { page_size, .. } => {
            println!("  Pagination: counted total, {} per page", page_size)
        }
        PaginationConfig::DerivedPageCount { page_url_template } => {
            println!("  Pagination: derived page count ({})", page_url_template)
        }
    }

    println!("\nStart Requests ({}):", config.site.start.len());
    for entry in &config.site.start {
        println!("  - [{}] {}", entry.label, entry.url);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    match load_statistics(&storage)? {
        Some(stats) => print_statistics(&stats),
        None => println!("No runs recorded yet."),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (forgetting processed products)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }
    tracing::info!(
        "Site: {}, start requests: {}",
        config.site.name,
        config.site.start.len()
    );

    let dataset = config.output.dataset_path.clone();
    let report = crawl(config, config_hash, fresh).await.map_err(|e| {
        tracing::error!("Crawl failed: {}", e);
        e
    })?;

    print_report(&report, &dataset);
    Ok(())
}

fn print_report(report: &RunReport, dataset: &str) {
    println!("\n=== Crawl Summary ===\n");
    println!(
        "Run #{}{}",
        report.run_id,
        if report.resumed { " (resumed)" } else { "" }
    );
    println!("Duration: {:.1}s", report.duration.as_secs_f64());
    println!();
    println!("Categories:      {}", report.counter(CATEGORIES));
    println!("Products saved:  {}", report.counter(PRODUCTS));
    println!("Duplicates:      {}", report.counter(DUPLICATES));
    println!("Processed ids:   {}", report.processed_ids);
    println!();
    println!("Requests processed:  {}", report.requests_processed);
    println!("Requests failed:     {}", report.requests_failed);
    println!("Extraction failures: {}", report.extraction_failures);
    println!("\nDataset: {}", dataset);
}
