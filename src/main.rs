use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod config;
mod date;
mod error;
mod extract;
mod fetch;
#[cfg(test)]
mod fixtures;
mod price;
mod scrape;
mod table;
mod terms;
mod types;
mod validate;

use config::ScrapeConfig;
use extract::SoldListingExtractor;
use fetch::HttpFetcher;
use price::RangePolicy;
use scrape::ScrapeOrchestrator;
use table::{sort_table_columns, sort_table_file, CsvFileSink};
use terms::CsvTermFile;

#[derive(Parser)]
#[command(name = "sold-prices")]
#[command(about = "Daily average sold prices for tracked products")]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape sold listings for every term and write the price table
    Scrape(ScrapeArgs),
    /// Re-order a price table's date columns chronologically
    SortColumns {
        /// Table to read
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Where to write the sorted table (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    /// Search terms, one per line (first CSV column)
    #[arg(short, long, default_value = "search_terms.csv")]
    terms: PathBuf,
    /// Output price table
    #[arg(short, long, default_value = "Average_Prices_By_Day.csv")]
    output: PathBuf,
    /// JSON run configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Result pages requested per term
    #[arg(long)]
    pages: Option<u32>,
    /// Concurrent page fetches
    #[arg(short, long)]
    workers: Option<usize>,
    /// Exclusive lower price bound
    #[arg(long)]
    min_price: Option<f64>,
    /// Exclusive upper price bound
    #[arg(long)]
    max_price: Option<f64>,
    /// How "$a to $b" price ranges are reduced to one value
    #[arg(long, value_enum)]
    range_policy: Option<RangePolicy>,
    /// Pause after each request, per worker
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,
    /// Cache fetched pages under this directory and reuse them
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Header of the first table column
    #[arg(long)]
    entity_column: Option<String>,
    /// Count a sale repeated across pages (same link, date and price) once
    #[arg(long)]
    dedupe_links: bool,
}

impl ScrapeArgs {
    fn to_config(&self) -> Result<ScrapeConfig> {
        let mut config = match &self.config {
            Some(path) => ScrapeConfig::load(path)?,
            None => ScrapeConfig::default(),
        };
        if let Some(pages) = self.pages {
            config.max_pages = pages;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(min) = self.min_price {
            config.price_bounds.min = min;
        }
        if let Some(max) = self.max_price {
            config.price_bounds.max = max;
        }
        if let Some(policy) = self.range_policy {
            config.range_policy = policy;
        }
        if let Some(delay) = self.delay_ms {
            config.request_delay_ms = delay;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(name) = &self.entity_column {
            config.entity_column = name.clone();
        }
        if self.dedupe_links {
            config.dedupe_links = true;
        }
        Ok(config)
    }
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run_scrape(args: &ScrapeArgs) -> Result<()> {
    let config = args.to_config()?;
    let extractor = SoldListingExtractor::new(&config.selectors)?;
    let fetcher = HttpFetcher::new(&config.user_agent, config.timeout(), config.cache_dir.clone())?;
    let source = CsvTermFile::new(&args.terms);
    let mut sink = CsvFileSink::new(&args.output);

    let stats = ScrapeOrchestrator::new(&config, &fetcher, &extractor).run(&source, &mut sink)?;

    println!(
        "Done! Admitted {} of {} listings ({} pages failed). Summary data written to {}",
        stats.admitted,
        stats.listings_seen,
        stats.pages_failed,
        sink.path().display()
    );
    Ok(())
}

fn run_sort_columns(input: &Path, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => sort_table_file(input, path),
        None => {
            let file = fs::File::open(input)
                .with_context(|| format!("Failed to open table: {}", input.display()))?;
            sort_table_columns(file, io::stdout().lock())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match &cli.command {
        Commands::Scrape(args) => run_scrape(args),
        Commands::SortColumns { input, output } => run_sort_columns(input, output.as_deref()),
    }
}
