mod config;
mod dates;
mod export;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::dates::{DateDialect, ResolvedDate};
use crate::export::OutputFormat;
use crate::pipeline::Pipeline;
use crate::scraper::{Fetchers, VenueScraper};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "whatson", about = "Venue show listings scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra TOML config file layered over config/default.toml and config/local.toml
    #[arg(long, global = true, env = "WHATSON_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every active venue (or one) and store new shows
    Ingest {
        /// Only this venue, active or not
        #[arg(long)]
        venue: Option<String>,

        /// Drop and recreate the database first
        #[arg(long)]
        reset: bool,
    },

    /// List shows running during a month
    Shows {
        /// Month as YYYY-MM
        #[arg(short, long)]
        month: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List months that have shows
    Months,

    /// List configured venues
    Venues,

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,

    /// Resolve free-text date(s) the way a venue would
    ResolveDate {
        text: String,

        #[arg(long, default_value = "default")]
        dialect: DateDialect,

        /// Year to assume when the text has none
        #[arg(long)]
        year: Option<i32>,
    },

    /// Save a venue's first listing page to a file for test fixtures
    Snapshot {
        #[arg(long)]
        venue: String,

        #[arg(long)]
        out: PathBuf,
    },
}

fn describe(resolved: ResolvedDate) -> String {
    match resolved {
        ResolvedDate::Single(day) => day.format("%a %d %b %Y").to_string(),
        ResolvedDate::Range(range) => format!(
            "{} → {}",
            range.start.format("%a %d %b %Y"),
            range.end.format("%a %d %b %Y")
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "whatson=info,warn",
        1 => "whatson=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    // Resolving dates needs no configuration
    if let Command::ResolveDate { text, dialect, year } = &cli.command {
        let resolved = dates::resolve(text, *dialect, *year)?;
        println!("{}", describe(resolved));
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ingest { venue, reset } => {
            let _t = utils::Timer::start("Ingest");
            let stats = Pipeline::new(config).run(venue.as_deref(), reset).await?;

            println!("─────────────────────────────────");
            println!("  whatson — Ingest Summary");
            println!("─────────────────────────────────");
            for (name, found) in &stats.succeeded {
                println!("  ✓ {:<24} {} shows", name, utils::fmt_number(*found as i64));
            }
            for (name, err) in &stats.failed {
                println!("  ✗ {:<24} {}", name, err);
            }
            println!("─────────────────────────────────");
            println!("  New shows : {}", utils::fmt_number(stats.shows_inserted as i64));
            println!(
                "  Skipped   : {}",
                utils::fmt_number((stats.shows_found - stats.shows_inserted) as i64)
            );
            println!("─────────────────────────────────");
        }

        Command::Shows { month, format } => {
            let (year, month) = storage::parse_month(&month)?;
            let repo = Repository::open(&config.storage.db_path)?;
            let shows = repo.shows_for_month(year, month)?;
            export::write_shows(std::io::stdout().lock(), &shows, format)?;
        }

        Command::Months => {
            let repo = Repository::open(&config.storage.db_path)?;
            let months = repo.months()?;
            if months.is_empty() {
                println!("No shows — run `whatson ingest` first.");
            } else {
                for (year, month) in months {
                    println!("{}", storage::month_label(year, month));
                }
            }
        }

        Command::Venues => {
            if config.venues.is_empty() {
                println!("No venues configured.");
            }
            for v in &config.venues {
                println!(
                    "{:<24}{:<10}{:<10}{}",
                    v.name,
                    if v.active { "active" } else { "inactive" },
                    v.fetch_strategy,
                    v.url
                );
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            let total = repo.show_count()?;
            let by_venue = repo.counts_by_venue()?;
            let (min, max) = repo.date_span().unwrap_or((None, None));
            let last = repo.last_run()?;

            println!("─────────────────────────────────");
            println!("  whatson — Database Stats");
            println!("─────────────────────────────────");
            println!("  Shows    : {}", utils::fmt_number(total));
            println!("  From     : {}", utils::fmt_date(min));
            println!("  To       : {}", utils::fmt_date(max));
            if let Some(run) = last {
                println!(
                    "  Last run : #{} {} ({}, {} ok / {} failed, {} new shows)",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.status,
                    run.venues_succeeded,
                    run.venues_failed,
                    utils::fmt_number(run.shows_inserted)
                );
                for (venue, err) in repo.run_errors(run.id)? {
                    println!("    ✗ {:<22} {}", venue, err);
                }
            }
            println!("─────────────────────────────────");
            for (venue, count) in &by_venue {
                println!("  {:<24} {}", venue, utils::fmt_number(*count));
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        // Answered above without configuration
        Command::ResolveDate { .. } => {}

        Command::Snapshot { venue, out } => {
            let venue = config
                .venue(&venue)
                .cloned()
                .with_context(|| format!("no venue named {venue:?} in configuration"))?;
            let fetcher = Fetchers::new(&config.scraper)?.get(venue.fetch_strategy)?;
            let html = fetcher.fetch(&venue.url).await?;

            std::fs::write(&out, &html).with_context(|| format!("Could not write {:?}", out))?;
            info!("Saved {} bytes from {} to {:?}", html.len(), venue.url, out);

            let url = venue.url.clone();
            let page = VenueScraper::new(venue)?.extract_page(&html, &url)?;
            println!("{} shows on the first page", page.shows.len());
            if let Some(next) = page.next_url {
                println!("next page: {}", next);
            }
            if let Some(err) = page.error {
                println!("stopped early: {}", err);
            }
        }
    }

    Ok(())
}
