mod config;
mod db;
mod extraction;
mod fetcher;
mod parser;
mod record;
mod staging;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use config::{FetchConfig, PipelineConfig};
use extraction::{Extraction, StopReason};
use fetcher::HttpPageFetcher;
use staging::{StagedBatch, StagingFile, StagingSlot};

#[derive(Parser)]
#[command(name = "books_etl", about = "Scrape the books catalog and load it into SQLite")]
struct Cli {
    /// SQLite database the books table lives in
    #[arg(long, global = true, default_value = config::DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the books table if it does not exist
    Init,
    /// Scrape catalog pages and stage the records to a file
    Extract {
        #[command(flatten)]
        extract: ExtractArgs,
        /// Staging file to write
        #[arg(long, default_value = config::DEFAULT_STAGING_PATH)]
        staging: PathBuf,
    },
    /// Load a staged file into the books table
    Load {
        /// Staging file to consume
        #[arg(long, default_value = config::DEFAULT_STAGING_PATH)]
        staging: PathBuf,
    },
    /// Extract, provision the table, then load, in one process
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Show row counts for the books table
    Stats,
}

#[derive(Args)]
struct ExtractArgs {
    /// Number of books to collect
    #[arg(short = 'n', long, default_value_t = config::DEFAULT_TARGET_COUNT)]
    target: usize,
    /// Maximum number of catalog pages to fetch
    #[arg(long, default_value_t = config::DEFAULT_PAGE_CEILING)]
    pages: u32,
    /// Catalog page URL, with {page} standing for the 1-based index
    #[arg(long, default_value = config::DEFAULT_URL_PATTERN)]
    url_pattern: String,
    /// Per-request timeout
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Treat a failed page fetch (anything but 404) as a failed run instead of keeping partial results
    #[arg(long)]
    strict: bool,
}

impl ExtractArgs {
    fn into_config(self, db: PathBuf) -> anyhow::Result<PipelineConfig> {
        let config = PipelineConfig {
            target_count: self.target,
            page_ceiling: self.pages,
            connection: db,
            fetch: FetchConfig {
                url_pattern: self.url_pattern,
                timeout: Duration::from_secs(self.timeout_secs),
                ..FetchConfig::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            println!("books table ready in {}", cli.db.display());
            Ok(())
        }
        Commands::Extract { extract, staging } => {
            let strict = extract.strict;
            let config = extract.into_config(cli.db)?;
            let Extraction { records, stop, .. } = run_extraction(&config).await?;
            if strict && stop.is_transient_failure() {
                return surface_stop(stop).context("Nothing staged (--strict)");
            }

            let file = StagingFile::new(staging);
            let batch = StagedBatch::new(config.target_count, records);
            file.stage(&batch)?;
            println!(
                "Staged {} books to {} ({})",
                batch.records.len(),
                file.path().display(),
                stop
            );
            surface_stop(stop).context("Partial batch staged")
        }
        Commands::Load { staging } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let batch = StagingFile::new(&staging)
                .take()
                .context("Cannot load: run 'extract' first")?;
            let written = load_batch(&conn, &batch)?;
            println!("Inserted {} books into {}", written, cli.db.display());
            Ok(())
        }
        Commands::Run { extract } => {
            let strict = extract.strict;
            let config = extract.into_config(cli.db)?;

            // Phase 1: extract
            let t_extract = Instant::now();
            let Extraction {
                records,
                pages_fetched,
                stop,
            } = run_extraction(&config).await?;
            println!(
                "Extracted {} books from {} pages in {:.1}s ({})",
                records.len(),
                pages_fetched,
                t_extract.elapsed().as_secs_f64(),
                stop
            );
            if strict && stop.is_transient_failure() {
                return surface_stop(stop).context("Not loading (--strict)");
            }

            let mut slot = StagingSlot::new();
            slot.stage(StagedBatch::new(config.target_count, records))?;

            // Phase 2: provision
            let conn = db::connect(&config.connection)?;
            db::init_schema(&conn)?;

            // Phase 3: load
            let batch = slot.take()?;
            let written = load_batch(&conn, &batch)?;
            println!("Inserted {} books into {}", written, config.connection.display());
            surface_stop(stop).context("Partial batch loaded")
        }
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            println!("Total:     {}", db::count_books(&conn)?);
            for c in db::count_by_rating(&conn)? {
                println!("  {:<6} {}", c.rating, c.count);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_extraction(config: &PipelineConfig) -> anyhow::Result<Extraction> {
    let fetcher = HttpPageFetcher::new(&config.fetch)?;
    info!(
        "Extracting up to {} books from at most {} pages",
        config.target_count, config.page_ceiling
    );
    let extraction =
        extraction::extract(&fetcher, config.target_count, config.page_ceiling).await?;
    Ok(extraction)
}

/// A fetch failure fails the command, even after the partial batch was kept.
fn surface_stop(stop: StopReason) -> anyhow::Result<()> {
    match stop {
        StopReason::FetchFailed(e) => {
            let page = e.page();
            Err(anyhow::Error::new(e).context(format!("Extraction stopped early at page {}", page)))
        }
        StopReason::TargetReached | StopReason::PageCeiling | StopReason::EndOfCatalog { .. } => {
            Ok(())
        }
    }
}

fn load_batch(conn: &rusqlite::Connection, batch: &StagedBatch) -> anyhow::Result<usize> {
    info!(
        "Loading {} books staged at {} (target {})",
        batch.records.len(),
        batch.staged_at.to_rfc3339(),
        batch.target_count
    );

    let pb = ProgressBar::new(batch.records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let written = db::load(conn, pb.wrap_iter(batch.records.iter()));
    pb.finish_and_clear();
    Ok(written?)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;

    #[test]
    fn fetch_failure_fails_the_command() {
        let err = surface_stop(StopReason::FetchFailed(FetchError::from_status(2, 500)))
            .context("Partial batch loaded")
            .unwrap_err();

        let chain: Vec<String> = err.chain().map(|c| c.to_string()).collect();
        assert_eq!(
            chain,
            vec![
                "Partial batch loaded",
                "Extraction stopped early at page 2",
                "page 2 returned HTTP 500",
            ]
        );
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::Status { page: 2, status: 500 })
        ));
    }

    #[test]
    fn normal_stops_succeed() {
        assert!(surface_stop(StopReason::TargetReached).is_ok());
        assert!(surface_stop(StopReason::PageCeiling).is_ok());
        assert!(surface_stop(StopReason::EndOfCatalog { page: 51 }).is_ok());
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
