//! aggvault CLI — download daily aggTrades archives into the partition store.
//!
//! Commands:
//! - `download` — fetch archives for (symbols × date range) and commit partitions
//! - `status` — report committed partition counts and date coverage per symbol
//!
//! The core scheduler is invoked with already-parsed parameters; everything
//! here is argument handling and presentation.

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aggvault_core::{
    run_ingestion, CancelToken, HttpArchiveSource, IngestConfig, IngestRequest, MarketType,
    NoopMetadata, OverwritePolicy, PartitionStore, RunReport, StdoutProgress,
};

#[derive(Parser)]
#[command(name = "aggvault", about = "aggvault CLI — historical aggTrades ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily archives and commit them as partitions.
    Download {
        /// Trading pairs, comma-separated (e.g. BTCUSDT,ETHUSDT).
        #[arg(long, short = 's', required = true, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Start date, inclusive (YYYY-MM-DD or YYYYMMDD).
        #[arg(long)]
        start_date: String,

        /// End date, inclusive (YYYY-MM-DD or YYYYMMDD).
        #[arg(long)]
        end_date: String,

        /// Market type: spot or futures.
        #[arg(long, short = 'm', default_value = "spot")]
        market_type: String,

        /// Partition store root directory.
        #[arg(long, short = 'd', default_value = "data")]
        data_dir: PathBuf,

        /// Keep already-committed partitions instead of re-downloading them.
        #[arg(long, default_value_t = false)]
        no_override: bool,

        /// Worker pool size (1-16).
        #[arg(long, short = 't', default_value_t = 8)]
        workers: usize,

        /// Write the run report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Report committed partition coverage per symbol.
    Status {
        /// Trading pairs, comma-separated.
        #[arg(long, short = 's', required = true, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Market type: spot or futures.
        #[arg(long, short = 'm', default_value = "spot")]
        market_type: String,

        /// Partition store root directory.
        #[arg(long, short = 'd', default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Download {
            symbols,
            start_date,
            end_date,
            market_type,
            data_dir,
            no_override,
            workers,
            report,
        } => run_download(
            symbols, &start_date, &end_date, &market_type, data_dir, no_override, workers, report,
        ),
        Commands::Status {
            symbols,
            market_type,
            data_dir,
        } => run_status(symbols, &market_type, &data_dir),
    }
}

/// Accepts `YYYY-MM-DD` and the compact `YYYYMMDD`.
fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map_err(|_| anyhow!("invalid date {value:?} (expected YYYY-MM-DD or YYYYMMDD)"))
}

#[allow(clippy::too_many_arguments)]
fn run_download(
    symbols: Vec<String>,
    start_date: &str,
    end_date: &str,
    market_type: &str,
    data_dir: PathBuf,
    no_override: bool,
    workers: usize,
    report_path: Option<PathBuf>,
) -> Result<()> {
    if !(1..=16).contains(&workers) {
        bail!("--workers must be between 1 and 16");
    }
    let market: MarketType = market_type.parse().map_err(|e: String| anyhow!(e))?;
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    if end < start {
        bail!("end date must not be before start date");
    }

    let request = IngestRequest {
        market,
        symbols,
        start,
        end,
        policy: if no_override {
            OverwritePolicy::SkipIfExists
        } else {
            OverwritePolicy::Overwrite
        },
    };
    let config = IngestConfig {
        workers,
        ..IngestConfig::default()
    };

    let source = HttpArchiveSource::new(&config);
    let store = PartitionStore::new(&data_dir);
    let cancel = CancelToken::new();

    let report = run_ingestion(
        &request,
        &source,
        &store,
        &NoopMetadata,
        &config,
        &cancel,
        &StdoutProgress,
    )?;

    if let Some(path) = report_path {
        std::fs::write(&path, serde_json::to_string_pretty(&report_artifact(&report))?)?;
        println!("Report written to {}", path.display());
    }

    if !report.all_succeeded() {
        eprintln!("\nFailed tasks:");
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.task, failure.cause);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn report_artifact(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "total": report.total,
        "committed": report.committed,
        "skipped_already_present": report.skipped_exists,
        "skipped_not_found_upstream": report.skipped_not_found,
        "failed": report.failed(),
        "failures": report
            .failures
            .iter()
            .map(|f| serde_json::json!({
                "market_type": f.task.market.to_string(),
                "symbol": f.task.symbol,
                "date": f.task.date.to_string(),
                "cause": f.cause.to_string(),
            }))
            .collect::<Vec<_>>(),
    })
}

fn run_status(symbols: Vec<String>, market_type: &str, data_dir: &PathBuf) -> Result<()> {
    let market: MarketType = market_type.parse().map_err(|e: String| anyhow!(e))?;
    let store = PartitionStore::new(data_dir);

    for symbol in symbols {
        let symbol = symbol.trim().to_ascii_uppercase();
        let dates = store.committed_dates(market, &symbol)?;
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => {
                println!("{symbol}: {} partitions, {first} .. {last}", dates.len())
            }
            _ => println!("{symbol}: no committed partitions"),
        }
    }
    Ok(())
}
