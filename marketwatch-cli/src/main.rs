//! marketwatch CLI: reconcile stored price series against upstream sources.
//!
//! Commands:
//! - `reconcile`: find gaps in the lookback window and backfill them
//! - `gaps`: list the gaps without contacting upstream
//! - `latest`: fetch the most recent candle for a symbol
//! - `indicators`: RSI / MA / MACD / Bollinger summary from stored closes
//! - `instruments`: list registered instruments and their extraction status

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use marketwatch_core::config::{InstrumentConfig, JobConfig, PolicyKind};
use marketwatch_core::domain::{AssetCategory, Interval};
use marketwatch_core::indicators::{daily_closes, IndicatorSnapshot};
use marketwatch_core::reconcile::{
    plan_gaps, reconcile_all, ReconcileRequest, ThreadSleeper, TracingProgress,
};
use marketwatch_core::storage::{InstrumentStore, ObservationStore, SqliteStore};
use marketwatch_core::upstream::{
    BinanceSource, CircuitBreaker, CoinbaseSource, SourceKind, UpstreamSource,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marketwatch",
    about = "marketwatch: keep stored price series free of gaps"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write plain-text logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find gaps in the window and backfill them from upstream.
    Reconcile {
        #[command(flatten)]
        job: JobArgs,
    },
    /// List gaps in the window without contacting upstream.
    Gaps {
        #[command(flatten)]
        job: JobArgs,

        /// Print ranges as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch the most recent candle for a symbol.
    Latest {
        /// Pair symbol (e.g., BTC-EUR).
        symbol: String,

        /// Upstream source: coinbase or binance.
        #[arg(long, default_value = "coinbase")]
        source: SourceKind,

        /// Candle interval (e.g., 1h, 1d).
        #[arg(long, default_value = "1h")]
        interval: Interval,
    },
    /// Indicator summary computed from stored closes.
    Indicators {
        /// Instrument symbol as registered.
        symbol: String,

        /// SQLite database path.
        #[arg(long, default_value = "marketwatch.db")]
        db: PathBuf,

        /// Days of history to load.
        #[arg(long, default_value_t = 400)]
        days: i64,

        /// Resample to one close per UTC day before computing.
        #[arg(long, default_value_t = false)]
        daily: bool,
    },
    /// List registered instruments.
    Instruments {
        /// SQLite database path.
        #[arg(long, default_value = "marketwatch.db")]
        db: PathBuf,

        /// Only this category: STOCK, ETF or CRYPTO.
        #[arg(long)]
        category: Option<AssetCategory>,
    },
}

/// Options shared by `reconcile` and `gaps`. Flags override the config file.
#[derive(Args)]
struct JobArgs {
    /// Path to a TOML job file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Symbols to reconcile (replaces the instruments of the job file).
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Category for --symbol instruments.
    #[arg(long, default_value = "CRYPTO")]
    category: AssetCategory,

    /// Interval for --symbol instruments.
    #[arg(long, default_value = "1h")]
    interval: Interval,

    /// Upstream source: coinbase or binance.
    #[arg(long)]
    source: Option<SourceKind>,

    /// Window length ending now, in hours.
    #[arg(long)]
    lookback_hours: Option<i64>,

    /// Window start (RFC 3339). Overrides --lookback-hours.
    #[arg(long)]
    start: Option<String>,

    /// Window end (RFC 3339). Defaults to now.
    #[arg(long)]
    end: Option<String>,

    /// Use paginated backfill instead of single-slot polling.
    #[arg(long, default_value_t = false)]
    paginated: bool,

    /// Fetch attempts per range (or per page when paginated).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Pause between attempts, in seconds.
    #[arg(long)]
    retry_delay_secs: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Reconcile { job } => run_reconcile(&job),
        Commands::Gaps { job, json } => run_gaps(&job, json),
        Commands::Latest {
            symbol,
            source,
            interval,
        } => run_latest(&symbol, source, interval),
        Commands::Indicators {
            symbol,
            db,
            days,
            daily,
        } => run_indicators(&symbol, &db, days, daily),
        Commands::Instruments { db, category } => run_instruments(&db, category),
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Job file (or defaults) with command-line overrides applied.
fn resolve_job(args: &JobArgs) -> Result<JobConfig> {
    let mut job = match &args.config {
        Some(path) => JobConfig::from_file(path)?,
        None => JobConfig::default(),
    };

    if let Some(db) = &args.db {
        job.database = db.clone();
    }
    if !args.symbols.is_empty() {
        job.instruments = args
            .symbols
            .iter()
            .map(|s| InstrumentConfig::new(s.clone(), args.category, args.interval))
            .collect();
    }
    if let Some(source) = args.source {
        job.source.kind = source;
    }
    if let Some(hours) = args.lookback_hours {
        job.lookback_hours = hours;
    }
    if args.paginated {
        job.policy.kind = PolicyKind::PaginatedBackfill;
    }
    if let Some(n) = args.max_attempts {
        job.policy.max_attempts = n;
    }
    if let Some(secs) = args.retry_delay_secs {
        job.policy.retry_delay_secs = secs;
    }
    job.validate()?;

    if job.instruments.is_empty() {
        bail!("no instruments: pass --symbol or list [[instruments]] in the job file");
    }
    Ok(job)
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp '{s}' (expected RFC 3339)"))?
        .with_timezone(&Utc))
}

/// Register every job instrument and build its request.
/// `register` creates missing instruments; otherwise unknown symbols are
/// reported and skipped.
fn build_requests(
    job: &JobConfig,
    args: &JobArgs,
    store: &SqliteStore,
    register: bool,
) -> Result<Vec<ReconcileRequest>> {
    let now = match &args.end {
        Some(end) => parse_instant(end)?,
        None => Utc::now(),
    };
    let start = args.start.as_deref().map(parse_instant).transpose()?;

    let mut requests = Vec::with_capacity(job.instruments.len());
    for instrument in &job.instruments {
        let id = if register {
            let registered = store
                .get_or_create_instrument(&instrument.symbol, instrument.category)
                .with_context(|| format!("register {}", instrument.symbol))?;
            registered.id
        } else {
            match store
                .find_instrument(&instrument.symbol)
                .with_context(|| format!("look up {}", instrument.symbol))?
            {
                Some(found) => found.id,
                None => {
                    eprintln!("Unknown instrument {}: not registered", instrument.symbol);
                    continue;
                }
            }
        };
        let mut request = job.request_for(id, instrument, now);
        if let Some(start) = start {
            request.window_start = start;
        }
        requests.push(request);
    }
    Ok(requests)
}

fn build_source(kind: SourceKind) -> Result<Box<dyn UpstreamSource>> {
    let breaker = Arc::new(CircuitBreaker::default_upstream());
    Ok(match kind {
        SourceKind::Coinbase => Box::new(CoinbaseSource::new(breaker)?),
        SourceKind::Binance => Box::new(BinanceSource::new(breaker)?),
    })
}

fn run_reconcile(args: &JobArgs) -> Result<()> {
    let job = resolve_job(args)?;
    let store = SqliteStore::open(&job.database)?;
    let requests = build_requests(&job, args, &store, true)?;
    let source = build_source(job.source.kind)?;
    tracing::info!(
        database = %job.database.display(),
        upstream = %job.source.kind,
        policy = ?job.policy.kind,
        instruments = requests.len(),
        "starting reconciliation"
    );

    let summary = reconcile_all(
        &store,
        source.as_ref(),
        &requests,
        &ThreadSleeper,
        &TracingProgress,
    );

    println!(
        "Reconciled {}/{} instruments completely, {} partial, {} failed",
        summary.complete,
        summary.total,
        summary.partial,
        summary.failed()
    );
    for report in summary.reports.iter().filter(|r| !r.is_complete()) {
        for range in &report.unresolved {
            println!("  unresolved: {range}");
        }
    }
    for symbol in &summary.skipped {
        println!("  skipped: {symbol}");
    }
    for (symbol, err) in &summary.status_errors {
        eprintln!("Could not record extraction status for {symbol}: {err}");
    }
    if summary.all_complete() {
        println!("No gaps remain");
    }

    if summary.has_storage_failures() {
        for (symbol, err) in &summary.errors {
            eprintln!("Error for {symbol}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_gaps(args: &JobArgs, json: bool) -> Result<()> {
    let job = resolve_job(args)?;
    let store = SqliteStore::open(&job.database)?;
    let requests = build_requests(&job, args, &store, false)?;

    let mut all = Vec::new();
    for request in &requests {
        let gaps = plan_gaps(&store, request)?;
        if !json {
            let slots: usize = gaps.iter().map(|g| g.slot_count(request.interval)).sum();
            println!(
                "{} ({}): {} gap(s), {} missing slot(s)",
                request.symbol,
                request.interval,
                gaps.len(),
                slots
            );
            for gap in &gaps {
                println!("  {gap}");
            }
        }
        all.extend(gaps);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
    }
    Ok(())
}

fn run_latest(symbol: &str, kind: SourceKind, interval: Interval) -> Result<()> {
    let source = build_source(kind)?;
    match source.fetch_latest(symbol, interval)? {
        Some(candle) => println!("{}", serde_json::to_string_pretty(&candle)?),
        None => println!("No {interval} candle available for {symbol} on {kind}"),
    }
    Ok(())
}

fn run_indicators(symbol: &str, db: &Path, days: i64, daily: bool) -> Result<()> {
    let store = SqliteStore::open(db)?;
    let Some(instrument) = store.find_instrument(symbol)? else {
        bail!("unknown instrument '{symbol}'");
    };

    let end = Utc::now();
    let start = end - chrono::Duration::days(days);
    let observations = store.load_observations(instrument.id, start, end)?;

    let closes: Vec<f64> = if daily {
        daily_closes(&observations).into_iter().map(|(_, c)| c).collect()
    } else {
        observations.iter().map(|o| o.close_or_price()).collect()
    };

    match IndicatorSnapshot::latest(&closes) {
        Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        None => println!("No stored observations for {symbol} in the last {days} days"),
    }
    Ok(())
}

fn run_instruments(db: &Path, category: Option<AssetCategory>) -> Result<()> {
    let store = SqliteStore::open(db)?;
    let instruments = store.list_instruments(category)?;
    if instruments.is_empty() {
        println!("No instruments registered in {}", db.display());
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:<8} {:<10} {:<20} {:<20}",
        "Id", "Symbol", "Category", "Status", "First", "Last"
    );
    println!("{}", "-".repeat(80));
    for instrument in &instruments {
        let record = store.extraction(instrument.id)?;
        let (status, first, last) = match &record {
            Some(r) => (
                r.status.to_string(),
                r.date_min.map(|d| d.to_rfc3339()).unwrap_or_default(),
                r.date_max.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ),
            None => ("-".to_string(), String::new(), String::new()),
        };
        println!(
            "{:<6} {:<12} {:<8} {:<10} {:<20} {:<20}",
            instrument.id, instrument.symbol, instrument.category, status, first, last
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_args(argv: &[&str]) -> JobArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Gaps { job, .. } | Commands::Reconcile { job } => job,
            _ => panic!("expected a job command"),
        }
    }

    #[test]
    fn gaps_does_not_register_unknown_symbols() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .get_or_create_instrument("BTC-EUR", AssetCategory::Crypto)
            .unwrap();
        let args = job_args(&[
            "marketwatch",
            "gaps",
            "--symbol",
            "BTC-EUR",
            "--symbol",
            "BTCC-EUR",
            "--end",
            "2024-01-01T05:00:00Z",
        ]);
        let job = resolve_job(&args).unwrap();

        let requests = build_requests(&job, &args, &store, false).unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].symbol, "BTC-EUR");
        assert!(store.find_instrument("BTCC-EUR").unwrap().is_none());
    }

    #[test]
    fn reconcile_registers_new_symbols() {
        let store = SqliteStore::open_in_memory().unwrap();
        let args = job_args(&["marketwatch", "reconcile", "--symbol", "ETH-EUR"]);
        let job = resolve_job(&args).unwrap();

        let requests = build_requests(&job, &args, &store, true).unwrap();

        assert_eq!(requests.len(), 1);
        assert!(store.find_instrument("ETH-EUR").unwrap().is_some());
    }
}
