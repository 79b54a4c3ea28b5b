mod config;
mod db;
mod dedup;
mod email;
mod error;
mod fields;
mod ledger;
mod logging;
mod message;
mod models;
mod pipeline;
mod sheets;
mod store;
mod summary;
mod urls;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use config::{SourceLocator, StoreLocator};
use db::SqliteStore;
use email::{
    DirSource, EmailConfig, GmailSource, ImapSource, MailQuery, MailSource, UnavailableSource,
};
use error::HuntError;
use ledger::SeenLedger;
use pipeline::{IngestSettings, Ingester, RunReport};
use sheets::SheetsStore;
use store::{MemoryStore, TabularStore};
use urls::UrlRules;

#[derive(Parser)]
#[command(name = "hunt")]
#[command(about = "Job-alert email ingestion - extract, dedupe, and track postings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Tabular store: sqlite:<path> or sheets:<spreadsheet-id>
    #[arg(long, env = "HUNT_STORE", global = true)]
    store: Option<String>,

    /// Spreadsheet id, used when no --store is given
    #[arg(long, env = "SHEET_ID", global = true, hide = true)]
    sheet_id: Option<String>,

    /// OAuth bearer token for the Gmail and Sheets APIs
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    /// Seen-ids ledger (JSON array of message ids)
    #[arg(long, env = "HUNT_SEEN_FILE", global = true)]
    seen_file: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, env = "HUNT_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Debug-level logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    ingest: IngestArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch candidate emails and append new job rows (the default)
    Ingest,

    /// Show row, ATS and per-source counts for every partition
    Summary,

    /// Show the seen-ids ledger
    Seen,
}

#[derive(Args, Debug, Clone)]
struct IngestArgs {
    /// Email source: imap:<user>, gmail:<user> or dir:<path>
    #[arg(long, env = "HUNT_SOURCE", global = true)]
    source: Option<String>,

    /// Label (folder) holding job alerts
    #[arg(long, env = "HUNT_LABEL", default_value = config::DEFAULT_LABEL, global = true)]
    label: String,

    /// Number of days to look back
    #[arg(short, long, default_value_t = config::DEFAULT_DAYS, global = true)]
    days: u32,

    /// Maximum messages inspected per run
    #[arg(long, default_value_t = config::DEFAULT_MAX_RESULTS, global = true)]
    max_results: usize,

    /// Minimum subject length for messages without a URL
    #[arg(long, default_value_t = config::DEFAULT_MIN_SUBJECT_LEN, global = true)]
    min_subject_len: usize,

    /// JSON file overriding the deny / score / ATS / strip-param tables
    #[arg(long, env = "HUNT_RULES", global = true)]
    rules: Option<PathBuf>,

    #[arg(long, default_value = "imap.gmail.com", global = true)]
    imap_server: String,

    #[arg(long, default_value_t = 993, global = true)]
    imap_port: u16,

    /// Path to app password file
    #[arg(long, default_value = "~/.gmail.app_password.txt", global = true)]
    password_file: String,

    /// Dry run - process and report without writing rows or remembering ids
    #[arg(long, global = true)]
    dry_run: bool,
}

fn open_store(locator: &StoreLocator, token: Option<&str>) -> Result<Box<dyn TabularStore>> {
    match locator {
        StoreLocator::Sqlite(path) => {
            let store = SqliteStore::open(path)?;
            info!(path = %store.path().display(), "using SQLite store");
            Ok(Box::new(store))
        }
        StoreLocator::Sheets(id) => {
            let token = token.ok_or(HuntError::MissingToken {
                what: "Google Sheets store",
            })?;
            info!(spreadsheet = %id, "using Google Sheets store");
            Ok(Box::new(SheetsStore::new(id, token)?))
        }
    }
}

fn open_source(
    locator: &SourceLocator,
    args: &IngestArgs,
    token: Option<&str>,
) -> Result<Box<dyn MailSource>> {
    match locator {
        SourceLocator::Imap { username } => {
            let password_path = config::expand_home(&args.password_file);
            let config = EmailConfig::from_password_file(
                &args.imap_server,
                args.imap_port,
                username,
                &password_path,
            )?;
            Ok(Box::new(ImapSource::connect(&config)?))
        }
        SourceLocator::Gmail { user } => {
            let token = token.ok_or(HuntError::MissingToken { what: "Gmail source" })?;
            Ok(Box::new(GmailSource::new(user, token)?))
        }
        SourceLocator::Dir(dir) => Ok(Box::new(DirSource::new(dir))),
    }
}

fn seen_path(cli: &Cli) -> PathBuf {
    cli.seen_file
        .clone()
        .unwrap_or_else(config::default_seen_file)
}

fn run_ingest(cli: &Cli) -> Result<()> {
    let args = &cli.ingest;

    // every configuration problem surfaces before any I/O
    let store_locator = config::resolve_store(cli.store.as_deref(), cli.sheet_id.as_deref())?;
    let source_locator = config::resolve_source(args.source.as_deref())?;
    let rules = match &args.rules {
        Some(path) => UrlRules::from_file(path)?,
        None => UrlRules::default(),
    };
    let token = cli.access_token.as_deref().map(str::trim).filter(|t| !t.is_empty());

    let mut real_store = open_store(&store_locator, token)?;
    let mut snapshot;
    let store: &mut dyn TabularStore = if args.dry_run {
        snapshot = MemoryStore::snapshot_of(real_store.as_mut())
            .context("Failed to snapshot store for dry run")?;
        &mut snapshot
    } else {
        real_store.as_mut()
    };

    let mut ledger = SeenLedger::load(seen_path(cli));
    if args.dry_run {
        ledger = ledger.read_only();
    }
    info!(path = %ledger.path().display(), ids = ledger.len(), "loaded seen-ids ledger");

    // an unreachable server still lets the run prepare partitions and report
    let mut source = match open_source(&source_locator, args, token) {
        Ok(source) => source,
        Err(e) if is_config_error(&e) => return Err(e),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "could not open mail source");
            Box::new(UnavailableSource::new(format!("{:#}", e)))
        }
    };

    println!("Searching {} for job alerts from the last {} days...", args.label, args.days);
    let settings = IngestSettings {
        query: MailQuery {
            label: args.label.clone(),
            newer_than_days: args.days,
            max_results: args.max_results,
        },
        min_subject_len: args.min_subject_len,
    };
    let report = Ingester::new(&rules, settings).run(source.as_mut(), store, &mut ledger);
    print_report(&report, args.dry_run);
    Ok(())
}

fn print_report(report: &RunReport, dry_run: bool) {
    println!("\nResults:");
    if report.listing_failed {
        println!("  Mail source:  unavailable");
    }
    println!("  Candidates:   {}", report.candidates);
    println!("  Already seen: {}", report.already_seen);
    println!("  Inspected:    {}", report.inspected);
    println!("  Accepted:     {}", report.accepted);
    println!("  Duplicates:   {}", report.duplicates);
    if report.discarded > 0 {
        println!("  Discarded:    {}", report.discarded);
    }
    if report.failures() > 0 {
        println!("  Failed:       {}", report.failures());
    }

    println!("\nRows written:");
    for (partition, rows) in &report.written {
        println!("  {:<12} {}", partition, rows);
    }
    for partition in &report.failed_partitions {
        println!("  {:<12} FAILED", partition);
    }

    if dry_run {
        println!("\n(Dry run - no rows were written and no message ids were remembered)");
    }
}

fn run_summary(cli: &Cli) -> Result<()> {
    let locator = config::resolve_store(cli.store.as_deref(), cli.sheet_id.as_deref())?;
    let token = cli.access_token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let mut store = open_store(&locator, token)?;

    let summaries = summary::summarize(store.as_mut())?;
    if summaries.is_empty() {
        println!("No partitions found.");
        return Ok(());
    }

    println!("{:<12} {:>6} {:>6}  {}", "PARTITION", "ROWS", "ATS", "SOURCES");
    println!("{}", "-".repeat(60));
    for s in &summaries {
        let sources: Vec<String> = s
            .by_source
            .iter()
            .map(|(source, n)| format!("{}={}", source, n))
            .collect();
        println!("{:<12} {:>6} {:>6}  {}", s.name, s.rows, s.ats, sources.join(", "));
    }

    let comp = summary::comp_totals(&summaries);
    if !comp.is_empty() {
        println!("\nCompensation by currency:");
        println!("  {:<8} {:>12} {:>12} {:>12} {:>6}", "CURRENCY", "MIN", "MAX", "AVG", "COUNT");
        for (currency, stats) in &comp {
            println!(
                "  {:<8} {:>12.0} {:>12.0} {:>12.0} {:>6}",
                currency,
                stats.min,
                stats.max,
                stats.average().unwrap_or_default(),
                stats.count
            );
        }
    }

    let fit = summary::fit_totals(&summaries);
    if !fit.is_empty() {
        println!("\nAverage fit by source:");
        for (source, stats) in &fit {
            println!(
                "  {:<12} {:>6.2} ({} rows)",
                source,
                stats.average().unwrap_or_default(),
                stats.count
            );
        }
    }
    Ok(())
}

fn run_seen(cli: &Cli) -> Result<()> {
    let ledger = SeenLedger::load(seen_path(cli));
    println!("Ledger: {}", ledger.path().display());
    println!("Seen message ids: {}", ledger.len());
    Ok(())
}

fn is_config_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<HuntError>().is_some_and(HuntError::is_config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = logging::LogConfig {
        verbose: cli.verbose,
        log_file: cli.log_file.clone(),
    };
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("Warning: {:#}", e);
    }

    let result = match cli.command {
        None | Some(Commands::Ingest) => run_ingest(&cli),
        Some(Commands::Summary) => run_summary(&cli),
        Some(Commands::Seen) => run_seen(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
