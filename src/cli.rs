//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_nav_store::{CsvNavStore, NAV_FILE};
use crate::adapters::file_artifact_adapter::FileArtifactAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backfill::{self, RunInput, RunOutcome, RunStatus};
use crate::domain::benchmark::BenchmarkSeries;
use crate::domain::classifier::classify;
use crate::domain::config_validation::{
    validate_data_config, validate_rules_config, validate_run_config,
};
use crate::domain::error::ZooIndexError;
use crate::domain::membership::Variant;
use crate::domain::merge::{MergeMode, SnapshotPolicy};
use crate::domain::nav::DayComputation;
use crate::domain::price::PriceTable;
use crate::domain::rules::{union_preserving_order, RuleConfig, BEIJING_EXCHANGE, DEFAULT_EXCHANGES};
use crate::domain::run_config::{parse_date, RunConfig, RunParams};
use crate::domain::universe::Universe;
use crate::ports::artifact_port::ArtifactPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::nav_store_port::NavStorePort;

#[derive(Parser, Debug)]
#[command(name = "zooindex", about = "Zoo-themed equal-weight index builder")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the index for a day or a backfill window and merge it into
    /// the stored series
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Trading day to update (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Backfill the last N trading days
        #[arg(long)]
        days: Option<u32>,
        /// Backfill the last N years
        #[arg(long)]
        years: Option<u32>,
        /// incremental | full
        #[arg(long)]
        mode: Option<MergeMode>,
        /// Write holdings for every computed day, not just the last
        #[arg(long)]
        all_snapshots: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print both memberships as of a date
    Classify {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run {
            config,
            date,
            start,
            end,
            days,
            years,
            mode,
            all_snapshots,
        } => {
            let overrides = RunParams {
                date,
                start,
                end,
                days,
                years,
                mode: mode.unwrap_or_default(),
                snapshots: if all_snapshots {
                    SnapshotPolicy::EveryDay
                } else {
                    SnapshotPolicy::FinalDateOnly
                },
            };
            run_index(&config, overrides, mode.is_some())
        }
        Command::Validate { config } => run_validate(&config),
        Command::Classify { config, date } => run_classify(&config, date),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ZooIndexError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Reads `[rules]` into a validated [`RuleConfig`].
pub fn build_rule_config(adapter: &dyn ConfigPort) -> Result<RuleConfig, ZooIndexError> {
    validate_rules_config(adapter)?;

    let strict_keywords = adapter.get_list("rules", "strict_keywords");
    let mut extended_keywords = adapter.get_list("rules", "extended_keywords");
    if adapter.get_bool("rules", "merge_strict_into_extended", true) {
        extended_keywords =
            union_preserving_order(&strict_keywords, extended_keywords.iter().map(String::as_str));
    }

    let listed = adapter.get_list("rules", "exchanges");
    let mut exchanges: Vec<String> = if listed.is_empty() {
        DEFAULT_EXCHANGES.iter().map(|s| s.to_string()).collect()
    } else {
        listed.iter().map(|s| s.to_uppercase()).collect()
    };
    if adapter.get_bool("rules", "allow_beijing", false) {
        exchanges.push(BEIJING_EXCHANGE.to_string());
    }

    let config = RuleConfig {
        strict_keywords,
        extended_keywords,
        exclude_patterns: adapter.get_list("rules", "exclude_patterns"),
        force_include: adapter.get_list("rules", "force_include"),
        force_exclude: adapter.get_list("rules", "force_exclude"),
        exclude_st: adapter.get_bool("rules", "exclude_st", true),
        exchanges: exchanges.into_iter().collect(),
    };
    config.validate()?;
    Ok(config)
}

/// Reads `[run]` into raw parameters. Unset keys stay `None`.
pub fn build_run_params(adapter: &dyn ConfigPort) -> Result<RunParams, ZooIndexError> {
    validate_run_config(adapter)?;

    let date = |key: &str| {
        adapter
            .get_string("run", key)
            .and_then(|s| parse_date(&s))
    };
    let count = |key: &str| {
        adapter
            .get_string("run", key)
            .and_then(|s| s.trim().parse::<u32>().ok())
    };

    Ok(RunParams {
        date: date("date"),
        start: date("start_date"),
        end: date("end_date"),
        days: count("backfill_days"),
        years: count("backfill_years"),
        mode: adapter
            .get_string("run", "mode")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        snapshots: adapter
            .get_string("run", "snapshots")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
    })
}

/// Command-line values win over the config file. A window given on the
/// command line replaces the configured window entirely.
pub fn merge_run_params(file: RunParams, cli: RunParams, cli_mode: bool) -> RunParams {
    let cli_window = cli.date.is_some()
        || cli.start.is_some()
        || cli.end.is_some()
        || cli.days.is_some()
        || cli.years.is_some();
    let window = if cli_window { &cli } else { &file };
    RunParams {
        date: window.date,
        start: window.start,
        end: window.end,
        days: window.days,
        years: window.years,
        mode: if cli_mode { cli.mode } else { file.mode },
        snapshots: if cli.snapshots == SnapshotPolicy::EveryDay {
            SnapshotPolicy::EveryDay
        } else {
            file.snapshots
        },
    }
}

pub fn open_market_data(adapter: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, ZooIndexError> {
    validate_data_config(adapter)?;
    let source = adapter
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());

    match source.trim().to_lowercase().as_str() {
        "sqlite" => open_sqlite(adapter),
        _ => {
            let path = adapter.get_string("data", "path").unwrap_or_default();
            Ok(Box::new(CsvAdapter::new(PathBuf::from(path.trim()))))
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(adapter: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, ZooIndexError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(SqliteAdapter::from_config(adapter)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_adapter: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, ZooIndexError> {
    Err(ZooIndexError::ConfigInvalid {
        section: "data".into(),
        key: "source".into(),
        reason: "built without the sqlite feature".into(),
    })
}

pub fn output_dir(adapter: &dyn ConfigPort) -> PathBuf {
    adapter
        .get_string("output", "dir")
        .map(|s| PathBuf::from(s.trim()))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn run_index(config_path: &Path, cli_params: RunParams, cli_mode: bool) -> Result<(), ZooIndexError> {
    // Stage 1: Load and validate config
    let adapter = load_config(config_path)?;
    let rules = build_rule_config(&adapter)?;
    let params = merge_run_params(build_run_params(&adapter)?, cli_params, cli_mode);
    let run_config = params.resolve(today())?;

    // Stage 2: Wire ports
    let data_port = open_market_data(&adapter)?;
    let out = output_dir(&adapter);
    let store = CsvNavStore::new(out.join(NAV_FILE));
    let artifacts = FileArtifactAdapter::new(out.clone());

    // Stages 3-6: Load, compute, merge, write
    match run_index_pipeline(data_port.as_ref(), &store, &artifacts, &rules, &run_config)? {
        RunStatus::NonTradingDay(date) => {
            eprintln!("{date} is not a trading day; nothing to do");
        }
        RunStatus::Completed(outcome) => {
            print_summary(&outcome);
            eprintln!("\nOutput written to: {}", out.display());
        }
    }
    Ok(())
}

/// Loads inputs through the ports, runs the index and persists the results.
pub fn run_index_pipeline(
    data_port: &dyn MarketDataPort,
    store: &dyn NavStorePort,
    artifacts: &dyn ArtifactPort,
    rules: &RuleConfig,
    run_config: &RunConfig,
) -> Result<RunStatus, ZooIndexError> {
    // Stage 3: Market data
    let window = run_config.window;
    let lookback = window.lookback_start();
    let universe = load_universe(data_port)?;
    let calendar = data_port.trading_calendar(lookback, window.end())?;
    if calendar.is_empty() {
        return Err(ZooIndexError::NoData {
            what: format!("trading calendar {lookback}..={}", window.end()),
        });
    }
    let prices = PriceTable::from_rows(data_port.closes(lookback, window.end())?);
    eprintln!(
        "Loaded {} securities, {} sessions, {} closes",
        universe.count(),
        calendar.len(),
        prices.len()
    );

    // Stage 4: Existing series and the benchmark since their base date
    let existing = store.load()?;
    let base = existing
        .rows()
        .map(|r| r.date)
        .min()
        .map_or(lookback, |head| head.min(lookback));
    let benchmark = BenchmarkSeries::new(data_port.benchmark_closes(base, window.end())?);
    if !benchmark.is_empty() {
        eprintln!("Loaded {} benchmark closes from {base}", benchmark.len());
    }

    // Stage 5: Compute and merge
    let status = backfill::run(
        RunInput {
            universe: &universe,
            calendar: &calendar,
            prices: &prices,
            rules,
            existing: &existing,
            benchmark: &benchmark,
        },
        run_config,
    )?;

    // Stage 6: Persist
    if let RunStatus::Completed(outcome) = &status {
        store.save(&outcome.book)?;
        write_artifacts(artifacts, outcome)?;
    }
    Ok(status)
}

fn load_universe(data_port: &dyn MarketDataPort) -> Result<Universe, ZooIndexError> {
    let securities = data_port.securities()?;
    if securities.is_empty() {
        return Err(ZooIndexError::NoData {
            what: "security list is empty".into(),
        });
    }
    Universe::new(securities).map_err(|e| ZooIndexError::Database {
        reason: e.to_string(),
    })
}

fn write_artifacts(artifacts: &dyn ArtifactPort, outcome: &RunOutcome) -> Result<(), ZooIndexError> {
    for classification in &outcome.classifications {
        artifacts.write_constituents(classification)?;
    }
    for summary in &outcome.changes {
        artifacts.write_changes(summary)?;
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<&DayComputation>> = BTreeMap::new();
    for day in &outcome.holdings {
        by_date.entry(day.date).or_default().push(day);
    }
    for (date, days) in &by_date {
        artifacts.write_holdings(*date, days)?;
    }

    if let Some(latest) = &outcome.latest {
        artifacts.write_latest(latest)?;
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    let (Some(first), Some(last)) = (outcome.sessions.first(), outcome.sessions.last()) else {
        return;
    };
    eprintln!("\n=== Run Summary ===");
    eprintln!("Sessions:         {} ({} to {})", outcome.sessions.len(), first, last);
    for variant in Variant::ALL {
        if let Some(row) = outcome.book.series(variant).last() {
            eprintln!(
                "{:<17} {:.4} ({:+.2}%, {} constituents)",
                format!("{}:", capitalize(variant.as_str())),
                row.level,
                row.daily_return * 100.0,
                row.constituent_count
            );
        }
    }
    if let Some(tracked) = outcome.latest.and_then(|l| l.benchmark) {
        eprintln!(
            "{:<17} {:.4} ({:+.2}%)",
            "Benchmark:",
            tracked.level,
            tracked.daily_return * 100.0
        );
    }

    let diagnostics = &outcome.diagnostics;
    if diagnostics.missing_name_count() > 0 {
        eprintln!(
            "warning: {} securities had no as-of name and were skipped",
            diagnostics.missing_name_count()
        );
    }
    for (date, variant) in &diagnostics.zero_constituent_days {
        eprintln!("warning: {date} {variant}: no priced constituents, return set to 0");
    }
    for (date, variant) in &diagnostics.dropped_dates {
        eprintln!("warning: {date} {variant}: stored row removed by full recompute");
    }
    for summary in &outcome.changes {
        for (variant, noise) in &summary.suspected_noise {
            for entry in noise {
                eprintln!(
                    "  suspected noise {} {}: {} {} (keyword {})",
                    summary.date, variant, entry.code, entry.name, entry.keyword
                );
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn run_validate(config_path: &Path) -> Result<(), ZooIndexError> {
    let adapter = load_config(config_path)?;

    let rules = build_rule_config(&adapter)?;
    eprintln!("\nRules:");
    eprintln!("  strict keywords:   {}", rules.strict_keywords.join(", "));
    eprintln!("  extended keywords: {}", rules.extended_keywords.join(", "));
    eprintln!("  exclude patterns:  {}", rules.exclude_patterns.join(", "));
    eprintln!(
        "  force include/exclude: {}/{}",
        rules.force_include.len(),
        rules.force_exclude.len()
    );
    eprintln!("  exclude ST:        {}", rules.exclude_st);
    eprintln!(
        "  exchanges:         {}",
        rules.exchanges.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    let run_config = build_run_params(&adapter)?.resolve(today())?;
    eprintln!("\nRun:");
    eprintln!("  window: {:?}", run_config.window);
    eprintln!("  mode:   {:?}", run_config.mode);

    validate_data_config(&adapter)?;
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_classify(config_path: &Path, date: Option<NaiveDate>) -> Result<(), ZooIndexError> {
    let adapter = load_config(config_path)?;
    let rules = build_rule_config(&adapter)?;
    let data_port = open_market_data(&adapter)?;
    let as_of = date.unwrap_or_else(today);

    let universe = load_universe(data_port.as_ref())?;
    let classification = classify(&universe, as_of, &rules);

    for variant in Variant::ALL {
        let snapshot = classification.snapshot(variant);
        println!("[{variant}] {} constituents as of {as_of}", snapshot.len());
        for c in snapshot.iter() {
            let flag = if c.ambiguous { "  (ambiguous)" } else { "" };
            println!("  {}  {}  {}{}", c.code, c.name, c.matched.label(), flag);
        }
    }

    let diagnostics = &classification.diagnostics;
    eprintln!(
        "{} unlisted, {} without an as-of name",
        diagnostics.not_listed.len(),
        diagnostics.missing_names.len()
    );
    Ok(())
}
