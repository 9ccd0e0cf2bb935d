//! Ladder CLI
//!
//! Loads a catalog snapshot (`.json` or binary `LDRC`) and answers the
//! engine's read queries against it:
//! - `evaluate` / `rank`: records of a chart on a ladder
//! - `qualify`: records of a chart satisfying one filter
//! - `resolve`: chosen filters implying an implied filter
//! - `verify`: build the materialized index and diff it against the implication graph
//! - `ladders`, `convert`: catalog browsing and snapshot conversion

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use ladder_catalog::{
    ChartId, EntityStore, FilterId, GameId, LadderId, MemoryStore, RecordId,
};
use ladder_engine::{BatchReport, EngineConfig, LadderEngine, QualifyStrategy};
use roaring::RoaringBitmap;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "ladder")]
#[command(author, version, about = "Ladder filter evaluation over a catalog snapshot")]
struct Cli {
    /// Catalog snapshot (`.json`, otherwise binary).
    #[arg(short, long, global = true, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Records of a chart satisfying every rule filter of a ladder.
    Evaluate {
        #[arg(long)]
        chart: u32,
        #[arg(long)]
        ladder: u32,
        /// Show which rule filters were evaluated and how.
        #[arg(long)]
        trace: bool,
    },

    /// Ladder members of a chart in ranking order.
    Rank {
        #[arg(long)]
        chart: u32,
        #[arg(long)]
        ladder: u32,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Records of a chart satisfying one filter.
    Qualify {
        #[arg(long)]
        chart: u32,
        #[arg(long)]
        filter: u32,
        /// Override the configured strategy for implied filters.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Threshold for `--strategy adaptive`.
        #[arg(long, default_value_t = ladder_engine::config::DEFAULT_ADAPTIVE_THRESHOLD)]
        threshold: usize,
    },

    /// Chosen filters implying an implied filter.
    Resolve {
        #[arg(long)]
        filter: u32,
    },

    /// Build the materialized index from the catalog and check it against
    /// the implication graph (a self-check of the materializer).
    Verify {
        /// Recompute records that disagree.
        #[arg(long)]
        repair: bool,
    },

    /// Ladders of a game in display order.
    Ladders {
        #[arg(long)]
        game: u32,
    },

    /// Rewrite the catalog snapshot (format chosen by the output extension).
    Convert {
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Computed,
    Materialized,
    Adaptive,
}

impl StrategyArg {
    fn with_threshold(self, threshold: usize) -> QualifyStrategy {
        match self {
            StrategyArg::Computed => QualifyStrategy::Computed,
            StrategyArg::Materialized => QualifyStrategy::Materialized,
            StrategyArg::Adaptive => QualifyStrategy::Adaptive { threshold },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = Arc::new(load_store(&cli.catalog)?);
    match cli.command {
        Commands::Evaluate {
            chart,
            ladder,
            trace,
        } => {
            let engine = build_engine(&store, cli.config.as_deref())?;
            let evaluation = engine.evaluate_traced(ChartId::new(chart), LadderId::new(ladder))?;
            if trace {
                for (filter, path) in &evaluation.evaluated {
                    println!("  {} {:?}", filter_label(store.as_ref(), *filter), path);
                }
                if evaluation.short_circuited {
                    println!("  {}", "short-circuited: no candidates left".yellow());
                }
            }
            print_records(store.as_ref(), &evaluation.records);
        }
        Commands::Rank {
            chart,
            ladder,
            json,
        } => {
            let engine = build_engine(&store, cli.config.as_deref())?;
            let ranked = engine.rank(ChartId::new(chart), LadderId::new(ladder))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else if ranked.is_empty() {
                println!("{}", "no records".dimmed());
            } else {
                for entry in &ranked {
                    println!(
                        "{:>4}  {:<12} {:>12}  {}",
                        entry.rank.to_string().bold(),
                        entry.user.to_string(),
                        entry.value,
                        entry.record.to_string().dimmed()
                    );
                }
            }
        }
        Commands::Qualify {
            chart,
            filter,
            strategy,
            threshold,
        } => {
            let engine = build_engine(&store, cli.config.as_deref())?;
            let strategy = strategy
                .map(|s| s.with_threshold(threshold))
                .unwrap_or(engine.config().strategy);
            let records =
                engine.qualify_with(ChartId::new(chart), FilterId::new(filter), strategy)?;
            print_records(store.as_ref(), &records);
        }
        Commands::Resolve { filter } => {
            let engine = build_engine(&store, cli.config.as_deref())?;
            let chosen = engine.resolve(FilterId::new(filter))?;
            println!(
                "{} is implied by {} chosen filter(s)",
                filter_label(store.as_ref(), FilterId::new(filter)).bold(),
                chosen.len()
            );
            for raw in chosen.iter() {
                println!("  {}", filter_label(store.as_ref(), FilterId::new(raw)));
            }
        }
        Commands::Verify { repair } => {
            let engine = build_engine(&store, cli.config.as_deref())?;
            let report = engine.verify()?;
            println!(
                "checked {} record(s), {} pending",
                report.checked, report.pending
            );
            for discrepancy in &report.discrepancies {
                println!(
                    "  {} {} missing {:?} stale {:?}",
                    "mismatch".red().bold(),
                    discrepancy.record,
                    discrepancy.missing,
                    discrepancy.stale
                );
            }
            for (record, reason) in &report.unverifiable {
                println!("  {} {record}: {reason}", "unverifiable".yellow().bold());
            }
            if report.is_consistent() {
                println!("{}", "ok".green().bold());
            } else if repair {
                let fixed = engine.repair(&report)?;
                println!(
                    "{} {} record(s) recomputed, {} unresolved",
                    "repaired".green().bold(),
                    fixed.updated + fixed.removed,
                    fixed.unresolved().len()
                );
                ensure_repaired(&fixed)?;
            } else {
                return Err(anyhow!(
                    "materialized index disagrees with the implication graph for {} record(s)",
                    report.records().len()
                ));
            }
        }
        Commands::Ladders { game } => {
            for ladder in store.ladders_of_game(GameId::new(game))? {
                println!(
                    "{:>3}  {:<24} {:<8} {} rule filter(s)",
                    ladder.order,
                    ladder.name.bold(),
                    ladder.tier,
                    ladder.rule_filters.len()
                );
            }
        }
        Commands::Convert { out } => {
            store
                .snapshot()
                .save(&out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_store(path: &Path) -> Result<MemoryStore> {
    let store = MemoryStore::load(path)
        .with_context(|| format!("failed to load catalog {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        records = store.record_count(),
        "catalog loaded"
    );
    Ok(store)
}

fn build_engine(
    store: &Arc<MemoryStore>,
    config: Option<&Path>,
) -> Result<LadderEngine<MemoryStore>> {
    let config = match config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(LadderEngine::new(Arc::clone(store), config)?)
}

/// A repair that left records unresolved is a failed command.
fn ensure_repaired(fixed: &BatchReport) -> Result<()> {
    let unresolved = fixed.unresolved();
    if unresolved.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = unresolved.iter().map(ToString::to_string).collect();
    Err(anyhow!(
        "repair left {} record(s) unresolved: {}",
        ids.len(),
        ids.join(", ")
    ))
}

fn filter_label(store: &MemoryStore, filter: FilterId) -> String {
    match store.filter(filter) {
        Some(f) => format!("{} ({})", f.name, filter),
        None => filter.to_string(),
    }
}

fn print_records(store: &MemoryStore, records: &RoaringBitmap) {
    println!("{} record(s)", records.len().to_string().bold());
    for raw in records.iter() {
        let id = RecordId::new(raw);
        match store.record(id) {
            Some(record) => println!("  {}  {}  {}", id, record.user, record.value),
            None => println!("  {id}"),
        }
    }
}
