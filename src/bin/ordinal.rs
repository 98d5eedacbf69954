#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use ordinal_harness::evaluation;
use ordinal_harness::{
    read_comparison_log, BradleyTerryModel, EngineConfig, ItemId, JsonlComparisonSink,
    RankingSnapshot, RankingState, SessionController, SimulatedOracle, UncertaintyEstimator,
};

#[derive(Parser)]
#[command(name = "ordinal", version, about = "Active-learning pairwise ranking CLI")]
struct Cli {
    /// Log at DEBUG instead of INFO
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Engine config (JSON); missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Reseed every random component
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a stored comparison log and print the ranking
    Fit {
        #[arg(long)]
        log: PathBuf,
        /// Registered items; defaults to every id in the log
        #[arg(long, value_delimiter = ',')]
        items: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run a full session against a simulated oracle
    Simulate {
        #[arg(long, value_delimiter = ',', required = true)]
        items: Vec<String>,
        /// True log-strengths, one per item
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        strengths: Vec<f64>,
        #[arg(long, default_value_t = 0.1)]
        noise: f64,
        /// Comparison budget
        #[arg(long, default_value_t = 50)]
        budget: usize,
        /// Write the comparison log here (JSONL)
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        curve_csv: Option<PathBuf>,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_path(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    match cli.command {
        Commands::Fit { log, items, out } => {
            let comparisons = read_comparison_log(&log)?;
            let items = if items.is_empty() {
                items_in_log_order(&comparisons)
            } else {
                items.into_iter().map(ItemId::from).collect()
            };
            let state = RankingState::from_log(items, comparisons)?;
            let model = BradleyTerryModel::new(config.bradley_terry.clone())
                .fit(state.comparisons(), state.item_ids())?;
            let uncertainty = UncertaintyEstimator::new(BradleyTerryModel::new(
                config.bradley_terry.clone(),
            ))
            .estimate(
                state.comparisons(),
                state.item_ids(),
                config.uncertainty.n_bootstrap,
                config.uncertainty.seed,
            );
            let snapshot = RankingSnapshot::build(&state, &model, &uncertainty);
            emit(out.as_ref(), &snapshot)?;
        }
        Commands::Simulate {
            items,
            strengths,
            noise,
            budget,
            log,
            out,
        } => {
            if items.len() != strengths.len() {
                return Err(format!(
                    "--items and --strengths differ in length ({} vs {})",
                    items.len(),
                    strengths.len()
                )
                .into());
            }
            let items: Vec<ItemId> = items.into_iter().map(ItemId::from).collect();
            let oracle = Arc::new(SimulatedOracle::new(
                items.iter().cloned().zip(strengths),
                noise,
                config.uncertainty.seed,
            ));
            config.driver.max_comparisons = Some(budget);

            let mut controller = SessionController::new(oracle, config)?;
            let mut worker = None;
            if let Some(path) = &log {
                let (sink, w) = JsonlComparisonSink::create(path)?;
                controller = controller.with_log_sink(Arc::new(sink));
                worker = Some(w);
            }

            controller.start(items)?;
            controller.wait_for_driver().await;
            let snapshot = controller.stop().await?;
            let stats = controller.statistics();
            tracing::info!(
                comparisons = stats.comparisons_made,
                passes = stats.passes_completed,
                confidence = stats.aggregate_confidence,
                "simulation finished"
            );
            drop(controller);

            if let Some(worker) = worker {
                let written = worker.join()?;
                tracing::debug!(written, "comparison log flushed");
            }
            emit(out.as_ref(), snapshot.as_ref())?;
        }
        Commands::Eval {
            case,
            out,
            curve_csv,
            concurrency,
        } => {
            let mut results = Vec::new();
            for result in evaluation::run_synthetic_suite(case.as_deref(), concurrency).await {
                results.push(result?);
            }
            let mut file = File::create(out)?;
            for result in &results {
                let line = serde_json::to_string(result)?;
                writeln!(file, "{line}")?;
            }
            if let Some(csv_path) = curve_csv {
                std::fs::write(csv_path, evaluation::confidence_curve_csv(&results))?;
            }
        }
    }

    Ok(())
}

/// Every id that appears in `log`, in order of first appearance.
fn items_in_log_order(log: &[ordinal_harness::Comparison]) -> Vec<ItemId> {
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for c in log {
        for id in [&c.winner, &c.loser] {
            if seen.insert(id.clone()) {
                items.push(id.clone());
            }
        }
    }
    items
}

fn emit<T: serde::Serialize>(out: Option<&PathBuf>, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    match out {
        Some(path) => std::fs::write(path, json),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")
        }
    }
}
