//! genbench CLI
//!
//! Single-shot code generation benchmark harness

use clap::{Parser, Subcommand};
use genbench::{
    stats_table, trial_table, Aggregator, ArtifactLoader, FsReporter, HttpModelClient,
    LoaderConfig, ModelEntry, RoundRunner, RunConfig, RunSummary, TaskSet,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genbench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark suite
    Run {
        /// Directory of task definition files (JSON, one per task)
        #[arg(long, default_value = "tasks")]
        tasks: PathBuf,

        /// Models to benchmark, as `name=model-id` or bare ids
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<ModelEntry>,

        /// Attempt rounds per (model, task) pair
        #[arg(long, default_value = "10")]
        rounds: NonZeroUsize,

        /// pass@k values to estimate
        #[arg(long, value_delimiter = ',', default_value = "1,5,10")]
        ks: Vec<usize>,

        /// Output directory for artifacts and summary.json
        #[arg(long, default_value = "generated")]
        output: PathBuf,

        /// Command for the artifact host runtime
        #[arg(long, default_value = "node")]
        node_command: String,

        /// Directory whose node_modules supplies express/react to artifacts
        #[arg(long)]
        module_root: Option<PathBuf>,
    },

    /// Re-derive statistics and tables from an existing summary.json
    Report {
        /// Path to a previously written summary.json
        #[arg(long)]
        input: PathBuf,
    },

    /// Check that the artifact host runtime is usable
    Doctor {
        /// Command for the artifact host runtime
        #[arg(long, default_value = "node")]
        node_command: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Run {
            tasks,
            models,
            rounds,
            ks,
            output,
            node_command,
            module_root,
        } => {
            let rounds = rounds.get();
            let task_set = match TaskSet::load_dir(&tasks) {
                Ok(set) => set,
                Err(e) => {
                    eprintln!("Failed to load tasks from {}: {e}", tasks.display());
                    std::process::exit(1);
                }
            };
            tracing::info!(
                tasks = task_set.len(),
                models = models.len(),
                rounds,
                "Loaded task set"
            );

            let client = match HttpModelClient::from_env() {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("API configuration error: {e}");
                    std::process::exit(1);
                }
            };

            let config = RunConfig {
                rounds,
                requested_ks: ks.clone(),
                out_dir: output.clone(),
                node_command,
                module_root,
            };
            let effective = config.effective_ks();

            let runner = RoundRunner::new(config, &client);
            let mut reporter = FsReporter::new(&output);
            let records = runner.run(&models, &task_set, &mut reporter);

            let stats = Aggregator::new(effective.clone()).aggregate(&records);
            let summary = RunSummary::build(rounds, ks, effective, records, stats);

            println!("{}", trial_table(&summary.results));
            println!();
            println!("{}", stats_table(&summary.stats));

            match reporter.write_summary(&summary) {
                Ok(path) => println!("Summary written to {}", path.display()),
                Err(e) => {
                    eprintln!("Failed to write summary: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Report { input } => {
            let raw = match std::fs::read_to_string(&input) {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("Failed to read {}: {e}", input.display());
                    std::process::exit(1);
                }
            };
            let summary: RunSummary = match serde_json::from_str(&raw) {
                Ok(summary) => summary,
                Err(e) => {
                    eprintln!("Failed to parse {}: {e}", input.display());
                    std::process::exit(1);
                }
            };

            // Re-derive from the raw records rather than trusting stored stats
            let stats = Aggregator::new(summary.effective_ks.clone()).aggregate(&summary.results);
            println!("{}", trial_table(&summary.results));
            println!();
            println!("{}", stats_table(&stats));
        }
        Commands::Doctor { node_command } => {
            let loader = ArtifactLoader::with_config(LoaderConfig {
                node_command: node_command.clone(),
                module_root: None,
            });
            if loader.is_available() {
                println!("{node_command}: OK");
            } else {
                eprintln!("{node_command}: not available");
                std::process::exit(1);
            }
        }
    }
}
