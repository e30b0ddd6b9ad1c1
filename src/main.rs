//! batchwork CLI - resumable batch record processing.

use anyhow::{Context, Result};
use batchwork::demo::PairSum;
use batchwork::{BatchConfig, BatchPipeline, ProgressReporter, SpinnerReporter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "batchwork")]
#[command(version)]
#[command(about = "Resumable batch record processing with durable checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "batchwork.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum the integer pairs in the configured input file
    Run {
        /// Override the number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip lines and records that fail instead of stopping
        #[arg(long)]
        continue_on_error: bool,

        /// Show a progress spinner
        #[arg(long)]
        progress: bool,

        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# batchwork configuration file

# Records to process and the file that tracks finished ones
input_file = "data/numbers.csv"
checkpoint_file = "data/done.dat"

# Field delimiter for input lines
delimiter = ","

# Parallel workers
workers = 10

# Each worker handles at most one record per interval (omit to disable)
min_record_processing_ms = 1000

# How often progress is reported
progress_report_interval_ms = 1000

# Skip bad lines and failed tasks instead of stopping
continue_on_error = false
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = BatchConfig::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            info!("Configuration is valid");
            info!("  Input:      {}", config.input_file.display());
            info!("  Checkpoint: {}", config.checkpoint_file.display());
            info!("  Workers:    {}", config.workers);
            match config.min_record_processing_time() {
                Some(min) => info!("  Throttle:   {}ms per record", min.as_millis()),
                None => info!("  Throttle:   none"),
            }
        }

        Commands::Run {
            workers,
            continue_on_error,
            progress,
            json,
        } => {
            let mut config = BatchConfig::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            if let Some(workers) = workers {
                config.workers = workers;
            }
            if continue_on_error {
                config.continue_on_error = true;
            }

            let mut pipeline = BatchPipeline::new(config, PairSum::new())
                .context("Failed to create pipeline")?;

            let spinner = progress.then(|| Arc::new(SpinnerReporter::new()));
            if let Some(spinner) = &spinner {
                pipeline = pipeline.with_reporter(Arc::clone(spinner) as Arc<dyn ProgressReporter>);
            }

            let stats = pipeline.run_or_exit().await;

            if let Some(spinner) = &spinner {
                spinner.finish(stats.records_checkpointed);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("\n=== Batch Complete ===");
            println!("Run:          {}", stats.run_id);
            println!("Cached keys:  {}", stats.keys_cached);
            println!("Lines read:   {}", stats.lines_read);
            println!("Skipped:      {}", stats.records_skipped);
            println!("Processed:    {}", stats.records_checkpointed);
            println!("Parse fails:  {}", stats.parse_failures);
            println!("Task fails:   {}", stats.task_failures);
            println!("Total:        {}", pipeline.job().total());
            println!("Throughput:   {:.1}/s", stats.throughput_per_sec);
            println!("Runtime:      {:.1}s", stats.runtime_secs);
        }
    }

    Ok(())
}
