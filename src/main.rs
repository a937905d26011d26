use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tallyflow::input::{FileSource, SequenceSource};
use tallyflow::render::{ConsoleRenderer, TracingRenderer};
use tallyflow::testing::reference_source;
use tallyflow::{Pipeline, PipelineConfig, RunReport};
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

/// Average per-key symbol counts across sequences with a bounded MapReduce pipeline
#[derive(Parser)]
#[command(name = "tallyflow", version)]
#[command(about = "Average per-key symbol counts across sequences", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for the summaries
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Text files to read, one sequence per file; the built-in demo input is used when omitted
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One "average <key> per <unit>" line per key
    Text,
    /// The full run report as JSON
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("tallyflow started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load_or_default(cli.config.as_ref())
        .await
        .context("Failed to load configuration")?;

    let pipeline = Pipeline::new(config.clone()).context("Invalid pipeline configuration")?;
    let pipeline = match cli.format {
        OutputFormat::Text => pipeline.with_renderer(Arc::new(ConsoleRenderer::new(&config.unit))),
        OutputFormat::Json => pipeline.with_renderer(Arc::new(TracingRenderer)),
    };

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let source: Box<dyn SequenceSource> = if cli.files.is_empty() {
        debug!("no input files given, using the built-in demo input");
        Box::new(reference_source())
    } else {
        Box::new(FileSource::new(cli.files))
    };

    let report = pipeline
        .run(source.as_ref())
        .await
        .context("Pipeline run failed")?;

    if cli.format == OutputFormat::Json {
        print_json(&report)?;
    }
    Ok(())
}

fn print_json(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    println!("{json}");
    Ok(())
}
