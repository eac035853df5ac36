use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use observatory_etl::config::Config;
use observatory_etl::logging;
use observatory_etl::pipeline::{PipelineExecutionResult, PipelineOrchestrator};
use observatory_etl::storage::CsvTableStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Environment variable consulted when `--config` is not given
const CONFIG_ENV: &str = "OBSERVATORY_CONFIG";

#[derive(Parser)]
#[command(name = "observatory_etl")]
#[command(about = "Reshape Scopus, CNCFlora and Espacenet exports into a star schema")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write Prometheus-format stage metrics to this file when the run ends
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all four stages in order
    Run,
    /// Run a single stage against tables already on disk
    Stage {
        /// One of: scopus, cncflora, unify, espacenet
        name: String,
    },
    /// List the stages in execution order
    Stages,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("💥 {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.paths.log_dir);

    let metrics = match &cli.metrics_file {
        Some(_) => Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install metrics recorder")?,
        ),
        None => None,
    };

    let orchestrator = PipelineOrchestrator::new(&config).context("Invalid pipeline")?;
    let mut store = CsvTableStore::new(&config.paths.processed_dir);

    let outcome = match cli.command {
        Commands::Stages => {
            println!("📋 Stages in execution order:");
            for (index, name) in orchestrator.stage_names().iter().enumerate() {
                println!("   {}. {}", index + 1, name);
            }
            return Ok(());
        }
        Commands::Run => {
            let span = tracing::info_span!("run", processed = %config.paths.processed_dir.display());
            let _enter = span.enter();
            println!("🔄 Running all stages...");
            orchestrator.run_all(&mut store)
        }
        Commands::Stage { name } => {
            let span = tracing::info_span!("run", stage = %name);
            let _enter = span.enter();
            println!("🔄 Running stage '{}'...", name);
            orchestrator.run_stage(&name, &mut store)
        }
    };

    // Metrics are flushed even when a stage failed
    if let (Some(handle), Some(path)) = (&metrics, &cli.metrics_file) {
        write_metrics(handle, path);
    }

    let execution = outcome.context("Pipeline failed")?;
    let report = execution
        .write_report(&config.paths.processed_dir)
        .context("Failed to write run report")?;
    print_summary(&execution, &report);
    Ok(())
}

fn write_metrics(handle: &PrometheusHandle, path: &Path) {
    match std::fs::write(path, handle.render()) {
        Ok(()) => info!("📈 Metrics written to {}", path.display()),
        Err(e) => warn!("Failed to write metrics to {}: {}", path.display(), e),
    }
}

fn print_summary(execution: &PipelineExecutionResult, report: &Path) {
    println!("\n📊 Pipeline Results:");
    for stage in &execution.stages {
        println!(
            "   {} ({} ms): {} tables, {} rows",
            stage.stage,
            stage.duration_ms,
            stage.tables.len(),
            stage.rows_written()
        );
        for skipped in &stage.skipped_models {
            println!("      ⏭️  skipped {}", skipped);
        }
        for warning in &stage.warnings {
            println!("      ⚠️  {}", warning);
        }
    }
    println!("   Total tables: {}", execution.total_tables);
    println!("   Total rows: {}", execution.total_rows);
    if let Some(duration) = execution.duration() {
        println!("   Duration: {} ms", duration.num_milliseconds());
    }
    println!("   Report: {}", report.display());
    println!("\n✅ Done");
}
