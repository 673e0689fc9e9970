mod config;
mod postgres;
mod registry;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use uuid::Uuid;

use airsynth_generate::{
    CsvSinkFactory, GenerationError, OnExhausted, SinkError, SinkFactory, SynthesisEngine,
    SynthesisResult,
};
use config::{ConfigError, SinkKind, SynthConfig};
use postgres::PgSinkFactory;
use registry::{
    RunContext, RunPaths, init_run_logging, redact_url, start_run, write_parked, write_report,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(name = "airsynth", version, about = "Synthetic airline dataset generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a full dataset into a new run directory.
    Generate(GenerateArgs),
    /// Write the default configuration file.
    InitConfig(InitConfigArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    sink: Option<SinkKind>,
    /// Postgres connection string, required for the postgres sink.
    #[arg(long, value_name = "CONNECTION_STRING")]
    database_url: Option<String>,
    /// Output directory for runs.
    #[arg(long)]
    run_dir: Option<PathBuf>,
    #[arg(long)]
    producers: Option<usize>,
    #[arg(long)]
    consumers: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Hide the per-phase progress bars.
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    /// Stop the run when a batch exhausts its retries instead of parking it.
    #[arg(long, default_value_t = false)]
    abort_on_exhausted: bool,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    #[arg(long, default_value = "airsynth.toml")]
    out: PathBuf,
    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(args).await,
        Command::InitConfig(args) => run_init_config(args),
    }
}

fn run_init_config(args: InitConfigArgs) -> Result<(), CliError> {
    SynthConfig::default().save(&args.out, args.force)?;
    println!("wrote {}", args.out.display());
    Ok(())
}

async fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let config = resolve_config(args)?;

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        run_dir: config.output.run_dir.clone(),
        config: config.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(
        event = "run_started",
        run_id = %run_id,
        sink = config.output.sink.as_str(),
        seed = config.seed
    );

    let timer = Instant::now();
    let engine = SynthesisEngine::new(config.options()).with_run_id(run_id.clone());

    let result = match config.output.sink {
        SinkKind::Csv => {
            let sinks = CsvSinkFactory::new(&run_paths.data_dir)?;
            tracing::info!(event = "sink_opened", path = %run_paths.data_dir.display());
            let (result, sinks) = synthesize(engine, sinks).await?;
            for (table, bytes) in sinks.bytes_written() {
                tracing::info!(event = "csv_written", table, bytes);
            }
            result
        }
        SinkKind::Postgres => {
            let url = config.output.database_url.as_deref().ok_or_else(|| {
                CliError::InvalidConfig("postgres sink requires --database-url".to_string())
            })?;
            let max_connections = u32::try_from(config.pipeline.num_consumers)
                .unwrap_or(u32::MAX)
                .max(1);
            let sinks = PgSinkFactory::connect(url, max_connections, &config.output.schema).await?;
            tracing::info!(
                event = "sink_opened",
                connection = %redact_url(url),
                schema = %config.output.schema
            );
            synthesize(engine, sinks).await?.0
        }
    };

    finish_run(&run_paths, &result)?;

    let duration_ms = timer.elapsed().as_millis();
    let status = if result.report.parked_total > 0 {
        "partial"
    } else {
        "success"
    };
    tracing::info!(
        event = "run_finished",
        status,
        parked = result.report.parked_total,
        duration_ms = duration_ms,
        path = %run_paths.root.display()
    );

    Ok(())
}

/// Runs the engine on the blocking pool and hands the factory back.
async fn synthesize<F>(
    engine: SynthesisEngine,
    sinks: F,
) -> Result<(SynthesisResult, F), CliError>
where
    F: SinkFactory + Send + 'static,
{
    let (result, sinks) = tokio::task::spawn_blocking(move || {
        let result = engine.run(&sinks);
        (result, sinks)
    })
    .await?;
    Ok((result?, sinks))
}

fn finish_run(paths: &RunPaths, result: &SynthesisResult) -> Result<(), CliError> {
    write_report(paths, &result.report)?;
    tracing::info!(event = "report_written", path = %paths.report_path.display());

    if !result.parked.is_empty() {
        let written = write_parked(paths, &result.parked)?;
        tracing::warn!(
            event = "parked_written",
            batches = written,
            path = %paths.parked_dir.display()
        );
    }
    Ok(())
}

fn resolve_config(args: GenerateArgs) -> Result<SynthConfig, CliError> {
    let mut config = SynthConfig::load_or_default(args.config.as_deref())?;

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(sink) = args.sink {
        config.output.sink = sink;
    }
    if let Some(url) = args.database_url {
        config.output.database_url = Some(url);
    }
    if let Some(run_dir) = args.run_dir {
        config.output.run_dir = run_dir;
    }
    if let Some(producers) = args.producers {
        config.pipeline.num_producers = producers;
    }
    if let Some(consumers) = args.consumers {
        config.pipeline.num_consumers = consumers;
    }
    if let Some(batch_size) = args.batch_size {
        config.plan.batch_size = batch_size;
    }
    if args.no_progress {
        config.pipeline.show_progress = false;
    }
    if args.abort_on_exhausted {
        config.pipeline.on_exhausted = OnExhausted::Abort;
    }

    if config.output.sink == SinkKind::Postgres && config.output.database_url.is_none() {
        return Err(CliError::InvalidConfig(
            "postgres sink requires --database-url".to_string(),
        ));
    }
    Ok(config)
}
