use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use callsight::{
    format_status_counts, parse_calls_file, CallCatalog, CallIngestor, CallStore,
    CapabilityProvider, InsightOrchestrator, InsightReport, JobExecutor, JobHandle, JobName,
    JobOutcome, JobPayload, JobQueue, QueueName, Settings, SqliteCallStore,
};

#[derive(Parser)]
#[command(name = "callsight")]
#[command(author, version, about = "Call transcript insight pipeline", long_about = None)]
struct Cli {
    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load raw calls from a JSON file as pending records
    Ingest {
        /// Input file holding an array of calls
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Generate insights for stored calls
    Process {
        /// Calls to process
        #[arg(long = "call-id", num_args = 1.., required_unless_present = "pending")]
        call_ids: Vec<i64>,

        /// Process every call still pending
        #[arg(long, conflicts_with = "call_ids")]
        pending: bool,
    },

    /// Show the insights stored for a call
    Show {
        #[arg(long = "call-id")]
        call_id: i64,

        /// Write the report as JSON instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Count records per processing status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.json_logs);

    let mut settings = Settings::from_env().context("Failed to load settings")?;
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    let store = Arc::new(
        SqliteCallStore::open(&settings.database_path)
            .with_context(|| format!("Failed to open database {:?}", settings.database_path))?,
    );

    match cli.command {
        Commands::Ingest { input } => ingest_calls(&settings, store, input).await,
        Commands::Process { call_ids, pending } => {
            process_calls(&settings, store, call_ids, pending).await
        }
        Commands::Show { call_id, output } => show_call(store.as_ref(), call_id, output),
        Commands::Status => {
            let counts = store.status_counts()?;
            print!("{}", format_status_counts(&counts));
            Ok(())
        }
    }
}

fn setup_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().try_init().ok();
    } else {
        builder.try_init().ok();
    }
}

async fn ingest_calls(settings: &Settings, store: Arc<SqliteCallStore>, input: PathBuf) -> Result<()> {
    info!("Loading calls from {:?}", input);
    let calls = parse_calls_file(&input).context("Failed to parse input calls")?;
    info!("Loaded {} calls", calls.len());

    let catalog = Arc::new(CallCatalog::new(calls));
    let queue = JobQueue::builder(settings.retry)
        .handler(
            JobName::IngestCall,
            Arc::new(CallIngestor::new(catalog.clone(), store)),
        )
        .workers(QueueName::Ingestion, settings.ingestion_workers)
        .start();

    let mut handles = Vec::with_capacity(catalog.len());
    for call_id in catalog.call_ids() {
        handles.push(queue.submit(JobName::IngestCall, JobPayload { call_id }, QueueName::Ingestion)?);
    }

    let (completed, abandoned) = collect_reports(handles).await?;
    queue.shutdown().await;

    info!("Ingestion complete: {} stored, {} abandoned", completed, abandoned);
    if abandoned > 0 {
        bail!("{} calls could not be ingested", abandoned);
    }
    Ok(())
}

async fn process_calls(
    settings: &Settings,
    store: Arc<SqliteCallStore>,
    call_ids: Vec<i64>,
    pending: bool,
) -> Result<()> {
    let call_ids = if pending {
        store
            .list(Some("pending"))?
            .into_iter()
            .map(|record| record.call_id)
            .collect()
    } else {
        call_ids
    };

    if call_ids.is_empty() {
        info!("No calls to process");
        return Ok(());
    }

    let provider =
        CapabilityProvider::from_settings(settings).context("Failed to set up capabilities")?;
    let orchestrator = InsightOrchestrator::new(provider, settings.capability_timeout);
    let queue = JobQueue::builder(settings.retry)
        .handler(
            JobName::GenerateCallInsights,
            Arc::new(JobExecutor::new(store, orchestrator)),
        )
        .workers(QueueName::Insights, settings.insights_workers)
        .start();

    info!("Processing {} calls", call_ids.len());
    let mut handles = Vec::with_capacity(call_ids.len());
    for call_id in call_ids {
        handles.push(queue.submit(
            JobName::GenerateCallInsights,
            JobPayload { call_id },
            QueueName::Insights,
        )?);
    }

    let (completed, abandoned) = collect_reports(handles).await?;
    queue.shutdown().await;

    info!("Complete: {} calls processed, {} abandoned", completed, abandoned);
    if abandoned > 0 {
        bail!("{} calls failed", abandoned);
    }
    Ok(())
}

/// Wait for every job, returning (completed, abandoned) counts
async fn collect_reports(handles: Vec<JobHandle>) -> Result<(usize, usize)> {
    let mut completed = 0;
    let mut abandoned = 0;

    for handle in handles {
        let report = handle.wait().await?;
        match &report.outcome {
            JobOutcome::Completed(_) => completed += 1,
            JobOutcome::Retry { reason } | JobOutcome::Abandoned { reason } => {
                warn!(
                    call_id = report.call_id,
                    attempts = report.attempts,
                    "Job abandoned: {}",
                    reason
                );
                abandoned += 1;
            }
        }
    }

    Ok((completed, abandoned))
}

fn show_call(store: &dyn CallStore, call_id: i64, output: Option<PathBuf>) -> Result<()> {
    let Some(record) = store.get(call_id)? else {
        bail!("Call {} not found", call_id);
    };
    let report = InsightReport::from_record(&record);

    match output {
        Some(path) => {
            report.write_json(&path)?;
            info!("Report written to {:?}", path);
        }
        None => print!("{}", report.format()),
    }
    Ok(())
}
