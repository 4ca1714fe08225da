//! `queuectl` — command-line and HTTP front door for the job queue.
//!
//! Thin adapter layer: every subcommand and HTTP route is a direct call
//! into a `queuectl_core::Scheduler` operation. No lifecycle invariant
//! lives here.

mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use queuectl_core::{EnqueueRequest, JobFilter, JobState, Scheduler};
use queuectl_executor::{run_worker_loop, StopToken, WorkerPool};
use queuectl_store::SqliteStore;

/// The hidden argument `WorkerPool` passes to a re-exec'd worker process.
const WORKER_LOOP_ARG: &str = "__worker-loop";

#[derive(Parser)]
#[command(name = "queuectl")]
#[command(about = "Durable background job queue with retries, backoff, and a dead-letter queue")]
#[command(version)]
struct Cli {
    /// Directory holding the queue database and per-job logs.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new job to the queue from a JSON payload.
    ///
    /// Example: queuectl enqueue '{"id":"job1","command":"echo hello"}'
    Enqueue { job_json: String },

    /// List jobs by state.
    List {
        #[arg(long, default_value = "pending")]
        state: String,
    },

    /// Show a summary of job states and the worker stop flag.
    Status,

    #[command(subcommand)]
    Dlq(DlqCommands),

    #[command(subcommand)]
    Config(ConfigCommands),

    #[command(subcommand)]
    Worker(WorkerCommands),

    /// Run a minimal HTTP surface mirroring the CLI's operations.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Hidden re-exec entry point used internally by the worker pool.
    #[command(name = "__worker-loop", hide = true)]
    WorkerLoop,
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead-lettered jobs.
    List,
    /// Move a dead-lettered job back to the main queue as `pending`.
    Retry { job_id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set a configuration key (e.g. `max_retries`, `backoff_base`, `lease_seconds`).
    Set { key: String, value: String },
    /// Get a configuration key.
    Get { key: String },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Start worker processes. Ctrl+C, or `queuectl worker stop`, ends them.
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Request a graceful stop; running workers exit after their current job.
    Stop,
}

fn data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let home = std::env::var("HOME").context("HOME is not set; pass --data-dir explicitly")?;
    Ok(PathBuf::from(home).join(".queuectl"))
}

async fn open_scheduler(data_dir: &std::path::Path) -> Result<Scheduler<SqliteStore>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let store = SqliteStore::connect(&data_dir.join("queue.db")).await?;
    Ok(Scheduler::new(Arc::new(store)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // The hidden worker-loop re-exec target needs its own single-threaded
    // runtime per process, matching a `multiprocessing.Process` target
    // rather than sharing the CLI's runtime.
    if matches!(cli.command, Commands::WorkerLoop) {
        let dir = data_dir(cli.data_dir)?;
        return tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_worker_process(dir));
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run_worker_process(dir: PathBuf) -> Result<()> {
    let scheduler = Arc::new(open_scheduler(&dir).await?);
    let stop = StopToken::new();
    stop.watch_for_interrupt();
    run_worker_loop(scheduler, dir, stop).await;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let dir = data_dir(cli.data_dir)?;
    let scheduler = open_scheduler(&dir).await?;

    match cli.command {
        Commands::Enqueue { job_json } => {
            let req: EnqueueRequest =
                serde_json::from_str(&job_json).context("invalid job JSON")?;
            let id = req.id.clone();
            scheduler.enqueue(req).await?;
            println!("Enqueued job: {id}");
        }
        Commands::List { state } => {
            let filter = parse_filter(&state)?;
            let jobs = scheduler.list_jobs(filter).await?;
            print_jobs(&jobs);
        }
        Commands::Status => {
            let snap = scheduler.snapshot_status().await?;
            println!("pending: {}", snap.pending);
            println!("processing: {}", snap.processing);
            println!("completed: {}", snap.completed);
            println!("stop_flag: {}", snap.stop_flag as u8);
        }
        Commands::Dlq(DlqCommands::List) => {
            let entries = scheduler.list_dlq().await?;
            print_dlq(&entries);
        }
        Commands::Dlq(DlqCommands::Retry { job_id }) => {
            scheduler.retry_from_dlq(&job_id).await?;
            println!("DLQ job {job_id} retried");
        }
        Commands::Config(ConfigCommands::Set { key, value }) => {
            scheduler.config_set(&key, &value).await?;
            println!("Config set: {key} = {value}");
        }
        Commands::Config(ConfigCommands::Get { key }) => {
            let val = scheduler.config_get(&key).await?;
            println!("{}", val.as_deref().unwrap_or("(null)"));
        }
        Commands::Worker(WorkerCommands::Start { count }) => {
            scheduler.config_set("stop", "0").await?;
            let exe = std::env::current_exe()?;
            let worker_args = worker_args(&dir);
            let pool = WorkerPool::start(count, &exe, &worker_args)?;
            pool.join()?;
        }
        Commands::Worker(WorkerCommands::Stop) => {
            scheduler.stop_pool().await?;
            println!("Stop signal sent. Workers will exit after the current job.");
        }
        Commands::Serve { bind } => {
            http::serve(scheduler, dir, &bind).await?;
        }
        Commands::WorkerLoop => unreachable!("handled before runtime dispatch"),
    }

    Ok(())
}

fn worker_args(dir: &std::path::Path) -> Vec<String> {
    vec![
        WORKER_LOOP_ARG.to_string(),
        "--data-dir".to_string(),
        dir.display().to_string(),
    ]
}

fn parse_filter(state: &str) -> Result<JobFilter> {
    if state.eq_ignore_ascii_case("any") {
        return Ok(JobFilter::Any);
    }
    let s: JobState = state
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(JobFilter::State(s))
}

fn print_jobs(jobs: &[queuectl_core::Job]) {
    if jobs.is_empty() {
        println!("(empty)");
        return;
    }
    for job in jobs {
        println!(
            "{}\t{}\t{}\tattempts={}/{}\tpriority={}\tnext_run_at={}",
            job.id,
            job.state.as_str(),
            job.command,
            job.attempts,
            job.max_retries,
            job.priority,
            job.next_run_at,
        );
    }
}

fn print_dlq(entries: &[queuectl_core::DlqEntry]) {
    if entries.is_empty() {
        println!("(empty)");
        return;
    }
    for entry in entries {
        println!("{}\t{}\t{}\t{}", entry.id, entry.command, entry.reason, entry.created_at);
    }
}
