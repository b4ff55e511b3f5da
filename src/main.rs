//! Checklist Sync - CLI
//!
//! Syncs checkbox items of note files into a JSON task store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use checklist_sync::{
    events::SyncEventBus,
    notes::extract_checklist,
    sync::{FanoutMetricsSink, MetricsSink, SyncCoordinator, TracingMetricsSink},
    tasks::{JsonFileTaskStore, ReminderBridge, TaskManager, TaskRecord, TaskStore, UpdateTaskMetadata},
    watcher::{note_id_for, NoteWatcher},
    Config,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "checklist-sync")]
#[command(about = "Sync note checklists into structured tasks")]
struct Cli {
    /// YAML config file (defaults to ./config.yaml)
    #[arg(long, env = "CHECKLIST_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one note file into the task store
    Sync {
        /// Note file to read
        #[arg(short, long)]
        note: PathBuf,

        /// Note id (defaults to the file path)
        #[arg(long)]
        note_id: Option<String>,
    },

    /// Print the checklist items found in a note file
    Extract {
        #[arg(short, long)]
        note: PathBuf,
    },

    /// List a note's tasks
    Tasks {
        #[arg(long)]
        note_id: String,

        /// Include tasks whose checklist line was removed
        #[arg(long)]
        include_retired: bool,
    },

    /// Update user-owned fields of a task
    Meta {
        #[arg(long)]
        task_id: Uuid,

        #[arg(long)]
        priority: Option<i32>,

        /// Due date (RFC 3339), or "none" to clear it
        #[arg(long)]
        due: Option<String>,

        /// Replace labels (repeatable)
        #[arg(long = "label")]
        labels: Option<Vec<String>>,
    },

    /// Watch a directory and sync notes as they change
    Watch {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Reminder bridge that only logs due-date changes
struct LoggingReminderBridge;

impl ReminderBridge for LoggingReminderBridge {
    fn due_date_changed(&self, task: &TaskRecord, previous: Option<DateTime<Utc>>) {
        tracing::info!(
            task_id = %task.id,
            previous = ?previous,
            due = ?task.due_date,
            "Task due date changed"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checklist_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { note, note_id } => run_sync(&config, &note, note_id).await,
        Commands::Extract { note } => {
            let body = read_note(&note).await?;
            print_json(&extract_checklist(&body))
        }
        Commands::Tasks {
            note_id,
            include_retired,
        } => {
            let manager = TaskManager::new(open_store(&config).await?);
            print_json(&manager.list_note_tasks(&note_id, include_retired).await?)
        }
        Commands::Meta {
            task_id,
            priority,
            due,
            labels,
        } => {
            let update = UpdateTaskMetadata {
                priority: priority.map(Some),
                due_date: due.as_deref().map(parse_due).transpose()?,
                labels,
            };
            let manager = TaskManager::new(open_store(&config).await?)
                .with_reminder_bridge(Arc::new(LoggingReminderBridge));
            match manager.update_task_metadata(task_id, update).await? {
                Some(task) => print_json(&task),
                None => anyhow::bail!("Task {} not found", task_id),
            }
        }
        Commands::Watch { dir } => run_watch(&config, &dir).await,
    }
}

async fn run_sync(config: &Config, note: &Path, note_id: Option<String>) -> Result<()> {
    let body = read_note(note).await?;
    let note_id = note_id.unwrap_or_else(|| note_id_for(note));

    // One-shot run: nothing to debounce
    let coordinator = SyncCoordinator::new(
        open_store(config).await?,
        Arc::new(TracingMetricsSink),
        Duration::ZERO,
    );
    let run = coordinator.sync_now(&note_id, body).await?;
    coordinator.shutdown().await;

    tracing::info!(
        "Sync complete: {} created, {} updated, {} retired, {} unchanged",
        run.counts.created,
        run.counts.updated,
        run.counts.retired,
        run.counts.unchanged
    );
    print_json(&run)
}

async fn run_watch(config: &Config, dir: &Path) -> Result<()> {
    let events = SyncEventBus::default();
    let sink: Arc<dyn MetricsSink> = Arc::new(
        FanoutMetricsSink::default()
            .with(Arc::new(TracingMetricsSink))
            .with(Arc::new(events.clone())),
    );

    let coordinator = Arc::new(
        SyncCoordinator::new(open_store(config).await?, sink, config.debounce())
            .with_max_wait(config.max_wait())
            .with_idle_timeout(config.idle_timeout()),
    );

    // Print every finished run as a JSON line
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{}", line);
            }
        }
    });

    let mut watcher = NoteWatcher::new(coordinator.clone(), config.watch_extensions.clone());
    watcher.watch(dir).await?;
    watcher.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    watcher.stop().await;
    coordinator.shutdown().await;
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn TaskStore>> {
    let store = JsonFileTaskStore::open(&config.store_path).await?;
    Ok(Arc::new(store))
}

async fn read_note(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read note {}", path.display()))
}

fn parse_due(value: &str) -> Result<Option<DateTime<Utc>>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let due = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid due date: {}", value))?;
    Ok(Some(due.with_timezone(&Utc)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
