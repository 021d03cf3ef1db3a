mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::index::IndexEngine;
use crate::io::config_io;
use crate::io::repository::MarkdownRepository;
use crate::io::source::FsSource;
use crate::model::config::{LogSettings, VaultConfig};
use crate::model::task::{TaskPatch, TaskRecord};

/// Directory under the vault root holding the recovery log.
pub const STATE_DIR: &str = ".tally";

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;
    let root = vault_root(cli.vault_dir.as_deref())?;
    let config = config_io::read_config(&root)?;
    init_logging(&config.log);

    match cli.command {
        Commands::Scan => cmd_scan(&root, &config, json).await,
        Commands::Day(args) => cmd_day(args, &root, &config, json).await,
        Commands::Show(args) => cmd_show(args, &root, &config, json).await,
        Commands::Set(args) => cmd_set(args, &root, &config, json).await,
        Commands::Watch => watch::cmd_watch(&root, &config).await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vault_root(dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let start = match dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let root = std::fs::canonicalize(&start)
        .map_err(|e| format!("cannot resolve vault path '{}': {}", start.display(), e))?;
    Ok(root)
}

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_logging(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_engine(root: &Path, config: &VaultConfig) -> IndexEngine {
    let source = FsSource::new(root, config.index.clone());
    IndexEngine::builder(Arc::new(source), Arc::new(MarkdownRepository))
        .recovery_dir(root.join(STATE_DIR))
        .build()
}

/// Scan one document and pick out the task on `line`.
async fn load_task(
    engine: &IndexEngine,
    path: &Path,
    line: usize,
    root: &Path,
) -> Result<TaskRecord, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("no such document: {}", display_path(path, root)).into());
    }
    engine.on_document_modified(path).wait().await;
    engine
        .for_document(path)
        .into_iter()
        .find(|t| t.line == line)
        .ok_or_else(|| format!("no task at {}:{}", display_path(path, root), line + 1).into())
}

fn print_tasks(tasks: &[TaskRecord], root: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let out: Vec<TaskJson> = tasks.iter().map(|t| task_to_json(t, root)).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for task in tasks {
            println!("{}", format_task_line(task, root));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

async fn cmd_scan(root: &Path, config: &VaultConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(root, config);
    engine.fallback_scan().await;

    let mut tasks = engine.all();
    tasks.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
    print_tasks(&tasks, root, json)
}

async fn cmd_day(
    args: DayArgs,
    root: &Path,
    config: &VaultConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let date = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}' (expected YYYY-MM-DD)", args.date))?;
    let boundary_hour = args.boundary_hour.unwrap_or(config.index.boundary_hour);
    if boundary_hour > 23 {
        return Err(format!("boundary hour must be between 0 and 23, got {}", boundary_hour).into());
    }

    let engine = open_engine(root, config);
    engine.fallback_scan().await;

    let mut tasks = engine.for_visual_window(date, boundary_hour);
    tasks.sort_by(|a, b| {
        (a.date(), a.time(), &a.path, a.line).cmp(&(b.date(), b.time(), &b.path, b.line))
    });
    print_tasks(&tasks, root, json)
}

async fn cmd_show(
    args: ShowArgs,
    root: &Path,
    config: &VaultConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (path, line) = parse_location(&args.location, root)?;
    let engine = open_engine(root, config);
    let task = load_task(&engine, &path, line, root).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task_to_json(&task, root))?);
    } else {
        for line in format_task_detail(&task, root) {
            println!("{}", line);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

async fn cmd_set(
    args: SetArgs,
    root: &Path,
    config: &VaultConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (path, line) = parse_location(&args.location, root)?;
    let status = parse_task_status(&args.status)?;
    let engine = open_engine(root, config);
    let task = load_task(&engine, &path, line, root).await?;

    if let Some(write) = engine.update(task.id, TaskPatch::status(status)) {
        write.finished().await;
    }

    // The write reports failures only through the log, so confirm from disk
    let saved = load_task(&engine, &path, line, root)
        .await
        .ok()
        .filter(|t| t.status == status)
        .ok_or_else(|| {
            format!(
                "could not save {}:{} (see {}/recovery.log)",
                display_path(&path, root),
                line + 1,
                STATE_DIR
            )
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task_to_json(&saved, root))?);
    } else {
        println!("{}", format_task_line(&saved, root));
    }
    Ok(())
}
