//! Turnmark CLI: inspect and maintain the persistent annotation store.
//!
//! Usage:
//!   turnmark migrate [--db path] [--config path]
//!   turnmark stars list [--url url]
//!   turnmark folders create <name> [--parent id]
//!   turnmark times show <url>

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use turnmark::annotations::AnnotationRecord;
use turnmark::storage::OpenKvStore;
use turnmark::{AnnotationStore, Clock, Config, KvStore, MigrationCoordinator, SqliteKv, SystemClock};

#[derive(Parser)]
#[command(
    name = "turnmark",
    version,
    about = "Persistent turn annotations for chat documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring stored data up to the current schema
    Migrate,
    /// Starred turns
    Stars {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Pinned turns
    Pins {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Star folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Per-conversation time data
    Times {
        #[command(subcommand)]
        action: TimesAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// List records, optionally for one conversation
    List {
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove a record by its composite key
    Remove { key: String },
}

#[derive(Subcommand)]
enum FolderAction {
    /// List folders as a tree
    List,
    /// Create a folder
    Create {
        name: String,
        /// Parent folder id (folders nest two levels deep)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Rename a folder
    Rename { id: String, name: String },
    /// Delete a folder and its sub-folders; their stars move up a level
    Delete { id: String },
}

#[derive(Subcommand)]
enum TimesAction {
    /// Show time data for a conversation URL
    Show { url: String },
}

/// Get the default database path (~/.local/share/turnmark/turnmark.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("turnmark").join("turnmark.db")
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load(path).map_err(|e| format!("{}: {}", path.display(), e)),
        None => Ok(Config::default()),
    }
}

fn open_store(db: Option<PathBuf>, config: &Config) -> Result<Arc<dyn KvStore>, String> {
    let db_path = db
        .or_else(|| config.storage.db_path.clone())
        .unwrap_or_else(default_db_path);
    let kv = SqliteKv::open(&db_path, config.quotas())
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?;
    Ok(Arc::new(kv))
}

fn print_record(record: &AnnotationRecord) {
    let folder = record
        .folder_id
        .as_deref()
        .map(|f| format!(" [{}]", f))
        .unwrap_or_default();
    println!("{}{}", record.key, folder);
    if !record.display_text.is_empty() {
        println!("    {}", record.display_text);
    }
}

async fn cmd_migrate(kv: Arc<dyn KvStore>, config: &Config) -> i32 {
    let coordinator = MigrationCoordinator::new(kv, &config.migration);
    let reports = coordinator.run().await;
    for report in &reports {
        if report.is_noop() {
            println!("{}: up to date", report.name);
        } else {
            println!(
                "{}: {} migrated, {} removed",
                report.name, report.keys_migrated, report.keys_removed
            );
        }
    }
    if reports.len() < coordinator.names().len() {
        eprintln!("Error: some migrations failed; see log output");
        return 1;
    }
    0
}

async fn cmd_records(store: &AnnotationStore, pins: bool, action: RecordAction) -> i32 {
    let collection = if pins { store.pins() } else { store.stars() };
    match action {
        RecordAction::List { url } => {
            let records = match url {
                Some(url) => collection.get_by_url(&url).await,
                None => collection.get_all().await,
            };
            if records.is_empty() {
                println!("No {}.", collection.family());
                return 0;
            }
            for record in &records {
                print_record(record);
            }
            0
        }
        RecordAction::Remove { key } => {
            if collection.remove(&key).await {
                println!("Removed '{}'", key);
                0
            } else {
                eprintln!("Error: '{}' not found", key);
                1
            }
        }
    }
}

async fn cmd_folders(store: &AnnotationStore, action: FolderAction) -> i32 {
    let result = match action {
        FolderAction::List => {
            let folders = store.folders().list().await;
            if folders.is_empty() {
                println!("No folders.");
            }
            for root in folders.iter().filter(|f| f.parent_id.is_none()) {
                println!("{}  {}", root.id, root.name);
                for child in folders.iter().filter(|f| f.parent_id.as_deref() == Some(root.id.as_str())) {
                    println!("  {}  {}", child.id, child.name);
                }
            }
            return 0;
        }
        FolderAction::Create { name, parent } => {
            let now = i64::try_from(SystemClock.now_ms()).unwrap_or(0);
            store
                .create_folder(&name, parent.as_deref(), now)
                .await
                .map(|f| println!("Created folder '{}' ({})", f.name, f.id))
        }
        FolderAction::Rename { id, name } => store
            .rename_folder(&id, &name)
            .await
            .map(|f| println!("Renamed folder {} to '{}'", f.id, f.name)),
        FolderAction::Delete { id } => store.delete_folder(&id).await.map(|d| {
            println!(
                "Deleted {} folder(s); {} star(s) moved",
                d.folders_removed.len(),
                d.records_reassigned
            )
        }),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_times(store: &AnnotationStore, action: TimesAction) -> i32 {
    match action {
        TimesAction::Show { url } => {
            let Some(record) = store.timestamps().get(&url).await else {
                eprintln!("Error: no time data for '{}'", url);
                return 1;
            };
            let fmt = |ms: i64| {
                chrono::DateTime::from_timestamp_millis(ms)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| ms.to_string())
            };
            println!("created:    {}", fmt(record.create_time));
            println!("last visit: {}", fmt(record.last_visit));
            for (key, ms) in &record.nodes {
                println!("  {}  {}", key, fmt(*ms));
            }
            0
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let kv = match open_store(cli.db, &config) {
        Ok(kv) => kv,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Migrate => cmd_migrate(kv, &config).await,
        other => {
            // Reads always see the current schema
            MigrationCoordinator::new(kv.clone(), &config.migration).run().await;
            let store = AnnotationStore::new(kv);
            match other {
                Commands::Stars { action } => cmd_records(&store, false, action).await,
                Commands::Pins { action } => cmd_records(&store, true, action).await,
                Commands::Folders { action } => cmd_folders(&store, action).await,
                Commands::Times { action } => cmd_times(&store, action).await,
                Commands::Migrate => 0,
            }
        }
    };
    std::process::exit(code);
}
