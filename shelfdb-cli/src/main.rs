use clap::{Parser, Subcommand, ValueEnum};
use shelfdb::config::parse_config;
use shelfdb::integrity;
use shelfdb::registry::PathRegistry;
use shelfdb::{IntegrityReport, LoadSource, Store, StoreConfig};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// shelfdb CLI — inspect and maintain a shelfdb data directory
#[derive(Parser)]
#[command(name = "shelfdb", version, about)]
struct Cli {
    /// Path to a shelfdb.yaml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file; default: ./data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print a document
    Get {
        /// Document key or file name (e.g. TRACKERS, club.json)
        doc: String,
    },

    /// Replace a document with JSON read from a file or stdin
    Put {
        /// Document key or file name
        doc: String,
        /// Read the new value from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Read the new value from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Reset a document to an empty object (or array)
    Clear {
        /// Document key or file name
        doc: String,
        /// Reset to [] instead of {}
        #[arg(long)]
        array: bool,
    },

    /// Create any missing document files
    Ensure,

    /// Parse and validate every document
    Verify,

    /// Manage snapshots
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Run the backup scheduler in the foreground
    Schedule {
        /// Stop after this many passes (default: run until killed)
        #[arg(long)]
        runs: Option<u64>,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Snapshot all documents now
    Create,
    /// List snapshots, newest first
    List,
    /// Restore all documents from a snapshot
    Restore {
        /// Snapshot name as shown by `backup list`
        name: String,
    },
    /// Delete snapshots older than the retention window
    Cleanup,
    /// Show backup directory, counts and retention settings
    Status,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<StoreConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => parse_config(path)?,
        None => StoreConfig::new("data"),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

/// Check the data directory as it is. Opening a `Store` would seed missing
/// documents first and hide them from the report.
fn verify(config: &StoreConfig) -> Result<IntegrityReport, Box<dyn std::error::Error>> {
    let registry = PathRegistry::from_config(config)?;
    Ok(integrity::verify_all(&registry))
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    if let Command::Verify = cli.command {
        let report = verify(&config)?;
        print_output(&serde_json::to_value(&report)?, &cli.format)?;
        return Ok(if report.valid { 0 } else { 2 });
    }

    let store = Store::open(config)?;

    match &cli.command {
        Command::Get { doc } => {
            let loaded = store.load_value(doc)?;
            match loaded.source {
                LoadSource::Primary => {}
                LoadSource::Backup => log::warn!("{doc} was damaged and recovered from backup"),
                LoadSource::Default => log::warn!("{doc} was empty or unreadable; showing default"),
            }
            print_output(&loaded.value, &cli.format)?;
        }

        Command::Put { doc, file, stdin } => {
            let value = read_value(file.as_ref(), *stdin)?;
            store.save_json(doc, &value)?;
            print_output(&serde_json::json!({ "ok": true, "document": doc }), &cli.format)?;
        }

        Command::Clear { doc, array } => {
            store.clear_file(doc, *array)?;
            print_output(&serde_json::json!({ "ok": true, "cleared": doc }), &cli.format)?;
        }

        Command::Ensure => {
            store.ensure_all_files()?;
            let documents: Vec<_> = store.registry().entries().map(|e| e.key.clone()).collect();
            print_output(&serde_json::json!({ "ok": true, "documents": documents }), &cli.format)?;
        }

        Command::Verify => unreachable!("verify runs before the store is opened"),

        Command::Backup { command } => match command {
            BackupCommand::Create => {
                let snapshot = store.create_backup()?;
                print_output(&serde_json::to_value(&snapshot)?, &cli.format)?;
            }
            BackupCommand::List => {
                let backups = store.list_backups()?;
                print_output(&serde_json::to_value(&backups)?, &cli.format)?;
            }
            BackupCommand::Restore { name } => {
                let report = store.restore_backup(name)?;
                print_output(&serde_json::to_value(&report)?, &cli.format)?;
            }
            BackupCommand::Cleanup => {
                let report = store.cleanup_old_backups()?;
                print_output(&serde_json::to_value(report)?, &cli.format)?;
            }
            BackupCommand::Status => {
                let status = store.backup_status()?;
                print_output(&serde_json::to_value(&status)?, &cli.format)?;
            }
        },

        Command::Schedule { runs } => {
            let scheduler = store.start_backup_scheduler();
            match runs {
                Some(limit) => {
                    while scheduler.runs() < *limit {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    let last = scheduler.last_run();
                    scheduler.stop();
                    print_output(&serde_json::to_value(&last)?, &cli.format)?;
                }
                None => loop {
                    std::thread::sleep(Duration::from_secs(60));
                },
            }
        }
    }

    Ok(0)
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn read_value(
    file: Option<&PathBuf>,
    stdin: bool,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let content = if let Some(path) = file {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?
    } else if stdin {
        use std::io::Read;
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        content
    } else {
        return Err("put needs --file or --stdin".into());
    };
    Ok(serde_json::from_str(&content)?)
}
