//! Filespace Admin - operator command line interface
//!
//! Inspects the filespace directory kept in a local record store and issues
//! corrective updates against it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use filespace_common::{
    BlankPaddedLocation, Config, Error, FilespaceOid, NodeId, PersistentState,
};
use filespace_directory::{
    DirectoryEntry, DirectorySettings, FilespaceDirectory, FixRequest, OrderedWriteLock,
};
use filespace_store::{
    filespace_node, FieldValue, LogStore, LogStoreConfig, PersistedStore, RecordKind,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "filespace-admin")]
#[command(about = "Filespace directory admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "FILESPACE_CONFIG",
        default_value = "/etc/filespace/filespace.toml"
    )]
    config: String,

    /// Directory holding the record store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory cache capacity
    #[arg(long)]
    max_filespaces: Option<usize>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert a persisted filespace record
    Add {
        /// Filespace oid
        oid: u32,
        primary_node: i16,
        primary_path: String,
        mirror_node: i16,
        mirror_path: String,
        /// Persistent state of the new record
        #[arg(long, default_value = "created")]
        state: PersistentState,
    },
    /// List every directory entry
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one directory entry
    Show {
        /// Filespace oid
        oid: u32,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Overwrite the primary and mirror placement of one filespace
    Fix {
        /// Filespace oid
        oid: u32,
        primary_node: i16,
        primary_path: String,
        mirror_node: i16,
        mirror_path: String,
        /// Durably flush the store write
        #[arg(long)]
        flush: bool,
    },
    /// Rewrite the record log, dropping superseded operations
    Compact,
}

/// Printable form of a directory entry
#[derive(Debug, Serialize)]
struct EntryView {
    oid: u32,
    primary_node: i16,
    primary_location: String,
    mirror_node: i16,
    mirror_location: String,
    state: String,
    serial_num: u64,
    locator: String,
}

impl From<&DirectoryEntry> for EntryView {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            oid: entry.oid.as_u32(),
            primary_node: entry.primary_node.as_i16(),
            primary_location: entry.primary_path(),
            mirror_node: entry.mirror_node.as_i16(),
            mirror_location: entry.mirror_path(),
            state: entry.state.to_string(),
            serial_num: entry.serial_num,
            locator: entry.locator.to_string(),
        }
    }
}

/// Load the config file if present, then apply command line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("failed to load {}", args.config))?
    } else {
        Config::default()
    };

    // CLI takes precedence
    if let Some(data_dir) = &args.data_dir {
        config.store.data_dir.clone_from(data_dir);
    }
    if let Some(max_filespaces) = args.max_filespaces {
        config.directory.max_filespaces = max_filespaces;
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<LogStore>> {
    let store = LogStore::open(LogStoreConfig::from(&config.store)).with_context(|| {
        format!(
            "failed to open record store in {}",
            config.store.data_dir.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn open_directory(config: &Config, store: &Arc<LogStore>) -> Result<FilespaceDirectory> {
    let directory = FilespaceDirectory::open(
        Arc::clone(store) as Arc<dyn PersistedStore>,
        Arc::new(OrderedWriteLock::new()),
        DirectorySettings::from(config),
    )?;
    Ok(directory)
}

fn filespace_exists(store: &LogStore, oid: u32) -> Result<bool> {
    let mut found = false;
    store.scan(RecordKind::FilespaceNode, &mut |record| {
        found |= record.value(filespace_node::FILESPACE_OID)?.as_oid() == Some(oid);
        Ok(())
    })?;
    Ok(found)
}

fn print_entry(entry: &DirectoryEntry) {
    println!("Filespace: {}", entry.oid);
    println!("  Primary:  node {} {}", entry.primary_node, entry.primary_path());
    println!("  Mirror:   node {} {}", entry.mirror_node, entry.mirror_path());
    println!("  State:    {}", entry.state);
    println!("  Record:   {} (serial {})", entry.locator, entry.serial_num);
}

fn print_table(entries: &[DirectoryEntry]) {
    if entries.is_empty() {
        println!("No filespaces found");
        return;
    }
    println!(
        "{:<10} {:<6} {:<32} {:<6} {:<32} {:<14} {:<10}",
        "OID", "PNODE", "PRIMARY", "MNODE", "MIRROR", "STATE", "RECORD"
    );
    println!("{}", "-".repeat(116));
    for entry in entries {
        println!(
            "{:<10} {:<6} {:<32} {:<6} {:<32} {:<14} {:<10}",
            entry.oid,
            entry.primary_node,
            entry.primary_path(),
            entry.mirror_node,
            entry.mirror_path(),
            entry.state,
            entry.locator.to_string()
        );
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Config file: {}", args.config);
    debug!("Data directory: {}", config.store.data_dir.display());

    let store = open_store(&config)?;

    match args.command {
        Commands::Add {
            oid,
            primary_node,
            primary_path,
            mirror_node,
            mirror_path,
            state,
        } => {
            if filespace_exists(&store, oid)? {
                bail!("filespace {oid} already has a persisted record");
            }
            let record = store.insert(
                RecordKind::FilespaceNode,
                vec![
                    FieldValue::Oid(oid),
                    FieldValue::Int16(primary_node),
                    FieldValue::Location(BlankPaddedLocation::encode(Some(&primary_path))?),
                    FieldValue::Int16(mirror_node),
                    FieldValue::Location(BlankPaddedLocation::encode(Some(&mirror_path))?),
                    FieldValue::State(state),
                ],
            )?;
            store.sync()?;
            info!("Added filespace {} at {}", oid, record.locator);
            println!(
                "Added filespace {oid} at {} (serial {})",
                record.locator, record.serial_num
            );
        }
        Commands::List { json } => {
            let directory = open_directory(&config, &store)?;
            let entries = directory.entries()?;
            if json {
                let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_table(&entries);
            }
        }
        Commands::Show { oid, json } => {
            let directory = open_directory(&config, &store)?;
            let oid = FilespaceOid::new(oid);
            let entry = directory
                .lookup(oid)?
                .ok_or(Error::NotFound { oid })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&EntryView::from(&entry))?);
            } else {
                print_entry(&entry);
            }
        }
        Commands::Fix {
            oid,
            primary_node,
            primary_path,
            mirror_node,
            mirror_path,
            flush,
        } => {
            let directory = open_directory(&config, &store)?;
            let mut request = FixRequest::new(
                FilespaceOid::new(oid),
                NodeId::new(primary_node),
                primary_path,
                NodeId::new(mirror_node),
                mirror_path,
            );
            if flush {
                request = request.flush_durably(true);
            }
            let outcome = directory.fix(&request)?;
            store.sync()?;
            info!("Fix of filespace {}: store {}", oid, outcome.store);
            println!("t");
        }
        Commands::Compact => {
            let before = store.log_size();
            store.compact()?;
            println!(
                "Compacted {}: {} -> {} bytes",
                store.log_path().display(),
                before,
                store.log_size()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fix() {
        let args = Args::try_parse_from([
            "filespace-admin",
            "--data-dir",
            "/tmp/fs",
            "fix",
            "10",
            "3",
            "/fs1/p2",
            "4",
            "/fs1/m2",
            "--flush",
        ])
        .unwrap();
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/fs")));
        match args.command {
            Commands::Fix {
                oid,
                primary_node,
                mirror_path,
                flush,
                ..
            } => {
                assert_eq!(oid, 10);
                assert_eq!(primary_node, 3);
                assert_eq!(mirror_path, "/fs1/m2");
                assert!(flush);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_add_state() {
        let args = Args::try_parse_from([
            "filespace-admin",
            "add",
            "10",
            "1",
            "/p",
            "2",
            "/m",
            "--state",
            "drop-pending",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Commands::Add {
                state: PersistentState::DropPending,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filespace.toml");
        std::fs::write(
            &path,
            "[directory]\nmax_filespaces = 4\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let args = Args::try_parse_from([
            "filespace-admin",
            "--config",
            path.to_str().unwrap(),
            "--max-filespaces",
            "8",
            "compact",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.directory.max_filespaces, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_entry_view() {
        let mut entry = DirectoryEntry::zeroed(FilespaceOid::new(10));
        entry.primary_location = BlankPaddedLocation::encode(Some("/fs1/p")).unwrap();
        let json = serde_json::to_value(EntryView::from(&entry)).unwrap();
        assert_eq!(json["oid"], 10);
        assert_eq!(json["primary_location"], "/fs1/p");
        assert_eq!(json["mirror_location"], "");
        assert_eq!(json["locator"], "(0,0)");
    }
}
