//! SectorKV CLI
//!
//! Inspect and edit a flash image file from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sectorkv::export::Snapshot;
use sectorkv::value::{format_value, parse_value};
use sectorkv::{
    Config, FileFlash, KvError, KvStore, OpenMode, PartitionInfo, PartitionTable, Result, TypeFilter,
    ValueType,
};
use tracing_subscriber::{fmt, EnvFilter};

/// SectorKV CLI
#[derive(Parser, Debug)]
#[command(name = "sectorkv-cli")]
#[command(about = "Inspect and edit a SectorKV flash image")]
#[command(version)]
struct Args {
    /// Flash image file (created if missing)
    #[arg(short, long, default_value = "./sectorkv.img")]
    image: PathBuf,

    /// Number of sectors in the image
    #[arg(short = 'n', long, default_value = "8")]
    sectors: u64,

    /// Sector size in bytes
    #[arg(long, default_value = "4096")]
    sector_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Erase the image and start an empty store
    Format,

    /// Store a value
    Set {
        group: String,
        key: String,
        /// string, i8..u64, double, binary or blob
        value_type: String,
        /// The value; `@path` reads binary and blob values from a file
        value: String,
    },

    /// Print a value
    Get { group: String, key: String },

    /// Delete a key
    Del { group: String, key: String },

    /// Delete every key of a group
    DelGroup { group: String },

    /// List entries of one group, or of every group
    List { group: Option<String> },

    /// Print space usage
    Status,

    /// Print the state and live records of one sector
    DumpSector { index: usize },

    /// Write every entry to a snapshot file
    Export { file: PathBuf },

    /// Load entries from a snapshot file
    Import { file: PathBuf },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sectorkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("SectorKV CLI v{}", sectorkv::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder().sector_size(args.sector_size).build();
    let partition = config.default_partition.clone();

    let size = args.sectors * args.sector_size as u64;
    let device = Arc::new(FileFlash::open(&args.image, size)?);
    let table = PartitionTable::new().with(partition.as_str(), PartitionInfo::new(device, 0, size));
    let store = KvStore::new(config, table)?;

    if let Commands::Format = args.command {
        store.erase(&partition)?;
        store.init(&partition)?;
        println!("formatted {} ({} sectors)", args.image.display(), args.sectors);
        return Ok(());
    }

    store.init(&partition)?;

    match args.command {
        Commands::Format => {}

        Commands::Set {
            group,
            key,
            value_type,
            value,
        } => {
            let ty = ValueType::parse(&value_type)?;
            let data = match value.strip_prefix('@') {
                Some(path) if matches!(ty, ValueType::Binary | ValueType::Blob) => {
                    std::fs::read(path)?
                }
                _ => parse_value(ty, &value)?,
            };
            let handle = store.open(&partition, &group, OpenMode::ReadWrite)?;
            store.set_raw(handle, &key, ty, &data)?;
            store.close(handle)?;
            println!("OK");
        }

        Commands::Get { group, key } => {
            let handle = store.open(&partition, &group, OpenMode::ReadOnly)?;
            let (ty, bytes) = store.get_raw(handle, &key)?;
            store.close(handle)?;
            println!("{} ({}, {} bytes)", format_value(ty, &bytes), ty.name(), bytes.len());
        }

        Commands::Del { group, key } => {
            let handle = store.open(&partition, &group, OpenMode::ReadWrite)?;
            store.del_key(handle, &key)?;
            store.close(handle)?;
            println!("OK");
        }

        Commands::DelGroup { group } => {
            let handle = store.open(&partition, &group, OpenMode::ReadWrite)?;
            store.del_group(handle)?;
            store.close(handle)?;
            println!("OK");
        }

        Commands::List { group } => {
            let groups = match group {
                Some(g) => vec![g],
                None => store.with_engine(&partition, |engine| {
                    Ok(engine
                        .groups()
                        .iter()
                        .map(|(_, name)| name.to_string_lossy())
                        .collect())
                })?,
            };
            for group in groups {
                let mut iter = store.entry_find(&partition, &group, TypeFilter::Any)?;
                while let Some(entry) = iter.next()? {
                    let value = iter
                        .data_vec()
                        .map(|bytes| format_value(entry.value_type, &bytes))
                        .unwrap_or_else(|e| format!("<{}>", e));
                    println!(
                        "{}/{} [{}, {} bytes] = {}",
                        group,
                        entry.key,
                        entry.value_type.name(),
                        entry.size,
                        value
                    );
                }
                iter.release();
            }
        }

        Commands::Status => {
            let status = store.status(&partition)?;
            println!("total:   {} bytes", status.space.total);
            println!("used:    {} bytes", status.space.used);
            println!("dropped: {} bytes", status.space.dropped);
            println!("free:    {} bytes", status.space.free);
            println!("groups:  {}", status.group_count);
        }

        Commands::DumpSector { index } => {
            store.with_engine(&partition, |engine| {
                let sector = engine
                    .sector_manager()
                    .sectors()
                    .get(index)
                    .ok_or_else(|| KvError::InvalidParam(format!("no sector {}", index)))?;
                println!(
                    "sector {}: state {:?}, serial {}, next_free {}, used {}, dropped {}",
                    index,
                    sector.state(),
                    sector.serial(),
                    sector.next_free_slice(),
                    sector.used_slice(),
                    sector.dropped_slice()
                );
                for record in engine.sector_records(index)? {
                    let h = &record.header;
                    println!(
                        "  slot {:3} span {:3} group {:2} seg {:#04x} {:>12} {}",
                        record.location.slot,
                        h.span(),
                        h.group,
                        h.seg_id,
                        h.value_type.name(),
                        h.name
                    );
                }
                Ok(())
            })?;
        }

        Commands::Export { file } => {
            let snapshot = store.export(&partition)?;
            snapshot.write_to(&file)?;
            println!("exported {} entries to {}", snapshot.len(), file.display());
        }

        Commands::Import { file } => {
            let snapshot = Snapshot::read_from(&file)?;
            let count = store.import(&partition, &snapshot)?;
            println!("imported {} entries", count);
        }
    }

    store.deinit(&partition)
}
