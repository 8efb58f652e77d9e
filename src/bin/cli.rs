//! HashKV CLI
//!
//! Command-line interface for a local HashKV data directory.

use std::process;

use clap::{Parser, Subcommand};
use hashkv::{Config, Store, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// HashKV CLI
#[derive(Parser, Debug)]
#[command(name = "hashkv")]
#[command(about = "Log-structured, hash-indexed key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./hashkv_data")]
    data_dir: String,

    /// Maximum segment size in bytes before rotation
    #[arg(short, long, default_value_t = hashkv::config::DEFAULT_MAX_SEGMENT_SIZE)]
    max_segment_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a JSON value under a key
    Put {
        /// The key to set
        #[arg(allow_negative_numbers = true)]
        key: i64,

        /// The value, as JSON (e.g. '{"name":"a"}' or '42')
        value: String,
    },

    /// Get the value of a key
    Get {
        /// The key to get
        #[arg(allow_negative_numbers = true)]
        key: i64,
    },

    /// Merge closed segments
    Compact,

    /// Show segment and index statistics
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hashkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> hashkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_segment_size(args.max_segment_size)
        .build();

    let store = Store::open(config)?;

    match args.command {
        Commands::Put { key, value } => {
            let value: Value = serde_json::from_str(&value)?;
            store.put(key, value)?;
            println!("OK");
        }
        Commands::Get { key } => {
            let value = store.get(key)?;
            println!("{}", value);
        }
        Commands::Compact => {
            let stats = store.compact()?;
            if stats.skipped {
                println!("nothing compacted ({} closed segments)", stats.segments_in);
            } else {
                println!(
                    "compacted {} segments into {}: {} records dropped, {} bytes saved",
                    stats.segments_in,
                    stats.segments_out,
                    stats.records_dropped(),
                    stats.bytes_saved()
                );
            }
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("data directory:   {}", store.data_dir().display());
            println!(
                "active segment:   {} ({} bytes)",
                stats.active_segment_id, stats.active_segment_size
            );
            println!("closed segments:  {:?}", stats.closed_segment_ids);
            println!("closed bytes:     {}", stats.closed_bytes);
            println!("keys:             {}", stats.key_count);
        }
    }

    store.close()
}
