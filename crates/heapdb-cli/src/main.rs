//! HeapDB command-line tool
//!
//! Inspects, dumps, and bulk-loads heap files through the buffer pool.
//!
//! # Usage
//!
//! ```bash
//! # Load comma-separated rows into a table file
//! heapdb load users.dat --schema int:id,str:name --input users.csv
//!
//! # Print every row
//! heapdb dump users.dat --schema int:id,str:name
//!
//! # Page occupancy
//! heapdb info users.dat --schema int,str
//!
//! # Show the effective configuration
//! heapdb --config heapdb.toml config
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heapdb_common::config::EngineConfig;
use heapdb_storage::tuple::Schema;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Session;

/// HeapDB heap file tool
#[derive(Parser, Debug)]
#[command(
    name = "heapdb",
    author = "HeapDB Contributors",
    version,
    about = "Inspect and load HeapDB heap files",
    long_about = "Reads and writes HeapDB heap files through a buffer pool.\n\n\
                  Each command runs as a single transaction and commits on success."
)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Buffer pool capacity in pages
    #[arg(long, env = "HEAPDB_POOL_PAGES", global = true)]
    pool_pages: Option<usize>,

    /// Page size in bytes
    #[arg(long, env = "HEAPDB_PAGE_SIZE", global = true)]
    page_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", env = "HEAPDB_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show page layout and occupancy
    Info(TableArgs),

    /// Print every row, tab-separated
    Dump(TableArgs),

    /// Insert comma-separated rows in one transaction
    Load {
        #[command(flatten)]
        table: TableArgs,

        /// Input file, one row per line (stdin if omitted)
        #[arg(short = 'i', long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
struct TableArgs {
    /// Heap file
    file: PathBuf,

    /// Row schema, e.g. `int:id,str:name`
    #[arg(short = 's', long)]
    schema: String,
}

impl TableArgs {
    fn open(&self, config: &EngineConfig) -> Result<Session> {
        let schema = Schema::parse(&self.schema)
            .with_context(|| format!("invalid schema '{}'", self.schema))?;
        Session::open(&self.file, schema, config)
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    // Load configuration
    let config = load_config(&args)?;

    match &args.command {
        Command::Info(table) => {
            let session = table.open(&config)?;
            print!("{}", commands::info(&session)?);
        }
        Command::Dump(table) => {
            let session = table.open(&config)?;
            let stdout = io::stdout();
            let count = commands::dump(&session, &mut stdout.lock())?;
            info!(rows = count, "dump complete");
        }
        Command::Load { table, input } => {
            let session = table.open(&config)?;
            let count = match input {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    commands::load(&session, BufReader::new(file))?
                }
                None => commands::load(&session, io::stdin().lock())?,
            };
            session
                .pool()
                .flush_all_pages()
                .context("failed to flush buffer pool")?;
            println!("loaded {count} rows into {}", table.file.display());
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_new(format!(
        "heapdb={level},heapdb_storage={level},heapdb_txn={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => EngineConfig::default(),
    };

    // Override with command line arguments
    if let Some(pages) = args.pool_pages {
        config.pool_pages = pages;
    }
    if let Some(size) = args.page_size {
        config.page_size = size;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<EngineConfig> {
    EngineConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}
