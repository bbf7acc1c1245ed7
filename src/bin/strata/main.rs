mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use strata::Format;

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Build and inspect incremental, partitioned columnar datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

/// Built-in extractor selection.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExtractorKind {
    /// One record per line of a JSON Lines file
    Jsonl,
    /// One record per JSON document
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or extend a dataset from files matching a glob pattern
    Build {
        /// Glob pattern selecting source files (quote it to stop shell expansion)
        pattern: String,
        /// Destination directory
        dest: PathBuf,
        /// JSON build config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extend an existing dataset with new or changed files
        #[arg(long)]
        incremental: bool,
        /// Parallel workers (0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Partition format (parquet, ipc)
        #[arg(long)]
        format: Option<Format>,
        #[arg(long, value_enum, default_value = "jsonl")]
        extractor: ExtractorKind,
        /// Detect changes by content hash instead of modification time
        #[arg(long)]
        content_hash: bool,
        /// Skip files whose extraction fails instead of aborting
        #[arg(long)]
        skip_failed: bool,
        /// Do not add file_path / link_target / mod_time columns
        #[arg(long)]
        no_metadata: bool,
    },
    /// List partition files of a dataset
    Files {
        dest: PathBuf,
    },
    /// Print the reconciled schema of a dataset
    Schema {
        dest: PathBuf,
    },
    /// Print the rows of a dataset as a table
    Read {
        dest: PathBuf,
        /// Maximum rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Build {
            pattern,
            dest,
            config,
            incremental,
            workers,
            format,
            extractor,
            content_hash,
            skip_failed,
            no_metadata,
        } => commands::build(commands::BuildArgs {
            pattern,
            dest,
            config,
            incremental,
            workers,
            format,
            extractor,
            content_hash,
            skip_failed,
            no_metadata,
        }),
        Commands::Files { dest } => commands::files(&dest),
        Commands::Schema { dest } => commands::schema(&dest),
        Commands::Read { dest, limit } => commands::read(&dest, limit),
    }
}
