//! DAS Condenser CLI
//!
//! Command-line front end for the `das-condenser` library.
//!
//! # Usage
//!
//! ```bash
//! # Write a default configuration to edit
//! das-condense init-config condenser.json
//!
//! # Condense every file of the configured schedule
//! das-condense condense --config condenser.json --input-dir /data/das --output combined.npz
//!
//! # Condense an explicit file list, skipping unreadable files
//! das-condense condense --input-dir /data/das --output out.npz --skip-unreadable a.npy b.npy
//!
//! # Summarize an artifact
//! das-condense inspect combined.npz --files
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// DAS spectral condenser
#[derive(Parser, Debug)]
#[command(name = "das-condense")]
#[command(author, version, about = "Condense DAS recordings into indexed spectral tensors")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Condense raw `.npy` blocks into a combined `.npz` artifact
    Condense(CondenseArgs),

    /// Print a summary of a combined artifact
    Inspect(InspectArgs),

    /// Write a default configuration file
    InitConfig(InitConfigArgs),

    /// Display version information
    Version,
}

/// Arguments for the condense command
#[derive(Args, Debug)]
pub struct CondenseArgs {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the raw `.npy` blocks
    #[arg(short, long, value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Path of the `.npz` artifact to write
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Sampling rate recorded for every input file, in Hz
    #[arg(long)]
    pub file_sampling_rate: Option<f64>,

    /// Condense files in parallel
    #[arg(long)]
    pub parallel: bool,

    /// NaN-fill unreadable files instead of aborting
    #[arg(long)]
    pub skip_unreadable: bool,

    /// File names to condense, in order (defaults to the configured schedule)
    pub files: Vec<String>,
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Artifact to read
    pub path: PathBuf,

    /// Also print one row per file
    #[arg(short, long)]
    pub files: bool,
}

/// Arguments for the init-config command
#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}
