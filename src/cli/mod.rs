pub mod cleanup;

use std::path::PathBuf;

use clap::Parser;

use crate::engine::OutputMode;
use crate::flag::FlagType;

/// Command line arguments of the `flagprune` binary.
#[derive(Parser, Debug)]
#[command(
    name = "flagprune",
    version,
    about = "Remove a feature flag from Python sources by fixing its value"
)]
pub struct Cli {
    /// Python files or directories to clean up. Directories are searched
    /// for `.py` files.
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Key of the flag to remove.
    #[arg(short, long)]
    pub key: String,

    /// Declared type of the flag value.
    #[arg(short = 't', long = "type", value_enum, ignore_case = true)]
    pub flag_type: FlagType,

    /// Value the flag is fixed to.
    #[arg(short, long)]
    pub value: String,

    /// Print the results or overwrite the files. Defaults to the config
    /// file, then to console.
    #[arg(short, long, value_enum, ignore_case = true)]
    pub output: Option<OutputMode>,

    /// Variable holding the flag key in the sources. May be repeated.
    #[arg(short, long = "alias")]
    pub aliases: Vec<String>,

    /// Glob of the files to clean up in directories. May be repeated.
    /// Replaces the config file's `include`.
    #[arg(long)]
    pub include: Vec<String>,

    /// Glob of the files to skip in directories. May be repeated. Replaces
    /// the config file's `exclude`.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Path to a flagprune.toml. Defaults to the one in the working directory.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log every fixpoint iteration.
    #[arg(long)]
    pub verbose: bool,
}
