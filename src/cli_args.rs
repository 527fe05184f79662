//! Command-line argument definitions for the `peggle-assets` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and convert Peggle PAK archives, config files, and level binaries.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Arg {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List, extract from, or build a PAK archive.
    Pak {
        #[command(subcommand)]
        command: PakCommand,
    },
    /// Decode or encode a level binary (`.dat`).
    Level {
        #[command(subcommand)]
        command: LevelCommand,
    },
    /// Parse or emit a config text file (`stages.cfg`, `trophy.cfg`, `characters.cfg`).
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PakCommand {
    /// Print every entry name in a PAK archive.
    List {
        /// Path to the `.pak` file.
        pak: PathBuf,
    },
    /// Extract a PAK archive's entries to a directory tree.
    Extract {
        /// Path to the `.pak` file.
        pak: PathBuf,
        /// Directory to extract into (created if missing).
        out_dir: PathBuf,
    },
    /// Build a PAK archive from a directory tree.
    Pack {
        /// Directory to pack.
        in_dir: PathBuf,
        /// Path to write the `.pak` file.
        pak: PathBuf,
        /// XOR-obfuscate the output with the original game's key byte.
        #[arg(long)]
        obfuscate: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum LevelCommand {
    /// Decode a level binary to JSON.
    Decode {
        /// Path to the `.dat` file.
        input: PathBuf,
        /// Path to write JSON to (defaults to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Encode a level binary from JSON.
    Encode {
        /// Path to the JSON file (as produced by `level decode`).
        input: PathBuf,
        /// Path to write the `.dat` file.
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Parse a config file and print it as JSON.
    Parse {
        /// Which dialect to parse as.
        #[arg(long, value_enum)]
        kind: ConfigKind,
        /// Path to the `.cfg` file.
        input: PathBuf,
    },
    /// Emit a config file from JSON.
    Emit {
        /// Which dialect to emit.
        #[arg(long, value_enum)]
        kind: ConfigKind,
        /// Path to the JSON file.
        input: PathBuf,
        /// Path to write the `.cfg` file.
        output: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ConfigKind {
    Stage,
    Trophy,
    Character,
}

/// Parses `std::env::args()` into an [`Arg`], exiting the process on error
/// (clap prints usage and the relevant message itself).
pub fn parse_args() -> Arg {
    Arg::parse()
}
