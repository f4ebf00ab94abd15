//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands. The
//! default command is `build`, matching the common invocation `tsugite`.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// A CMake-to-Ninja firmware build bridge driven by the CMake file API.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project source directory.
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    pub project_dir: Utf8PathBuf,

    /// Build output directory (defaults to `<project>/.tsugite`).
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<Utf8PathBuf>,

    /// Vendor framework root (defaults to the `TSUGITE_FRAMEWORK_PATH`
    /// environment variable).
    #[arg(long, value_name = "DIR")]
    pub framework: Option<Utf8PathBuf>,

    /// Chip target identifier passed to the generator.
    #[arg(long, value_name = "CHIP", default_value = "esp32")]
    pub mcu: String,

    /// Board identifier, used for diagnostics.
    #[arg(long, value_name = "BOARD", default_value = "generic")]
    pub board: String,

    /// Cross-toolchain prefix (defaults to `xtensa-<mcu>-elf-`).
    #[arg(long, value_name = "PREFIX")]
    pub toolchain_prefix: Option<String>,

    /// Partition table CSV (defaults to `<project>/partitions.csv` when
    /// present).
    #[arg(long, value_name = "FILE")]
    pub partitions: Option<Utf8PathBuf>,

    /// Extra directory prepended to the generator's search path (toolchain
    /// `bin`, ninja, the generator's interpreter); repeatable. The
    /// `TSUGITE_TOOL_PATH` path list is appended after these.
    #[arg(long = "tool-dir", value_name = "DIR")]
    pub tool_dirs: Vec<Utf8PathBuf>,

    /// Per-file source filter expression. Not supported for CMake-driven
    /// projects; accepted here only to produce a clear error.
    #[arg(long, value_name = "FILTER", hide = true)]
    pub src_filter: Option<String>,

    /// Build with the debug-flag policy applied.
    #[arg(long)]
    pub debug: bool,

    /// Set the number of parallel build jobs.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional subcommand to execute; defaults to `build` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Build(BuildArgs {
                targets: Vec::new(),
            }));
        }
        self
    }
}

/// Arguments accepted by the `build` command.
#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct BuildArgs {
    /// A list of specific targets to build. The pseudo-target `debug`
    /// selects the debug-flag policy instead of naming a build output.
    pub targets: Vec<String>,
}

/// Available top-level commands for tsugite.
#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Configure, translate, and build the firmware image.
    Build(BuildArgs),

    /// Write the generated Ninja file without invoking Ninja.
    Manifest {
        /// Output path for the generated Ninja file; use `-` for stdout.
        #[arg(value_name = "FILE")]
        file: Utf8PathBuf,
    },

    /// Remove build artefacts via `ninja -t clean`.
    Clean,

    /// Display the build dependency graph via `ninja -t graph`.
    Graph,
}
