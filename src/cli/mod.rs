// src/cli/mod.rs
//! CLI definitions for orbis-deploy
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Build commands:
//! - `stage` - Map a stage directory and write its GP4 project
//! - `package` - Stage and package one or more title ids in parallel
//! - `extract` - Unpack an existing package
//! - `shorten` - Show how deep directories are shortened
//!
//! Devkit commands:
//! - `devices` - List the target manager's default devices
//! - `device <target> ...` - Power, connection, install, launch and settings
//! - `pgo` - Run an instrumented build and merge its profiles
//! - `postmortem` - Collect and analyze crash dumps

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod device;

pub use device::DeviceCommands;

#[derive(Parser)]
#[command(name = "orbis-deploy")]
#[command(author = "Orbis Deploy Contributors")]
#[command(version)]
#[command(about = "PS4 staging, GP4 packaging and devkit management", long_about = None)]
pub struct Cli {
    /// Path to the deploy configuration
    #[arg(short, long, global = true, default_value = "deploy.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // =========================================================================
    // Build Commands
    // =========================================================================
    /// Map a stage directory into a GP4 project
    Stage {
        /// Staged build directory
        stage_dir: PathBuf,

        /// Title id to stage for (defaults to the first configured title)
        #[arg(short, long)]
        title: Option<String>,

        /// Output directory for the GP4 project (defaults to packaging.output_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print every file with its chunk and layer
        #[arg(short, long)]
        verbose: bool,
    },

    /// Stage and package title ids in parallel
    Package {
        /// Staged build directory
        stage_dir: PathBuf,

        /// Title ids to package (all configured titles when omitted)
        #[arg(short, long = "title")]
        titles: Vec<String>,
    },

    /// Unpack a package
    Extract {
        /// Package file
        package: PathBuf,

        /// Output directory
        output: PathBuf,
    },

    /// Show the shortened form of directory paths
    Shorten {
        /// Directory paths to shorten
        #[arg(required = true)]
        paths: Vec<String>,
    },

    // =========================================================================
    // Devkit Commands
    // =========================================================================
    /// List the target manager's default devices
    Devices {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Operate on a devkit
    Device {
        /// Devkit name or IP address
        target: String,

        #[command(subcommand)]
        command: DeviceCommands,
    },

    /// Run an instrumented build and merge its profiles
    Pgo {
        /// Devkit name or IP address
        target: String,

        /// Working directory on the device (defaults to /data/<sandbox>)
        #[arg(long)]
        working_dir: Option<String>,

        /// Executable relative to the working directory
        #[arg(long, default_value = "eboot.bin")]
        elf: String,

        /// Arguments passed to the title
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,
    },

    /// Collect and analyze crash dumps
    Postmortem {
        /// Devkit to pull dumps from (host dumps only when omitted)
        #[arg(short, long)]
        target: Option<String>,

        /// Host directory holding the dumps
        #[arg(long, default_value = "dumps")]
        dump_dir: PathBuf,

        /// Analyze only the newest dump
        #[arg(long)]
        latest: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}
