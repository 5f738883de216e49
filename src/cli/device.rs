// src/cli/device.rs
//! Devkit subcommands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Show power and connection state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Power the devkit on
    PowerOn,

    /// Power the devkit off
    PowerOff,

    /// Reboot the devkit
    Reboot,

    /// Connect to the devkit
    Connect,

    /// Disconnect from the devkit
    Disconnect,

    /// Install a staged build
    Install {
        /// Staged build directory
        stage_dir: PathBuf,

        /// Copy to device storage instead of running from the host
        #[arg(long)]
        deploy: bool,

        /// Locally built executable to overlay when newer than the staged one
        #[arg(long)]
        executable: Option<PathBuf>,

        /// Symbol files overlaid with the executable
        #[arg(long = "symbols")]
        symbols: Vec<PathBuf>,

        /// Directory under /data (defaults to the configured sandbox)
        #[arg(long)]
        sandbox: Option<String>,
    },

    /// Launch a title
    Run {
        /// Working directory on the device
        working_dir: String,

        /// Executable relative to the working directory
        #[arg(long, default_value = "eboot.bin")]
        elf: String,

        /// Arguments passed to the title
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,
    },

    /// Save a screenshot
    Screenshot {
        /// Output image on the host
        output: PathBuf,
    },

    /// Export device settings
    ExportSettings {
        /// Output XML file
        output: PathBuf,
    },

    /// Import device settings (reboots the devkit)
    ImportSettings {
        /// Settings XML file
        input: PathBuf,
    },

    /// List running processes
    Processes,

    /// Kill a process
    Kill {
        /// Process id (decimal or 0x hex)
        pid: String,
    },
}
