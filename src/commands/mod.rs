// src/commands/mod.rs
//! Command handlers for the orbis-deploy CLI

mod build;
mod device;
mod profile;

pub use build::{cmd_extract, cmd_package, cmd_shorten, cmd_stage};
pub use device::{cmd_device, cmd_devices};
pub use profile::{cmd_pgo, cmd_postmortem};

use anyhow::{Context, Result};
use orbis_deploy::device::{DeviceTools, Devkit, DevkitOptions};
use orbis_deploy::package::PublishTool;
use orbis_deploy::{BuildSession, DeployConfig, VendorTool};
use std::path::Path;
use std::time::Duration;

/// Load deploy.toml (defaults when the file does not exist)
pub(crate) fn load_config(path: &Path) -> Result<DeployConfig> {
    DeployConfig::from_file_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

pub(crate) fn device_tools(config: &DeployConfig) -> DeviceTools {
    DeviceTools {
        target: VendorTool::system(&config.tools.target),
        control: VendorTool::system(&config.tools.control),
    }
}

pub(crate) fn publish_tool(config: &DeployConfig) -> PublishTool {
    PublishTool::new(
        VendorTool::system(&config.tools.publish),
        Duration::from_secs(config.packaging.timeout_secs),
    )
}

pub(crate) fn open_devkit(
    config: &DeployConfig,
    target: &str,
    session: &mut BuildSession,
) -> Result<Devkit> {
    Devkit::open(
        target,
        device_tools(config),
        DevkitOptions::from(&config.devkit),
        session,
    )
    .with_context(|| format!("Failed to open devkit {}", target))
}
