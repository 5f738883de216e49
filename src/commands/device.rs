// src/commands/device.rs

//! Devkit commands

use super::{device_tools, load_config, open_devkit};
use crate::cli::DeviceCommands;
use anyhow::{Context, Result};
use orbis_deploy::BuildSession;
use orbis_deploy::device::{
    ConnectionState, DevkitOptions, InstallRequest, PowerStatus, default_devices,
};
use serde::Serialize;
use std::path::Path;

/// List the target manager's default devices
pub fn cmd_devices(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = BuildSession::new();
    let devices = default_devices(
        &device_tools(&config),
        &DevkitOptions::from(&config.devkit),
        &mut session,
    )
    .context("Failed to list devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices registered with the target manager.");
        return Ok(());
    }
    println!("Devices ({}):", devices.len());
    for device in &devices {
        println!("  {:<20} {}", device.name, device.host);
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    name: &'a str,
    power: PowerStatus,
    connection: ConnectionState,
}

fn parse_pid(pid: &str) -> Result<u32> {
    let parsed = match pid.strip_prefix("0x").or_else(|| pid.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => pid.parse(),
    };
    parsed.with_context(|| format!("Invalid process id '{}'", pid))
}

/// Run a devkit subcommand
pub fn cmd_device(config_path: &Path, target: &str, command: DeviceCommands) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = BuildSession::new();
    let mut devkit = open_devkit(&config, target, &mut session)?;

    match command {
        DeviceCommands::Status { json } => {
            let state = devkit.state()?;
            if json {
                let report = StatusReport {
                    name: devkit.name(),
                    power: state.power_status,
                    connection: state.connection_state,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Device: {}", devkit.name());
                println!("  Power: {}", state.power_status);
                println!("  Connection: {}", state.connection_state);
            }
        }
        DeviceCommands::PowerOn => {
            devkit.power_on()?;
            println!("Powered on {}", target);
        }
        DeviceCommands::PowerOff => {
            devkit.power_off()?;
            println!("Powered off {}", target);
        }
        DeviceCommands::Reboot => {
            devkit.reboot()?;
            println!("Rebooting {}", target);
        }
        DeviceCommands::Connect => {
            devkit.connect()?;
            println!("Connected to {}", target);
        }
        DeviceCommands::Disconnect => {
            devkit.disconnect()?;
            println!("Disconnected from {}", target);
        }
        DeviceCommands::Install {
            stage_dir,
            deploy,
            executable,
            symbols,
            sandbox,
        } => {
            let request = InstallRequest {
                stage_dir,
                sandbox: sandbox.unwrap_or_else(|| config.devkit.sandbox.clone()),
                deploy,
                executable,
                symbols,
                extra_files: Vec::new(),
            };
            let result = devkit.install(&request).context("Install failed")?;
            println!("Installed to {}", result.device_path);
            if request.deploy && !result.copied {
                println!("  Warning: copy timed out, the build may be incomplete");
            }
            for file in &result.overlaid {
                println!("  Overlaid {}", file);
            }
        }
        DeviceCommands::Run {
            working_dir,
            elf,
            args,
        } => {
            let result = devkit.run(&working_dir, &elf, &args)?;
            println!("Running {} (pid {})", result.process_name, result.pid);
        }
        DeviceCommands::Screenshot { output } => {
            if devkit.screenshot(&output) {
                println!("Saved screenshot to {}", output.display());
            } else {
                println!("Screenshot not available on {}", target);
            }
        }
        DeviceCommands::ExportSettings { output } => {
            devkit.export_settings(&output)?;
            println!("Exported settings to {}", output.display());
        }
        DeviceCommands::ImportSettings { input } => {
            devkit.import_settings(&input)?;
            println!("Imported settings from {}; {} will reboot", input.display(), target);
        }
        DeviceCommands::Processes => {
            let processes = devkit.processes()?;
            println!("Processes ({}):", processes.len());
            for process in &processes {
                println!("  {:>8}  {}", process.pid, process.name);
            }
        }
        DeviceCommands::Kill { pid } => {
            let pid = parse_pid(&pid)?;
            devkit.kill_process(pid)?;
            println!("Killed process {}", pid);
        }
    }

    Ok(())
}
