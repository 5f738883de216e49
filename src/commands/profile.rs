// src/commands/profile.rs

//! Profiling and crash analysis commands

use super::{load_config, open_devkit};
use anyhow::{Context, Result};
use orbis_deploy::pgo::{PgoLaunch, PgoOptions, run_pgo};
use orbis_deploy::postmortem::{PostmortemOptions, postmortem};
use orbis_deploy::{BuildSession, VendorTool};
use std::path::Path;

/// Run an instrumented build to completion and merge its profiles
pub fn cmd_pgo(
    config_path: &Path,
    target: &str,
    working_dir: Option<&str>,
    elf: &str,
    args: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = BuildSession::new();
    let mut devkit = open_devkit(&config, target, &mut session)?;
    let profdata = VendorTool::system(&config.tools.profdata);

    let launch = PgoLaunch {
        working_directory: working_dir
            .map(str::to_string)
            .unwrap_or_else(|| format!("/data/{}", config.devkit.sandbox)),
        elf: elf.to_string(),
        arguments: args.to_string(),
    };
    let report = run_pgo(
        &mut devkit,
        &profdata,
        &launch,
        &PgoOptions::from(&config.pgo),
    )
    .context("PGO run failed")?;

    println!("PGO run finished in {}s", report.elapsed.as_secs());
    println!("  Profiles merged: {}", report.profiles.len());
    println!("  Screenshots: {}", report.screenshots);
    println!("  Output: {}", report.output.display());
    Ok(())
}

/// Collect and analyze crash dumps (never fails on analysis problems)
pub fn cmd_postmortem(
    config_path: &Path,
    target: Option<&str>,
    dump_dir: &Path,
    latest: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = BuildSession::new();

    let devkit = match target {
        Some(target) => match open_devkit(&config, target, &mut session) {
            Ok(devkit) => Some(devkit),
            Err(e) => {
                tracing::warn!("{:#}", e);
                None
            }
        },
        None => None,
    };

    let analyzer = VendorTool::system(&config.tools.postmortem);
    let options = PostmortemOptions {
        dump_dir: dump_dir.to_path_buf(),
        latest_only: latest,
        timeout: config.devkit.command_timeout(),
    };

    if postmortem(devkit.as_ref(), &analyzer, &options) {
        println!("Crash reports written next to the dumps in {}", dump_dir.display());
    } else {
        println!("No crash reports produced");
    }
    Ok(())
}
