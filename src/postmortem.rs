// src/postmortem.rs
//! Crash dump collection and analysis
//!
//! Everything here is best-effort: failures are logged and reported as
//! `false`, never returned as errors.

use crate::device::Devkit;
use crate::tool::VendorTool;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Directory the devkit writes core dumps to
pub const DEVICE_DUMP_DIR: &str = "/data/sce_coredumps";

const DUMP_EXTENSION: &str = "orbisdmp";

/// Dump files under `dir`, newest first
pub fn find_dumps(dir: &Path) -> Vec<PathBuf> {
    let mut dumps: Vec<(SystemTime, PathBuf)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(DUMP_EXTENSION))
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.into_path())
        })
        .collect();
    dumps.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    dumps.into_iter().map(|(_, path)| path).collect()
}

/// Copy the device dump directory into `destination`
pub fn collect_dumps(devkit: &Devkit, destination: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(destination) {
        warn!("Cannot create {}: {}", destination.display(), e);
        return false;
    }
    match devkit.copy_from_device(DEVICE_DUMP_DIR, destination) {
        Ok(copied) => copied,
        Err(e) => {
            warn!("Could not collect dumps from {}: {}", devkit.name(), e);
            false
        }
    }
}

/// Run the analyzer on one dump, writing its report next to the dump
pub fn analyze_dump(analyzer: &VendorTool, dump: &Path, timeout: Duration) -> bool {
    let report = dump.with_extension("txt");
    let args = vec![
        dump.display().to_string(),
        format!("-o={}", report.display()),
    ];
    match analyzer.invoke(&args, timeout) {
        Ok(_) => {
            info!("Crash report written to {}", report.display());
            true
        }
        Err(e) => {
            warn!("Analysis of {} failed: {}", dump.display(), e);
            false
        }
    }
}

/// Options for [`postmortem`]
#[derive(Debug, Clone)]
pub struct PostmortemOptions {
    pub dump_dir: PathBuf,
    /// Analyze only the newest dump
    pub latest_only: bool,
    pub timeout: Duration,
}

/// Optionally pull dumps from a devkit, then analyze them
///
/// Returns `true` when at least one dump was analyzed.
pub fn postmortem(
    devkit: Option<&Devkit>,
    analyzer: &VendorTool,
    options: &PostmortemOptions,
) -> bool {
    if let Some(devkit) = devkit
        && !collect_dumps(devkit, &options.dump_dir)
    {
        warn!("Continuing with dumps already on the host");
    }

    let mut dumps = find_dumps(&options.dump_dir);
    if dumps.is_empty() {
        warn!("No crash dumps found in {}", options.dump_dir.display());
        return false;
    }
    if options.latest_only {
        dumps.truncate(1);
    }

    let analyzed = dumps
        .iter()
        .filter(|dump| analyze_dump(analyzer, dump, options.timeout))
        .count();
    info!("Analyzed {} of {} dump(s)", analyzed, dumps.len());
    analyzed > 0
}
