// src/pgo.rs

//! Profile-guided optimization runs on a devkit
//!
//! The instrumented title is launched and left to play through its
//! automation. While it runs, an optional worker thread takes periodic
//! screenshots; the worker stops when the sender held by [`StopSignal`] is
//! dropped, which happens on every exit path of the run. The title gets a
//! bounded amount of time to exit on its own. Past that it is killed and the
//! run fails. Raw profiles are then copied back and merged.

use crate::config::PgoConfig;
use crate::device::Devkit;
use crate::error::{Error, Result};
use crate::tool::VendorTool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Settings for one profiling run
#[derive(Debug, Clone)]
pub struct PgoOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub screenshot_interval: Option<Duration>,
    pub screenshot_dir: PathBuf,
    /// Where the instrumented title writes `.profraw` files on the device
    pub device_profile_dir: String,
    /// Merged profile
    pub output: PathBuf,
    pub merge_timeout: Duration,
}

impl From<&PgoConfig> for PgoOptions {
    fn from(config: &PgoConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            screenshot_interval: config.screenshot_interval_secs.map(Duration::from_secs),
            screenshot_dir: config.screenshot_dir.clone(),
            device_profile_dir: config.device_profile_dir.clone(),
            output: config.output.clone(),
            merge_timeout: Duration::from_secs(600),
        }
    }
}

impl PgoOptions {
    /// Host directory receiving the raw profiles
    pub fn raw_dir(&self) -> PathBuf {
        self.output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("profraw")
    }
}

/// What to launch
#[derive(Debug, Clone)]
pub struct PgoLaunch {
    pub working_directory: String,
    pub elf: String,
    pub arguments: String,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct PgoReport {
    pub pid: u32,
    pub elapsed: Duration,
    pub screenshots: usize,
    pub profiles: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Stops the screenshot worker when dropped
struct StopSignal(Option<Sender<()>>);

impl Drop for StopSignal {
    fn drop(&mut self) {
        // Dropping the sender disconnects the worker's receiver.
        self.0.take();
    }
}

/// Launch, wait, collect and merge
pub fn run_pgo(
    devkit: &mut Devkit,
    profdata: &VendorTool,
    launch: &PgoLaunch,
    options: &PgoOptions,
) -> Result<PgoReport> {
    let started = devkit.run(&launch.working_directory, &launch.elf, &launch.arguments)?;
    info!(
        "PGO run started: {} (pid {})",
        started.process_name, started.pid
    );

    let devkit: &Devkit = devkit;
    let screenshots = AtomicUsize::new(0);
    let start = Instant::now();

    let outcome = thread::scope(|scope| -> Result<bool> {
        let (sender, receiver) = mpsc::channel::<()>();
        let _stop = StopSignal(Some(sender));

        if let Some(interval) = options.screenshot_interval {
            std::fs::create_dir_all(&options.screenshot_dir)?;
            let screenshots = &screenshots;
            scope.spawn(move || {
                loop {
                    match receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let index = screenshots.load(Ordering::Relaxed);
                            let path = options
                                .screenshot_dir
                                .join(format!("pgo_{:04}.png", index));
                            if devkit.screenshot(&path) {
                                screenshots.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        _ => break,
                    }
                }
                debug!("Screenshot worker stopped");
            });
        }

        wait_for_exit(devkit, started.pid, &started.process_name, options)
    })?;

    let elapsed = start.elapsed();
    if !outcome {
        warn!(
            "{} still running after {}s, killing it",
            started.process_name,
            options.timeout.as_secs()
        );
        let pid = devkit
            .find_process(&started.process_name)?
            .map(|p| p.pid)
            .unwrap_or(started.pid);
        devkit.kill_process(pid)?;
        return Err(Error::ToolTimeout {
            command: format!("PGO run of {}", launch.elf),
            seconds: options.timeout.as_secs(),
        });
    }
    info!(
        "{} exited after {}s",
        started.process_name,
        elapsed.as_secs()
    );

    let raw_dir = options.raw_dir();
    std::fs::create_dir_all(&raw_dir)?;
    devkit.copy_from_device(&options.device_profile_dir, &raw_dir)?;

    let profiles = collect_profiles(&raw_dir)?;
    if profiles.is_empty() {
        return Err(Error::Device(format!(
            "no .profraw files copied from {}",
            options.device_profile_dir
        )));
    }
    merge_profiles(profdata, &profiles, &options.output, options.merge_timeout)?;

    Ok(PgoReport {
        pid: started.pid,
        elapsed,
        screenshots: screenshots.into_inner(),
        profiles,
        output: options.output.clone(),
    })
}

/// Poll the process list until the title disappears; `false` on timeout
fn wait_for_exit(devkit: &Devkit, pid: u32, name: &str, options: &PgoOptions) -> Result<bool> {
    let deadline = Instant::now() + options.timeout;
    loop {
        let running = devkit
            .processes()?
            .iter()
            .any(|p| p.pid == pid || p.name.eq_ignore_ascii_case(name));
        if !running {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(options.poll_interval);
    }
}

/// All `*.profraw` files under `dir`, sorted
pub fn collect_profiles(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut profiles = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_profile = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("profraw"));
        if entry.file_type().is_file() && is_profile {
            profiles.push(entry.into_path());
        }
    }
    Ok(profiles)
}

/// Merge raw profiles into `output`
pub fn merge_profiles(
    profdata: &VendorTool,
    profiles: &[PathBuf],
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut args = vec![
        "merge".to_string(),
        "-o".to_string(),
        output.display().to_string(),
    ];
    args.extend(profiles.iter().map(|p| p.display().to_string()));
    profdata.invoke(&args, timeout)?;
    info!(
        "Merged {} profile(s) into {}",
        profiles.len(),
        output.display()
    );
    Ok(())
}
