// src/device/mod.rs

//! Devkit management through the vendor target-manager tools
//!
//! A [`Devkit`] caches the device's power and connection state and refreshes
//! it when it is older than the configured TTL. Operations that change the
//! device either update the cache locally (connect, power off) or drop it so
//! the next read queries the device again (power on, reboot, disconnect).
//!
//! Two vendor tools are involved: the target tool handles the device list,
//! power, connection and launch; the control tool handles file copies,
//! screenshots, settings and processes.

mod state;

pub use state::{
    ConnectionState, DeviceDetail, DeviceEntry, DeviceStateInfo, PowerStatus, ProcessInfo,
    parse_device_detail, parse_device_list, parse_process_list,
};

use crate::config::DevkitConfig;
use crate::error::{Error, Result};
use crate::session::BuildSession;
use crate::staging::EBOOT_NAME;
use crate::tool::{VendorTool, args};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing and retry knobs for devkit operations
#[derive(Debug, Clone)]
pub struct DevkitOptions {
    pub command_timeout: Duration,
    pub copy_timeout: Duration,
    /// Extra `detail` queries while power is Unknown
    pub query_retries: u32,
    pub retry_delay: Duration,
    /// Wait after adding a device by IP
    pub add_settle_delay: Duration,
    pub state_ttl: Duration,
    pub launch_poll_count: u32,
    pub launch_poll_interval: Duration,
}

impl Default for DevkitOptions {
    fn default() -> Self {
        Self::from(&DevkitConfig::default())
    }
}

impl From<&DevkitConfig> for DevkitOptions {
    fn from(config: &DevkitConfig) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            copy_timeout: config.copy_timeout(),
            query_retries: config.query_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            add_settle_delay: Duration::from_secs(config.add_settle_secs),
            state_ttl: Duration::from_secs(config.state_ttl_secs),
            launch_poll_count: config.launch_poll_count,
            launch_poll_interval: Duration::from_millis(config.launch_poll_interval_ms),
        }
    }
}

/// Vendor tools used to drive devkits
#[derive(Debug, Clone)]
pub struct DeviceTools {
    pub target: VendorTool,
    pub control: VendorTool,
}

/// Load the default device list, caching it in the session
pub fn default_devices(
    tools: &DeviceTools,
    options: &DevkitOptions,
    session: &mut BuildSession,
) -> Result<Vec<DeviceEntry>> {
    if let Some(devices) = session.default_devices() {
        return Ok(devices.to_vec());
    }
    let output = tools.target.invoke(&args(["list"]), options.command_timeout)?;
    let devices = parse_device_list(&output.stdout);
    debug!("Target manager knows {} device(s)", devices.len());
    session.set_default_devices(devices.clone());
    Ok(devices)
}

/// What to put on the device
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Staged build on the host
    pub stage_dir: PathBuf,
    /// Directory name under /data on the device
    pub sandbox: String,
    /// Copy the build to the device instead of running it from /host
    pub deploy: bool,
    /// Freshly built executable to overlay when newer than the staged one
    pub executable: Option<PathBuf>,
    /// Symbol files overlaid together with the executable
    pub symbols: Vec<PathBuf>,
    /// Extra (host file, path relative to the install root) pairs
    pub extra_files: Vec<(PathBuf, String)>,
}

/// Outcome of [`Devkit::install`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    /// Working directory of the title on the device
    pub device_path: String,
    /// Whether the build was copied to device storage
    pub copied: bool,
    /// Files overlaid on top of the staged build
    pub overlaid: Vec<String>,
}

/// A running title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub pid: u32,
    pub process_name: String,
}

/// A devkit known to the target manager
#[derive(Debug)]
pub struct Devkit {
    name: String,
    tools: DeviceTools,
    options: DevkitOptions,
    state: Option<DeviceStateInfo>,
    queryable: bool,
    remove_on_drop: bool,
}

impl Devkit {
    /// Open a devkit by name or address
    ///
    /// Devices given by IP that the target manager does not know yet are
    /// added (and removed again on drop). The state is queried right away,
    /// retrying while the power state is Unknown, and stale sessions left by
    /// crashed runs are force-disconnected.
    pub fn open(
        name: &str,
        tools: DeviceTools,
        options: DevkitOptions,
        session: &mut BuildSession,
    ) -> Result<Self> {
        let known = default_devices(&tools, &options, session)?
            .iter()
            .any(|d| d.matches(name));

        let mut devkit = Self {
            name: name.to_string(),
            tools,
            options,
            state: None,
            queryable: false,
            remove_on_drop: false,
        };

        if !known {
            if name.parse::<IpAddr>().is_ok() {
                info!("Adding {} to the target manager", name);
                devkit
                    .tools
                    .target
                    .invoke(&devkit.target_args("add"), devkit.options.command_timeout)?;
                devkit.remove_on_drop = true;
                thread::sleep(devkit.options.add_settle_delay);
            } else {
                warn!("Device {} is not in the default device list", name);
            }
        }

        devkit.query_with_retries();

        if devkit.queryable && devkit.is_available()? && !devkit.is_connected()? {
            devkit.force_disconnect();
        }

        Ok(devkit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the last `detail` query succeeded
    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    fn target_args(&self, command: &str) -> Vec<String> {
        args([command.to_string(), format!("-target={}", self.name)])
    }

    fn query_with_retries(&mut self) {
        let mut attempts = 0;
        loop {
            if let Err(e) = self.refresh() {
                warn!("Could not query {}: {}", self.name, e);
            }
            let unknown = self
                .state
                .map(|s| s.power_status == PowerStatus::Unknown)
                .unwrap_or(true);
            if !unknown || attempts >= self.options.query_retries {
                break;
            }
            attempts += 1;
            debug!(
                "{} power state unknown, retrying ({}/{})",
                self.name, attempts, self.options.query_retries
            );
            thread::sleep(self.options.retry_delay);
        }
    }

    /// Query the device and replace the cached state
    pub fn refresh(&mut self) -> Result<DeviceDetail> {
        let result = self
            .tools
            .target
            .invoke(&self.target_args("detail"), self.options.command_timeout);
        match result {
            Ok(output) => {
                let detail = parse_device_detail(&output.stdout);
                self.queryable = true;
                self.state = Some(DeviceStateInfo::new(
                    detail.power_status,
                    detail.connection_state,
                ));
                Ok(detail)
            }
            Err(e) => {
                self.queryable = false;
                self.state = None;
                Err(e)
            }
        }
    }

    /// Current state, querying when the cache is empty or stale
    pub fn state(&mut self) -> Result<DeviceStateInfo> {
        match self.state {
            Some(state) if !state.is_stale(self.options.state_ttl) => Ok(state),
            _ => {
                self.refresh()?;
                self.state
                    .ok_or_else(|| Error::Device(format!("no state for {}", self.name)))
            }
        }
    }

    /// Cached state without querying
    pub fn cached_state(&self) -> Option<DeviceStateInfo> {
        self.state
    }

    pub fn power_status(&mut self) -> Result<PowerStatus> {
        Ok(self.state()?.power_status)
    }

    pub fn connection_state(&mut self) -> Result<ConnectionState> {
        Ok(self.state()?.connection_state)
    }

    pub fn is_on(&mut self) -> Result<bool> {
        Ok(self.power_status()? == PowerStatus::On)
    }

    pub fn is_connected(&mut self) -> Result<bool> {
        Ok(self.connection_state()? == ConnectionState::Connected)
    }

    pub fn is_available(&mut self) -> Result<bool> {
        Ok(self.is_connected()? || self.connection_state()? == ConnectionState::Available)
    }

    fn invalidate(&mut self) {
        self.state = None;
    }

    pub fn power_on(&mut self) -> Result<()> {
        info!("Powering on {}", self.name);
        self.invalidate();
        self.tools
            .target
            .invoke(&self.target_args("poweron"), self.options.command_timeout)?;
        Ok(())
    }

    pub fn power_off(&mut self) -> Result<()> {
        info!("Powering off {}", self.name);
        self.invalidate();
        self.tools
            .target
            .invoke(&self.target_args("poweroff"), self.options.command_timeout)?;
        self.state = Some(DeviceStateInfo::new(
            PowerStatus::Off,
            ConnectionState::Unavailable,
        ));
        Ok(())
    }

    pub fn reboot(&mut self) -> Result<()> {
        info!("Rebooting {}", self.name);
        self.invalidate();
        self.tools
            .target
            .invoke(&self.target_args("reboot"), self.options.command_timeout)?;
        Ok(())
    }

    /// Connect and record the connection without querying
    ///
    /// A successful connect implies the kit is powered, so an uncached power
    /// state is recorded as On.
    pub fn connect(&mut self) -> Result<()> {
        debug!("Connecting to {}", self.name);
        let power = self
            .state
            .map(|s| s.power_status)
            .unwrap_or(PowerStatus::On);
        self.invalidate();
        self.tools
            .target
            .invoke(&self.target_args("connect"), self.options.command_timeout)?;
        self.state = Some(DeviceStateInfo::new(power, ConnectionState::Connected));
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        debug!("Disconnecting from {}", self.name);
        self.invalidate();
        self.tools
            .target
            .invoke(&self.target_args("disconnect"), self.options.command_timeout)?;
        Ok(())
    }

    /// Drop any session held on the device (best-effort)
    pub fn force_disconnect(&mut self) -> bool {
        info!("Clearing stale sessions on {}", self.name);
        self.invalidate();
        match self.tools.control.invoke(
            &self.target_args("force-disconnect"),
            self.options.command_timeout,
        ) {
            Ok(_) => true,
            Err(e) => {
                warn!("Force disconnect of {} failed: {}", self.name, e);
                false
            }
        }
    }

    /// Connect unless already connected
    pub fn ensure_connected(&mut self) -> Result<()> {
        if !self.is_connected()? {
            self.connect()?;
        }
        Ok(())
    }

    /// Copy a host path to the device
    ///
    /// Copies of whole builds can exceed any sensible timeout on slow
    /// networks, so a timeout is logged and reported as `false` rather than
    /// failing; a non-zero exit is still an error.
    pub fn copy_to_device(&self, source: &Path, destination: &str) -> Result<bool> {
        let args = args([
            "dcopy".to_string(),
            format!("-target={}", self.name),
            source.display().to_string(),
            destination.to_string(),
        ]);
        match self.tools.control.invoke(&args, self.options.copy_timeout) {
            Ok(_) => Ok(true),
            Err(Error::ToolTimeout { command, seconds }) => {
                warn!(
                    "Copy to {} timed out after {}s ({}); continuing",
                    self.name, seconds, command
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Copy a device path to the host (same timeout rules as uploads)
    pub fn copy_from_device(&self, source: &str, destination: &Path) -> Result<bool> {
        let args = args([
            "dcopy".to_string(),
            format!("-target={}", self.name),
            format!("-from-device={}", source),
            destination.display().to_string(),
        ]);
        match self.tools.control.invoke(&args, self.options.copy_timeout) {
            Ok(_) => Ok(true),
            Err(Error::ToolTimeout { seconds, .. }) => {
                warn!(
                    "Copy from {} timed out after {}s; continuing",
                    self.name, seconds
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Install a staged build
    pub fn install(&mut self, request: &InstallRequest) -> Result<InstallResult> {
        self.ensure_connected()?;

        let (device_path, copied) = if request.deploy {
            let device_path = format!("/data/{}", request.sandbox);
            info!(
                "Deploying {} to {}:{}",
                request.stage_dir.display(),
                self.name,
                device_path
            );
            let copied = self.copy_to_device(&request.stage_dir, &device_path)?;
            (device_path, copied)
        } else {
            let host = request.stage_dir.display().to_string().replace('\\', "/");
            let device_path = format!("/host/{}", host.trim_start_matches('/'));
            info!("Running {} from host path {}", self.name, device_path);
            (device_path, false)
        };

        let mut overlays: Vec<(PathBuf, String)> = Vec::new();
        if let Some(executable) = &request.executable {
            let staged = request.stage_dir.join(EBOOT_NAME);
            if is_newer(executable, &staged) {
                info!(
                    "Local build {} is newer than the staged eboot.bin, overlaying",
                    executable.display()
                );
                overlays.push((executable.clone(), EBOOT_NAME.to_string()));
                for symbols in &request.symbols {
                    let name = match symbols.extension() {
                        Some(ext) => format!("{}.{}", EBOOT_NAME, ext.to_string_lossy()),
                        None => format!("{}.sym", EBOOT_NAME),
                    };
                    overlays.push((symbols.clone(), name));
                }
            }
        }
        overlays.extend(request.extra_files.iter().cloned());

        let mut overlaid = Vec::with_capacity(overlays.len());
        for (source, relative) in overlays {
            if request.deploy {
                self.copy_to_device(&source, &format!("{}/{}", device_path, relative))?;
            } else {
                let destination = request.stage_dir.join(&relative);
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &destination)?;
            }
            overlaid.push(relative);
        }

        Ok(InstallResult {
            device_path,
            copied,
            overlaid,
        })
    }

    /// Processes running on the device
    pub fn processes(&self) -> Result<Vec<ProcessInfo>> {
        let output = self
            .tools
            .control
            .invoke(&self.target_args("plist"), self.options.command_timeout)?;
        Ok(parse_process_list(&output.stdout))
    }

    /// Find a running process by (case-insensitive) name
    pub fn find_process(&self, name: &str) -> Result<Option<ProcessInfo>> {
        Ok(self
            .processes()?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name)))
    }

    pub fn kill_process(&self, pid: u32) -> Result<()> {
        info!("Killing process {} on {}", pid, self.name);
        let mut args = self.target_args("pkill");
        args.push(format!("-pid={}", pid));
        self.tools
            .control
            .invoke(&args, self.options.command_timeout)?;
        Ok(())
    }

    /// Launch a title and check it is still alive shortly after
    pub fn run(&mut self, working_directory: &str, elf: &str, arguments: &str) -> Result<RunResult> {
        self.ensure_connected()?;
        let elf_path = format!("{}/{}", working_directory.trim_end_matches('/'), elf);
        let mut args = self.target_args("launch");
        args.push(format!("-elf={}", elf_path));
        args.push(format!("-workingdirectory={}", working_directory));
        args.push(format!("-args={}", arguments));

        info!("Launching {} on {}", elf_path, self.name);
        self.tools
            .target
            .invoke(&args, self.options.command_timeout)?;

        let process_name = elf.rsplit('/').next().unwrap_or(elf).to_string();
        for attempt in 0..self.options.launch_poll_count.max(1) {
            if attempt > 0 {
                thread::sleep(self.options.launch_poll_interval);
            }
            if let Some(process) = self.find_process(&process_name)? {
                return Ok(RunResult {
                    pid: process.pid,
                    process_name,
                });
            }
        }

        Err(Error::Device(format!(
            "{} exited immediately after launch on {}",
            process_name, self.name
        )))
    }

    /// Save a screenshot to the host (best-effort)
    pub fn screenshot(&self, destination: &Path) -> bool {
        let mut args = self.target_args("screenshot");
        args.push(destination.display().to_string());
        match self.tools.control.invoke(&args, self.options.command_timeout) {
            Ok(_) => true,
            Err(e) => {
                warn!("Screenshot on {} unavailable: {}", self.name, e);
                false
            }
        }
    }

    /// Export device settings to an XML file on the host
    pub fn export_settings(&self, destination: &Path) -> Result<()> {
        let mut args = self.target_args("settings-export");
        args.push(destination.display().to_string());
        self.tools
            .control
            .invoke(&args, self.options.command_timeout)?;
        Ok(())
    }

    /// Import device settings; the device reboots to apply them
    pub fn import_settings(&mut self, source: &Path) -> Result<()> {
        let mut args = self.target_args("settings-import");
        args.push(source.display().to_string());
        self.invalidate();
        self.tools
            .control
            .invoke(&args, self.options.command_timeout)?;
        Ok(())
    }
}

impl Drop for Devkit {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        debug!("Removing {} from the target manager", self.name);
        if let Err(e) = self
            .tools
            .target
            .invoke(&self.target_args("remove"), self.options.command_timeout)
        {
            warn!("Failed to remove {}: {}", self.name, e);
        }
    }
}

/// Whether `candidate` was modified after `reference` (missing reference counts as older)
fn is_newer(candidate: &Path, reference: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(candidate), modified(reference)) {
        (Some(candidate), Some(reference)) => candidate > reference,
        (Some(_), None) => true,
        _ => false,
    }
}
