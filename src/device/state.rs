// src/device/state.rs
//! Devkit state types and parsers for target-manager output

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Power state reported by the target manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PowerStatus {
    /// Booting, rebooting, or held exclusively by another host
    #[default]
    Unknown,
    On,
    Standby,
    Suspend,
    MainOnStandby,
    Off,
}

impl PowerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Standby => "standby",
            Self::Suspend => "suspend",
            Self::MainOnStandby => "main-on-standby",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized values map to `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match squash(s).as_str() {
            "on" => Self::On,
            "standby" => Self::Standby,
            "suspend" => Self::Suspend,
            "mainonstandby" => Self::MainOnStandby,
            "off" => Self::Off,
            _ => Self::Unknown,
        })
    }
}

/// Connection state reported by the target manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Unavailable,
    Available,
    Connected,
    /// Connected from another host
    InUse,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Connected => "connected",
            Self::InUse => "in-use",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match squash(s).as_str() {
            "available" => Self::Available,
            "connected" => Self::Connected,
            "inuse" => Self::InUse,
            _ => Self::Unavailable,
        })
    }
}

/// Lower-case and drop separators so "Main-On Standby" == "mainonstandby"
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Cached devkit state
#[derive(Debug, Clone, Copy)]
pub struct DeviceStateInfo {
    pub power_status: PowerStatus,
    pub connection_state: ConnectionState,
    pub cached_at: Instant,
}

impl DeviceStateInfo {
    pub fn new(power_status: PowerStatus, connection_state: ConnectionState) -> Self {
        Self {
            power_status,
            connection_state,
            cached_at: Instant::now(),
        }
    }

    /// State before the first successful query
    pub fn unknown() -> Self {
        Self::new(PowerStatus::Unknown, ConnectionState::Unavailable)
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() >= ttl
    }
}

/// Entry of the target manager's default device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub name: String,
    pub host: String,
}

impl DeviceEntry {
    /// Whether `reference` names this device (by name or host, any case)
    pub fn matches(&self, reference: &str) -> bool {
        self.name.eq_ignore_ascii_case(reference) || self.host.eq_ignore_ascii_case(reference)
    }
}

/// Parse `list` output: one `NAME HOST` line per device
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.to_lowercase().starts_with("name"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let host = fields.next().unwrap_or(name);
            Some(DeviceEntry {
                name: name.to_string(),
                host: host.to_string(),
            })
        })
        .collect()
}

/// Fields of interest from `detail` output (`Key: Value` lines)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDetail {
    pub name: Option<String>,
    pub host: Option<String>,
    pub firmware: Option<String>,
    pub power_status: PowerStatus,
    pub connection_state: ConnectionState,
}

pub fn parse_device_detail(output: &str) -> DeviceDetail {
    let mut detail = DeviceDetail::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match squash(key).as_str() {
            "name" => detail.name = Some(value.to_string()),
            "host" | "ipaddress" => detail.host = Some(value.to_string()),
            "firmware" | "sdkversion" => detail.firmware = Some(value.to_string()),
            "power" | "powerstatus" => {
                detail.power_status = value.parse().unwrap_or_default();
            }
            "connection" | "connectionstate" => {
                detail.connection_state = value.parse().unwrap_or_default();
            }
            _ => {}
        }
    }
    detail
}

/// Process running on the devkit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Parse `plist` output: `PID NAME` lines, pid decimal or `0x` hex
pub fn parse_process_list(output: &str) -> Vec<ProcessInfo> {
    output
        .lines()
        .filter_map(|line| {
            let (pid, name) = line.trim().split_once(char::is_whitespace)?;
            let pid = match pid.strip_prefix("0x").or_else(|| pid.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => pid.parse().ok()?,
            };
            Some(ProcessInfo {
                pid,
                name: name.trim().to_string(),
            })
        })
        .collect()
}
