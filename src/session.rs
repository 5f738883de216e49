// src/session.rs

//! Build session context
//!
//! State that lives for one invocation of the tool: the reverse map of
//! shortened directories, the default device list, whether the current stage
//! already produced an `eboot.bin`, and the run counters shared with parallel
//! packaging tasks.

use crate::device::DeviceEntry;
use crate::staging::PathShortener;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct BuildSession {
    shortener: PathShortener,
    eboot_created: bool,
    default_devices: Option<Vec<DeviceEntry>>,
    staging_index: AtomicU32,
    publish_runs: AtomicU32,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with a custom shortener (used to force hash collisions)
    pub fn with_shortener(shortener: PathShortener) -> Self {
        Self {
            shortener,
            ..Self::default()
        }
    }

    /// Start a new stage pass; returns its index
    pub fn begin_stage(&mut self) -> u32 {
        self.eboot_created = false;
        self.staging_index.fetch_add(1, Ordering::Relaxed)
    }

    pub fn shortener(&self) -> &PathShortener {
        &self.shortener
    }

    pub fn shortener_mut(&mut self) -> &mut PathShortener {
        &mut self.shortener
    }

    pub fn eboot_created(&self) -> bool {
        self.eboot_created
    }

    pub(crate) fn eboot_flag(&mut self) -> &mut bool {
        &mut self.eboot_created
    }

    /// Cached default device list, if already loaded
    pub fn default_devices(&self) -> Option<&[DeviceEntry]> {
        self.default_devices.as_deref()
    }

    pub fn set_default_devices(&mut self, devices: Vec<DeviceEntry>) {
        self.default_devices = Some(devices);
    }

    /// Record one packaging tool run; returns the run number
    pub fn record_publish_run(&self) -> u32 {
        self.publish_runs.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn publish_runs(&self) -> u32 {
        self.publish_runs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_stage_resets_eboot_flag() {
        let mut session = BuildSession::new();
        *session.eboot_flag() = true;
        assert_eq!(session.begin_stage(), 0);
        assert!(!session.eboot_created());
        assert_eq!(session.begin_stage(), 1);
    }

    #[test]
    fn test_publish_runs_counted() {
        let session = BuildSession::new();
        assert_eq!(session.record_publish_run(), 1);
        assert_eq!(session.record_publish_run(), 2);
        assert_eq!(session.publish_runs(), 2);
    }

    #[test]
    fn test_shortened_paths_survive_in_session() {
        let mut session = BuildSession::new();
        let result = session.shortener_mut().register("a/b/c/d/e/f/g").unwrap();
        assert!(result.shortened);
        assert_eq!(
            session.shortener().resolve(&result.new_path),
            Some("a/b/c/d/e/f/g")
        );
    }

    #[test]
    fn test_default_devices_cached() {
        let mut session = BuildSession::new();
        assert!(session.default_devices().is_none());
        session.set_default_devices(vec![DeviceEntry {
            name: "kit-01".to_string(),
            host: "10.0.0.5".to_string(),
        }]);
        assert_eq!(session.default_devices().map(|d| d.len()), Some(1));
    }
}
