// src/lib.rs

//! Orbis Deploy
//!
//! Staging, packaging and devkit management for PS4 title builds.
//!
//! # Architecture
//!
//! - Staging: stage directory → per-file chunk ids → per-chunk layers
//! - Deep paths: directories six or more levels deep collapse to `deepfiles/<crc>`
//! - GP4: the staged plan serialized for the vendor packaging tool
//! - Devkits: cached power/connection state over the vendor target tools
//! - Sessions: per-invocation state passed explicitly, no globals

pub mod config;
pub mod device;
mod error;
pub mod gp4;
pub mod package;
pub mod pgo;
pub mod postmortem;
pub mod session;
pub mod staging;
pub mod tool;

pub use config::DeployConfig;
pub use device::{ConnectionState, DeviceTools, Devkit, DevkitOptions, PowerStatus};
pub use error::{Error, Result};
pub use gp4::{PackageDescriptor, render_gp4, write_emulation_manifest, write_gp4};
pub use package::{PackageJob, PublishTool};
pub use session::BuildSession;
pub use staging::{
    PathShortener, ShortenResult, StagePlan, StageSettings, StagedFileEntry, StorageType,
    build_stage_plan, shorten,
};
pub use tool::{CommandOutput, ProcessRunner, ToolRunner, VendorTool};
