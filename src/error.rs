// src/error.rs

//! Error types for staging, packaging and devkit operations

use thiserror::Error;

/// Errors surfaced by the library
///
/// Configuration problems are normally downgraded to warnings with a default
/// substituted; the variants here are the conditions that stop a build.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration that has no sensible default
    #[error("Configuration error: {0}")]
    Config(String),

    /// deploy.toml could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// GP4 emission failed
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid install-bundle regex
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Stage directory traversal failed
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Vendor command exited with a non-zero status
    #[error("Command '{command}' failed with exit code {code}")]
    ToolFailed { command: String, code: i32 },

    /// Vendor command exceeded its wait and was killed
    #[error("Command '{command}' timed out after {seconds} seconds")]
    ToolTimeout { command: String, seconds: u64 },

    /// Vendor tool could not be located
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Two distinct directories hash to the same shortened path
    #[error("Shortened path '{shortened}' already maps to '{existing}', refusing '{incoming}'")]
    PathCollision {
        shortened: String,
        existing: String,
        incoming: String,
    },

    /// Requested title id disagrees with the package metadata
    #[error("Title ID mismatch: requested {requested}, package metadata has {found}")]
    TitleIdMismatch { requested: String, found: String },

    /// Devkit is in a state that does not allow the operation
    #[error("Device error: {0}")]
    Device(String),

    /// One or more parallel packaging tasks failed
    #[error("{failed} of {total} packaging tasks failed")]
    PackagingFailed { failed: usize, total: usize },

    /// Staged path could not be mapped into the package
    #[error("Invalid staged path: {0}")]
    InvalidPath(String),
}

/// Result alias for library operations
pub type Result<T> = std::result::Result<T, Error>;
