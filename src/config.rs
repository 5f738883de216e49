// src/config.rs
//! Deploy configuration (deploy.toml) parsing and data structures
//!
//! Every section is optional. Missing or malformed values that have a
//! sensible fallback are reported with `warn!` and replaced by a default
//! instead of failing the build.

use crate::error::Result;
use crate::staging::StorageType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Title id substituted when none is configured
pub const DEFAULT_TITLE_ID: &str = "CUSA00000";

/// Passcode substituted when none (or a malformed one) is configured
pub const DEFAULT_PASSCODE: &str = "00000000000000000000000000000000";

/// Root structure of deploy.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub package: PackageConfig,

    #[serde(default)]
    pub chunks: ChunkConfig,

    #[serde(default)]
    pub languages: Vec<LanguageEntry>,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub devkit: DevkitConfig,

    #[serde(default)]
    pub packaging: PackagingConfig,

    #[serde(default)]
    pub pgo: PgoConfig,
}

impl DeployConfig {
    /// Load configuration from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Configured titles, or a single placeholder title when none are set
    pub fn titles(&self) -> Vec<TitleConfig> {
        if self.project.titles.is_empty() {
            warn!(
                "No title ids configured, using placeholder {}",
                DEFAULT_TITLE_ID
            );
            return vec![TitleConfig {
                title_id: DEFAULT_TITLE_ID.to_string(),
                content_id: None,
            }];
        }
        self.project.titles.clone()
    }

    /// Package passcode (32 characters)
    pub fn passcode(&self) -> String {
        match &self.project.passcode {
            Some(p) if p.len() == 32 => p.clone(),
            Some(p) => {
                warn!(
                    "Passcode has {} characters (expected 32), using default",
                    p.len()
                );
                DEFAULT_PASSCODE.to_string()
            }
            None => {
                warn!("No passcode configured, using default");
                DEFAULT_PASSCODE.to_string()
            }
        }
    }

    /// Configured storage type
    pub fn storage_type(&self) -> StorageType {
        match self.package.storage_type.parse() {
            Ok(storage) => storage,
            Err(_) => {
                warn!(
                    "Unknown storage type '{}', using {}",
                    self.package.storage_type,
                    StorageType::default()
                );
                StorageType::default()
            }
        }
    }
}

/// Title identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    pub title_id: String,

    /// Full content id; derived from the title id when absent
    #[serde(default)]
    pub content_id: Option<String>,
}

impl TitleConfig {
    /// Content id for this title
    pub fn content_id(&self) -> String {
        self.content_id
            .clone()
            .unwrap_or_else(|| format!("UP0000-{}_00-0000000000000000", self.title_id))
    }
}

/// Extract the title id embedded in a content id
///
/// Content ids look like `UP0000-CUSA00001_00-LABEL`; the title id is the
/// nine characters after the service prefix.
pub fn content_title_id(content_id: &str) -> Option<&str> {
    content_id.get(7..16)
}

/// Project identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub titles: Vec<TitleConfig>,

    #[serde(default)]
    pub passcode: Option<String>,

    /// Stem of the staged executable (`<executable>.self` becomes eboot.bin)
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Active target configuration name; a staged
    /// `<executable>-ps4-<configuration>.self` is preferred over the plain
    /// executable
    #[serde(default = "default_configuration")]
    pub configuration: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            titles: Vec::new(),
            passcode: None,
            executable: default_executable(),
            configuration: default_configuration(),
        }
    }
}

fn default_executable() -> String {
    "eboot".to_string()
}

fn default_configuration() -> String {
    "development".to_string()
}

/// Kind of package being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageMode {
    #[default]
    Full,
    Patch,
    Remaster,
}

impl PackageMode {
    /// GP4 volume type
    pub fn volume_type(&self) -> &'static str {
        match self {
            Self::Full => "pkg_ps4_app",
            Self::Patch => "pkg_ps4_patch",
            Self::Remaster => "pkg_ps4_remaster",
        }
    }

    /// Suffix of the `param*.sfo` variant used by this mode
    pub fn sfo_suffix(&self) -> &'static str {
        match self {
            Self::Full => "",
            Self::Patch => "_patch",
            Self::Remaster => "_remaster",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Patch => "patch",
            Self::Remaster => "remaster",
        }
    }
}

/// Package layout options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(default = "default_storage_type")]
    pub storage_type: String,

    #[serde(default)]
    pub mode: PackageMode,

    #[serde(default)]
    pub force_dual_layer: bool,

    #[serde(default = "default_true")]
    pub pfs_compression: bool,

    /// Extensions stored without PFS compression (already compressed data)
    #[serde(default = "default_uncompressed_extensions")]
    pub uncompressed_extensions: Vec<String>,

    /// File names never packaged
    #[serde(default = "default_exclude_files")]
    pub exclude_files: Vec<String>,

    /// Building a distribution package (no symbols, no emulation manifest)
    #[serde(default)]
    pub distribution: bool,

    /// Base application package, required by patch packages
    #[serde(default)]
    pub base_app_pkg: Option<String>,

    /// param.sfx source for `sfo_create`
    #[serde(default)]
    pub param_sfx: Option<PathBuf>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            storage_type: default_storage_type(),
            mode: PackageMode::default(),
            force_dual_layer: false,
            pfs_compression: true,
            uncompressed_extensions: default_uncompressed_extensions(),
            exclude_files: default_exclude_files(),
            distribution: false,
            base_app_pkg: None,
            param_sfx: None,
        }
    }
}

fn default_storage_type() -> String {
    StorageType::default().to_string()
}

fn default_true() -> bool {
    true
}

fn default_uncompressed_extensions() -> Vec<String> {
    ["pak", "ucas", "utoc", "mp4", "bk2", "at9"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_files() -> Vec<String> {
    [
        "manifest_debugfiles_ps4.txt",
        "manifest_nonufsfiles_ps4.txt",
        "manifest_ufsfiles_ps4.txt",
        "thumbs.db",
        ".ds_store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Chunk and layer rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Static chunk to layer table, `"chunk:layer"` entries
    #[serde(default)]
    pub layers: Vec<String>,

    /// File/glob to chunk overrides, `"pattern:chunk"` entries
    #[serde(default)]
    pub custom: Vec<String>,

    /// Precomputed per-chunk layer file (takes precedence over `layers`)
    #[serde(default)]
    pub layer_file: Option<PathBuf>,

    #[serde(default)]
    pub install_bundles: Vec<InstallBundle>,
}

/// Install bundle: files matching any pattern go to `chunk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallBundle {
    pub chunk: u32,

    /// Regular expressions matched against the staged relative path
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Language chunk metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Culture id, e.g. "en" or "fr"
    pub culture: String,

    /// Human readable label; the literal `EMPTY` marks a placeholder chunk
    pub label: String,

    pub chunk: u32,

    #[serde(default)]
    pub default: bool,

    #[serde(default)]
    pub initial: bool,
}

/// Vendor tool names or paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Target manager tool (list/detail/add/power/launch)
    #[serde(default = "default_target_tool")]
    pub target: String,

    /// Low-level control tool (dcopy/screenshot/plist/pkill)
    #[serde(default = "default_control_tool")]
    pub control: String,

    /// Packaging tool (img_create/img_extract/sfo_create)
    #[serde(default = "default_publish_tool")]
    pub publish: String,

    /// Profile merge tool
    #[serde(default = "default_profdata_tool")]
    pub profdata: String,

    /// Crash dump analyzer
    #[serde(default = "default_postmortem_tool")]
    pub postmortem: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            target: default_target_tool(),
            control: default_control_tool(),
            publish: default_publish_tool(),
            profdata: default_profdata_tool(),
            postmortem: default_postmortem_tool(),
        }
    }
}

fn default_target_tool() -> String {
    "orbis-ctrl".to_string()
}

fn default_control_tool() -> String {
    "orbis-tm".to_string()
}

fn default_publish_tool() -> String {
    "orbis-pub-cmd".to_string()
}

fn default_profdata_tool() -> String {
    "llvm-profdata".to_string()
}

fn default_postmortem_tool() -> String {
    "orbis-dump-analyzer".to_string()
}

/// Devkit timing and install options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevkitConfig {
    pub command_timeout_secs: u64,
    pub copy_timeout_secs: u64,
    pub query_retries: u32,
    pub retry_delay_secs: u64,
    pub add_settle_secs: u64,
    pub state_ttl_secs: u64,
    pub launch_poll_count: u32,
    pub launch_poll_interval_ms: u64,

    /// Per-title directory under /data on the device
    pub sandbox: String,
}

impl Default for DevkitConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 120,
            copy_timeout_secs: 3600,
            query_retries: 2,
            retry_delay_secs: 5,
            add_settle_secs: 5,
            state_ttl_secs: 60,
            launch_poll_count: 3,
            launch_poll_interval_ms: 1000,
            sandbox: "title".to_string(),
        }
    }
}

impl DevkitConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs)
    }
}

/// Parallel packaging options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    pub output_dir: PathBuf,

    /// Delay between consecutive packaging tool starts
    pub stagger_secs: u64,

    pub timeout_secs: u64,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("packages"),
            stagger_secs: 2,
            timeout_secs: 7200,
        }
    }
}

/// Profiling run options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PgoConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub screenshot_interval_secs: Option<u64>,
    pub screenshot_dir: PathBuf,
    pub device_profile_dir: String,
    pub output: PathBuf,
}

impl Default for PgoConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            poll_interval_secs: 5,
            screenshot_interval_secs: None,
            screenshot_dir: PathBuf::from("pgo/screenshots"),
            device_profile_dir: "/data/pgo".to_string(),
            output: PathBuf::from("pgo/profile.profdata"),
        }
    }
}

/// Parse `"key:value"` array entries where the value is a number
///
/// Entries that do not parse are skipped with a warning.
pub fn parse_numbered_entries(entries: &[String], what: &str) -> Vec<(String, u32)> {
    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some((key, value)) = entry.rsplit_once(':') else {
            warn!("Ignoring malformed {} entry '{}'", what, entry);
            continue;
        };
        match value.trim().parse::<u32>() {
            Ok(number) if !key.trim().is_empty() => parsed.push((key.trim().to_string(), number)),
            _ => warn!("Ignoring malformed {} entry '{}'", what, entry),
        }
    }
    parsed
}
