// src/staging/layers.rs
//! Chunk to layer assignment and storage type reconciliation
//!
//! Dual-layer media needs at least one chunk on layer 1, single-layer disc
//! media needs every chunk on layer 0, and patches are always flat. The
//! adjustment pass enforces those rules after the raw assignment is read
//! from the layer file or the static configuration table.

use crate::config::{PackageMode, parse_numbered_entries};
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Package storage media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    Digital25,
    #[default]
    Digital50,
    Bd25,
    Bd50,
    Bd50_50,
}

impl StorageType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Digital25 => "digital25",
            Self::Digital50 => "digital50",
            Self::Bd25 => "bd25",
            Self::Bd50 => "bd50",
            Self::Bd50_50 => "bd50_50",
        }
    }

    /// Physical disc media
    pub const fn is_disc(&self) -> bool {
        matches!(self, Self::Bd25 | Self::Bd50 | Self::Bd50_50)
    }

    /// Disc media with two layers
    pub const fn is_dual_layer(&self) -> bool {
        matches!(self, Self::Bd50 | Self::Bd50_50)
    }

    /// Dual-layer counterpart of a single-layer type
    pub const fn to_dual_layer(self) -> Self {
        match self {
            Self::Bd25 => Self::Bd50,
            Self::Digital25 => Self::Digital50,
            other => other,
        }
    }

    /// Digital counterpart of a disc type (patches are never on disc)
    pub const fn to_digital(self) -> Self {
        match self {
            Self::Bd25 => Self::Digital25,
            Self::Bd50 | Self::Bd50_50 => Self::Digital50,
            other => other,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "digital25" => Ok(Self::Digital25),
            "digital50" => Ok(Self::Digital50),
            "bd25" => Ok(Self::Bd25),
            "bd50" => Ok(Self::Bd50),
            "bd50_50" => Ok(Self::Bd50_50),
            _ => Err(format!("unknown storage type: {}", s)),
        }
    }
}

/// Highest layer a chunk can be placed on
pub const MAX_LAYER: u32 = 1;

/// Read a precomputed per-chunk layer file
///
/// Lines hold `chunk layer` or `chunk,layer`; blank lines and `#` comments
/// are ignored, malformed lines and layers above [`MAX_LAYER`] are skipped
/// with a warning. Returns `None`
/// when the file does not exist.
pub fn read_layer_file(path: &Path) -> Result<Option<BTreeMap<u32, u32>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(parse_layer_file(&content)))
}

fn parse_layer_file(content: &str) -> BTreeMap<u32, u32> {
    let mut table = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty());
        let parsed = match (fields.next(), fields.next()) {
            (Some(chunk), Some(layer)) => chunk.parse::<u32>().ok().zip(layer.parse::<u32>().ok()),
            _ => None,
        };
        match parsed {
            Some((chunk, layer)) if layer <= MAX_LAYER => {
                table.insert(chunk, layer);
            }
            _ => warn!("Ignoring malformed layer file line '{}'", line),
        }
    }
    table
}

/// Static `"chunk:layer"` table from the configuration
pub fn layer_table(entries: &[String]) -> BTreeMap<u32, u32> {
    parse_numbered_entries(entries, "chunk layer")
        .into_iter()
        .filter_map(|(chunk, layer)| match chunk.parse::<u32>() {
            Ok(_) if layer > MAX_LAYER => {
                warn!("Ignoring chunk layer entry '{}:{}': no such layer", chunk, layer);
                None
            }
            Ok(chunk) => Some((chunk, layer)),
            Err(_) => {
                warn!("Ignoring chunk layer entry with non-numeric chunk '{}'", chunk);
                None
            }
        })
        .collect()
}

/// Dense chunk -> layer array; unassigned chunks go to layer 0
pub fn assign_layers(chunk_count: u32, table: &BTreeMap<u32, u32>) -> Vec<u32> {
    (0..chunk_count)
        .map(|chunk| table.get(&chunk).copied().unwrap_or(0))
        .collect()
}

/// Inputs to the adjustment pass
#[derive(Debug, Clone, Copy)]
pub struct LayerPolicy {
    pub storage_type: StorageType,
    pub mode: PackageMode,
    pub force_dual_layer: bool,
}

/// Enforce the layer invariants and return the reconciled storage type
pub fn adjust_layers(layers: &mut [u32], policy: LayerPolicy) -> StorageType {
    let mut storage = policy.storage_type;
    let all_on_base = layers.iter().all(|&l| l == 0);

    if policy.force_dual_layer
        && all_on_base
        && let Some(last) = layers.len().checked_sub(1)
    {
        info!("Forcing dual layer: moving chunk {} to layer 1", last);
        layers[last] = 1;
    }

    if policy.mode == PackageMode::Patch {
        layers.iter_mut().for_each(|l| *l = 0);
        if storage.is_disc() {
            info!(
                "Patch packages are digital only: {} -> {}",
                storage,
                storage.to_digital()
            );
            storage = storage.to_digital();
        }
        return storage;
    }

    let uses_upper_layer = layers.iter().any(|&l| l > 0);
    if uses_upper_layer {
        let dual = storage.to_dual_layer();
        if dual != storage {
            info!("Chunks use layer 1, upgrading storage {} -> {}", storage, dual);
            storage = dual;
        }
    } else if storage.is_dual_layer() {
        warn!(
            "Storage {} is dual layer but every chunk is on layer 0, using bd25",
            storage
        );
        storage = StorageType::Bd25;
    }

    storage
}
