// src/staging/mod.rs

//! Staged-file to package mapping
//!
//! Walks a stage directory and turns every file into a [`StagedFileEntry`]:
//! the lower-cased in-package target path (remapped and depth-shortened),
//! the chunk it installs with, and whether PFS compression applies. Chunks
//! are then assigned to layers and the storage type is reconciled.

mod chunks;
mod filter;
mod language;
mod layers;
mod shorten;

pub use chunks::{ChunkRules, MAX_CHUNK_ID, pakchunk_id, total_chunk_count};
pub use filter::{Disposition, EBOOT_NAME, ExcludeReason, FilterOptions, StageFilter};
pub use language::{EMPTY_LABEL, LanguageTable, scenario_order};
pub use layers::{
    LayerPolicy, StorageType, adjust_layers, assign_layers, layer_table, read_layer_file,
};
pub use shorten::{
    DEEP_FILES_DIR, MAX_FOLDER_DEPTH, PathShortener, ShortenResult, crc32_msb, folder_depth,
    normalize, path_crc, shorten,
};

use crate::config::{DeployConfig, PackageMode};
use crate::error::{Error, Result};
use crate::session::BuildSession;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Emulation manifest written into the stage directory
///
/// Disabled by default; rename it to activate chunk emulation on a devkit.
pub const EMULATION_MANIFEST: &str = "sce_sys/playgo-chunks.gp4.disabled";

const CONTAINER_EXTENSIONS: &[&str] = &["pak", "ucas", "utoc"];

/// One file in the package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFileEntry {
    /// Final lower-cased in-package path
    pub target_path: String,
    /// Staged source path; empty when emulating the package filesystem
    pub original_path: String,
    pub chunk_id: u32,
    pub use_compression: bool,
}

/// Everything staging needs from the configuration
#[derive(Debug)]
pub struct StageSettings {
    pub title_id: String,
    pub executable: String,
    pub configuration: String,
    pub mode: PackageMode,
    pub distribution: bool,
    pub deny: Vec<String>,
    pub rules: ChunkRules,
    pub languages: LanguageTable,
    pub layer_table: BTreeMap<u32, u32>,
    pub layer_file: Option<PathBuf>,
    pub policy: LayerPolicy,
    pub pfs_compression: bool,
    pub uncompressed_extensions: HashSet<String>,
}

impl StageSettings {
    /// Resolve settings for one title
    pub fn from_config(config: &DeployConfig, title_id: &str) -> Result<Self> {
        let package = &config.package;
        Ok(Self {
            title_id: title_id.to_string(),
            executable: config.project.executable.clone(),
            configuration: config.project.configuration.clone(),
            mode: package.mode,
            distribution: package.distribution,
            deny: package.exclude_files.clone(),
            rules: ChunkRules::from_config(&config.chunks)?,
            languages: LanguageTable::new(config.languages.clone()),
            layer_table: layer_table(&config.chunks.layers),
            layer_file: config.chunks.layer_file.clone(),
            policy: LayerPolicy {
                storage_type: config.storage_type(),
                mode: package.mode,
                force_dual_layer: package.force_dual_layer,
            },
            pfs_compression: package.pfs_compression,
            uncompressed_extensions: package
                .uncompressed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        })
    }

    fn compress(&self, target_path: &str) -> bool {
        let extension = target_path.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        self.pfs_compression && !self.uncompressed_extensions.contains(extension)
    }
}

/// Result of mapping a stage directory
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// Entries grouped by layer (index = layer number)
    pub layers: Vec<Vec<StagedFileEntry>>,
    pub chunk_count: u32,
    /// Layer of each chunk (index = chunk id)
    pub chunk_layers: Vec<u32>,
    /// Storage type after reconciliation with the layer assignment
    pub storage_type: StorageType,
    /// Staged files left out, with the reason
    pub excluded: Vec<(String, ExcludeReason)>,
}

impl StagePlan {
    /// All entries, layer by layer
    pub fn entries(&self) -> impl Iterator<Item = &StagedFileEntry> {
        self.layers.iter().flatten()
    }

    /// Entry for a target path
    pub fn entry(&self, target_path: &str) -> Option<&StagedFileEntry> {
        self.entries().find(|e| e.target_path == target_path)
    }

    /// Every directory that holds a packaged file
    pub fn directories(&self) -> BTreeSet<String> {
        let mut dirs = BTreeSet::new();
        for entry in self.entries() {
            let mut path = entry.target_path.as_str();
            while let Some((parent, _)) = path.rsplit_once('/') {
                dirs.insert(parent.to_string());
                path = parent;
            }
        }
        dirs
    }
}

/// Staged file with its relative (normalized) path
struct StagedSource {
    relative: String,
    absolute: PathBuf,
}

fn collect_stage_files(stage_dir: &Path) -> Result<Vec<StagedSource>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(stage_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(stage_dir)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let relative = relative.to_string_lossy().replace('\\', "/").to_lowercase();
        if relative == EMULATION_MANIFEST {
            continue;
        }
        files.push(StagedSource {
            relative,
            absolute: entry.path().to_path_buf(),
        });
    }
    Ok(files)
}

/// Map a stage directory into a package plan
///
/// With `emulate` set, entries carry no original path so the manifest
/// describes the package filesystem as the devkit will see it.
pub fn build_stage_plan(
    stage_dir: &Path,
    settings: &StageSettings,
    session: &mut BuildSession,
    emulate: bool,
) -> Result<StagePlan> {
    let index = session.begin_stage();
    info!(
        "Staging {} for {} (pass {})",
        stage_dir.display(),
        settings.title_id,
        index
    );

    let sources = collect_stage_files(stage_dir)?;
    let relatives: Vec<&str> = sources.iter().map(|s| s.relative.as_str()).collect();
    let filter = StageFilter::new(
        FilterOptions {
            deny: &settings.deny,
            executable: &settings.executable,
            configuration: &settings.configuration,
            mode: settings.mode,
            title_id: &settings.title_id,
            distribution: settings.distribution,
        },
        &relatives,
    );

    let mut entries = Vec::with_capacity(sources.len());
    let mut excluded = Vec::new();
    let mut targets: HashMap<String, String> = HashMap::new();

    for source in &sources {
        let target = match filter.classify(&source.relative, session.eboot_flag()) {
            Disposition::Include(target) => target,
            Disposition::Exclude(reason) => {
                debug!("Excluding {}: {}", source.relative, reason);
                excluded.push((source.relative.clone(), reason));
                continue;
            }
        };

        let chunk_id = settings.rules.resolve(&source.relative);
        let extension = target.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        if CONTAINER_EXTENSIONS.contains(&extension)
            && settings.languages.is_placeholder_chunk(chunk_id)
        {
            debug!("Excluding {}: placeholder language chunk {}", source.relative, chunk_id);
            excluded.push((source.relative.clone(), ExcludeReason::PlaceholderLanguage));
            continue;
        }

        let target_path = match target.rsplit_once('/') {
            Some((dir, file)) => {
                let dir = session.shortener_mut().register(dir)?;
                format!("{}/{}", dir.new_path, file)
            }
            None => target,
        };

        if let Some(previous) = targets.insert(target_path.clone(), source.relative.clone()) {
            return Err(Error::InvalidPath(format!(
                "{} and {} both map to {}",
                previous, source.relative, target_path
            )));
        }

        entries.push(StagedFileEntry {
            use_compression: settings.compress(&target_path),
            target_path,
            original_path: if emulate {
                String::new()
            } else {
                source.absolute.display().to_string()
            },
            chunk_id,
        });
    }

    if !session.eboot_created() {
        warn!(
            "No executable matching '{}' was staged; package has no eboot.bin",
            settings.executable
        );
    }

    let chunk_count = total_chunk_count(
        entries.iter().map(|e| e.chunk_id),
        settings.languages.chunks(),
    )?;

    let table = match &settings.layer_file {
        Some(path) => match read_layer_file(path)? {
            Some(table) => table,
            None => settings.layer_table.clone(),
        },
        None => settings.layer_table.clone(),
    };
    let mut chunk_layers = assign_layers(chunk_count, &table);
    let storage_type = adjust_layers(&mut chunk_layers, settings.policy);

    let layer_count = chunk_layers.iter().copied().max().unwrap_or(0) as usize + 1;
    let mut layers: Vec<Vec<StagedFileEntry>> = vec![Vec::new(); layer_count];
    for entry in entries {
        let layer = chunk_layers[entry.chunk_id as usize] as usize;
        layers[layer].push(entry);
    }

    info!(
        "Staged {} files in {} chunks ({} excluded), storage {}",
        layers.iter().map(Vec::len).sum::<usize>(),
        chunk_count,
        excluded.len(),
        storage_type
    );

    Ok(StagePlan {
        layers,
        chunk_count,
        chunk_layers,
        storage_type,
        excluded,
    })
}
