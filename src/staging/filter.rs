// src/staging/filter.rs
//! Exclusion policy and target path remapping for staged files
//!
//! Decides, per staged file, whether it goes into the package and under
//! which in-package name. Paths given to the filter are already relative to
//! the stage directory, lower-cased and slash separated.

use crate::config::PackageMode;
use std::collections::HashSet;
use std::fmt;

/// Name the active executable is packaged under
pub const EBOOT_NAME: &str = "eboot.bin";

const SCE_SYS_DIR: &str = "sce_sys/";
const SCE_MODULE_DIR: &str = "sce_module/";
const PRX_DIR: &str = "prx";
const SYMBOL_EXTENSIONS: &[&str] = &["sym", "elf"];

/// Why a staged file was left out of the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    DenyList,
    InactiveExecutable,
    DuplicateEboot,
    SfoVariant,
    NpTitleVariant,
    StaleSymbols,
    DistributionSymbols,
    PlaceholderLanguage,
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::DenyList => "deny-listed file name",
            Self::InactiveExecutable => "executable for another configuration",
            Self::DuplicateEboot => "eboot.bin already staged",
            Self::SfoVariant => "param.sfo variant for another package mode",
            Self::NpTitleVariant => "nptitle.dat variant for another title",
            Self::StaleSymbols => "symbols for another configuration",
            Self::DistributionSymbols => "symbols are not shipped in distribution packages",
            Self::PlaceholderLanguage => "container data for an EMPTY language chunk",
        };
        f.write_str(text)
    }
}

/// Outcome of classifying one staged file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Package the file under this target path
    Include(String),
    Exclude(ExcludeReason),
}

/// Per-stage exclusion and remapping rules
#[derive(Debug, Clone)]
pub struct StageFilter {
    deny: HashSet<String>,
    executable: String,
    mode: PackageMode,
    title_nptitle: String,
    has_title_nptitle: bool,
    distribution: bool,
}

/// Builder inputs for [`StageFilter`]
#[derive(Debug, Clone)]
pub struct FilterOptions<'a> {
    pub deny: &'a [String],
    pub executable: &'a str,
    pub configuration: &'a str,
    pub mode: PackageMode,
    pub title_id: &'a str,
    pub distribution: bool,
}

impl StageFilter {
    /// Create a filter for the given stage contents
    ///
    /// The full list of relative paths is needed up front to know whether a
    /// title-specific `nptitle` file or a per-configuration executable
    /// (`<executable>-ps4-<configuration>.self`) exists. When it does, it
    /// wins over the plain `<executable>.self`.
    pub fn new<S: AsRef<str>>(options: FilterOptions<'_>, relative_paths: &[S]) -> Self {
        let title_nptitle = format!(
            "{}nptitle_{}.dat",
            SCE_SYS_DIR,
            options.title_id.to_lowercase()
        );
        let has_title_nptitle = relative_paths
            .iter()
            .any(|p| p.as_ref() == title_nptitle);

        let base = options.executable.to_lowercase();
        let configured = format!("{}-ps4-{}.self", base, options.configuration.to_lowercase());
        let executable = if !options.configuration.is_empty()
            && relative_paths
                .iter()
                .any(|p| p.as_ref().rsplit('/').next() == Some(configured.as_str()))
        {
            configured.trim_end_matches(".self").to_string()
        } else {
            base
        };

        Self {
            deny: options.deny.iter().map(|d| d.to_lowercase()).collect(),
            executable,
            mode: options.mode,
            title_nptitle,
            has_title_nptitle,
            distribution: options.distribution,
        }
    }

    /// Decide whether and where a staged file is packaged
    ///
    /// `eboot_created` tracks whether an `eboot.bin` has already been
    /// emitted for this stage.
    pub fn classify(&self, relative: &str, eboot_created: &mut bool) -> Disposition {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        if self.deny.contains(file_name) {
            return Disposition::Exclude(ExcludeReason::DenyList);
        }

        if extension == "self" || relative == EBOOT_NAME {
            if extension == "self" && stem != self.executable {
                return Disposition::Exclude(ExcludeReason::InactiveExecutable);
            }
            if *eboot_created {
                return Disposition::Exclude(ExcludeReason::DuplicateEboot);
            }
            *eboot_created = true;
            return Disposition::Include(EBOOT_NAME.to_string());
        }

        if SYMBOL_EXTENSIONS.contains(&extension) {
            if self.distribution {
                return Disposition::Exclude(ExcludeReason::DistributionSymbols);
            }
            if stem != self.executable {
                return Disposition::Exclude(ExcludeReason::StaleSymbols);
            }
            return Disposition::Include(relative.to_string());
        }

        if let Some(sys_name) = relative.strip_prefix(SCE_SYS_DIR) {
            if sys_name.starts_with("param") && sys_name.ends_with(".sfo") {
                let wanted = format!("param{}.sfo", self.mode.sfo_suffix());
                return if sys_name == wanted {
                    Disposition::Include(format!("{}param.sfo", SCE_SYS_DIR))
                } else {
                    Disposition::Exclude(ExcludeReason::SfoVariant)
                };
            }
            if sys_name.starts_with("nptitle") && sys_name.ends_with(".dat") {
                let selected = if self.has_title_nptitle {
                    relative == self.title_nptitle
                } else {
                    sys_name == "nptitle.dat"
                };
                return if selected {
                    Disposition::Include(format!("{}nptitle.dat", SCE_SYS_DIR))
                } else {
                    Disposition::Exclude(ExcludeReason::NpTitleVariant)
                };
            }
        }

        if extension == "prx" && !relative.starts_with(SCE_MODULE_DIR) {
            return Disposition::Include(format!("{}/{}", PRX_DIR, file_name));
        }

        Disposition::Include(relative.to_string())
    }
}
