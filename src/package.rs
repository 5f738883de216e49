// src/package.rs

//! Package creation with the vendor publishing tool
//!
//! Plans and GP4 projects are produced sequentially, one per requested title
//! id, because staging mutates the build session. The packaging tool runs
//! are then fanned out with rayon; each task waits `index * stagger` before
//! starting. Failures are counted and reported once all tasks finish.

use crate::config::{DeployConfig, PackageMode, TitleConfig, content_title_id};
use crate::error::{Error, Result};
use crate::gp4::{PackageDescriptor, write_emulation_manifest, write_gp4};
use crate::session::BuildSession;
use crate::staging::{StagePlan, StageSettings, build_stage_plan};
use crate::tool::{VendorTool, args};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// The vendor packaging tool
#[derive(Debug, Clone)]
pub struct PublishTool {
    tool: VendorTool,
    timeout: Duration,
}

impl PublishTool {
    pub fn new(tool: VendorTool, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    /// Build a package from a GP4 project into `output_dir`
    pub fn img_create(&self, gp4: &Path, output_dir: &Path) -> Result<()> {
        self.tool.invoke(
            &args([
                "img_create".to_string(),
                gp4.display().to_string(),
                output_dir.display().to_string(),
            ]),
            self.timeout,
        )?;
        Ok(())
    }

    /// Unpack a package
    pub fn img_extract(&self, package: &Path, passcode: &str, output_dir: &Path) -> Result<()> {
        self.tool.invoke(
            &args([
                "img_extract".to_string(),
                format!("--passcode={}", passcode),
                package.display().to_string(),
                output_dir.display().to_string(),
            ]),
            self.timeout,
        )?;
        Ok(())
    }

    /// Build `param.sfo` from a `param.sfx` description
    pub fn sfo_create(&self, sfx: &Path, sfo: &Path) -> Result<()> {
        if let Some(parent) = sfo.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.tool.invoke(
            &args([
                "sfo_create".to_string(),
                sfx.display().to_string(),
                sfo.display().to_string(),
            ]),
            self.timeout,
        )?;
        Ok(())
    }
}

/// Check title metadata and select the requested titles
///
/// Every configured content id must embed its own title id; every requested
/// id must be configured. An empty request selects all configured titles.
pub fn verify_titles(configured: &[TitleConfig], requested: &[String]) -> Result<Vec<TitleConfig>> {
    for title in configured {
        let content_id = title.content_id();
        match content_title_id(&content_id) {
            Some(found) if found == title.title_id => {}
            found => {
                return Err(Error::TitleIdMismatch {
                    requested: title.title_id.clone(),
                    found: found.unwrap_or(content_id.as_str()).to_string(),
                });
            }
        }
    }

    if requested.is_empty() {
        return Ok(configured.to_vec());
    }

    requested
        .iter()
        .map(|id| {
            configured
                .iter()
                .find(|t| t.title_id.eq_ignore_ascii_case(id))
                .cloned()
                .ok_or_else(|| Error::TitleIdMismatch {
                    requested: id.clone(),
                    found: configured
                        .iter()
                        .map(|t| t.title_id.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}

/// A GP4 project ready for the packaging tool
#[derive(Debug, Clone)]
pub struct PackageJob {
    pub title_id: String,
    pub content_id: String,
    pub gp4_path: PathBuf,
    pub output_dir: PathBuf,
    pub plan: StagePlan,
}

/// Stage one title and write its GP4 project (and emulation manifest)
pub fn prepare_title(
    config: &DeployConfig,
    title: &TitleConfig,
    stage_dir: &Path,
    output_root: &Path,
    session: &mut BuildSession,
) -> Result<PackageJob> {
    let settings = StageSettings::from_config(config, &title.title_id)?;
    let plan = build_stage_plan(stage_dir, &settings, session, false)?;

    let content_id = title.content_id();
    let passcode = config.passcode();
    let mut descriptor = PackageDescriptor::new(
        &plan,
        &settings.languages,
        content_id.clone(),
        passcode.clone(),
        settings.mode,
    );
    descriptor.app_path = config.package.base_app_pkg.clone();
    if settings.mode == PackageMode::Patch && descriptor.app_path.is_none() {
        warn!(
            "Patch package for {} has no base application package configured",
            title.title_id
        );
    }

    let output_dir = output_root.join(&title.title_id);
    let gp4_path = output_dir.join(format!("{}.gp4", title.title_id));
    write_gp4(&gp4_path, &descriptor)?;

    if !settings.distribution {
        let emulated = build_stage_plan(stage_dir, &settings, session, true)?;
        let mut emulation = PackageDescriptor::new(
            &emulated,
            &settings.languages,
            content_id.clone(),
            passcode,
            settings.mode,
        );
        emulation.app_path = descriptor.app_path.clone();
        write_emulation_manifest(stage_dir, &emulation)?;
    }

    Ok(PackageJob {
        title_id: title.title_id.clone(),
        content_id,
        gp4_path,
        output_dir,
        plan,
    })
}

/// Verify titles and prepare a job for each requested one
pub fn prepare_packages(
    config: &DeployConfig,
    stage_dir: &Path,
    requested: &[String],
    session: &mut BuildSession,
) -> Result<Vec<PackageJob>> {
    let titles = verify_titles(&config.titles(), requested)?;
    let output_root = &config.packaging.output_dir;
    titles
        .iter()
        .map(|title| prepare_title(config, title, stage_dir, output_root, session))
        .collect()
}

/// Run the packaging tool for every job in parallel
pub fn create_packages(
    tool: &PublishTool,
    jobs: &[PackageJob],
    stagger: Duration,
    session: &BuildSession,
) -> Result<()> {
    let failures = AtomicUsize::new(0);

    jobs.par_iter().enumerate().for_each(|(index, job)| {
        thread::sleep(stagger * index as u32);
        let run = session.record_publish_run();
        info!(
            "Packaging {} (run {}) from {}",
            job.title_id,
            run,
            job.gp4_path.display()
        );
        let result = std::fs::create_dir_all(&job.output_dir)
            .map_err(Error::from)
            .and_then(|_| tool.img_create(&job.gp4_path, &job.output_dir));
        if let Err(e) = result {
            error!("Packaging {} failed: {}", job.title_id, e);
            failures.fetch_add(1, Ordering::Relaxed);
        }
    });

    let failed = failures.into_inner();
    if failed > 0 {
        return Err(Error::PackagingFailed {
            failed,
            total: jobs.len(),
        });
    }
    info!("Created {} package(s)", jobs.len());
    Ok(())
}

/// Stage, describe and package the requested titles
pub fn package_titles(
    config: &DeployConfig,
    stage_dir: &Path,
    requested: &[String],
    tool: &PublishTool,
    session: &mut BuildSession,
) -> Result<Vec<PackageJob>> {
    if let Some(sfx) = &config.package.param_sfx {
        tool.sfo_create(sfx, &stage_dir.join("sce_sys/param.sfo"))?;
    }
    let jobs = prepare_packages(config, stage_dir, requested, session)?;
    create_packages(
        tool,
        &jobs,
        Duration::from_secs(config.packaging.stagger_secs),
        session,
    )?;
    Ok(jobs)
}
