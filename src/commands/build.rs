// src/commands/build.rs

//! Staging and packaging commands

use super::{load_config, publish_tool};
use anyhow::{Context, Result};
use orbis_deploy::BuildSession;
use orbis_deploy::package::{package_titles, prepare_packages};
use orbis_deploy::staging::shorten;
use std::path::Path;
use tracing::info;

/// Stage one title and write its GP4 project
pub fn cmd_stage(
    config_path: &Path,
    stage_dir: &Path,
    title: Option<&str>,
    output_dir: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = output_dir {
        config.packaging.output_dir = dir.to_path_buf();
    }

    let requested: Vec<String> = match title {
        Some(t) => vec![t.to_string()],
        None => config
            .titles()
            .first()
            .map(|t| vec![t.title_id.clone()])
            .unwrap_or_default(),
    };

    info!(
        "Staging {} build of {}",
        config.project.configuration, config.project.executable
    );
    let mut session = BuildSession::new();
    let jobs = prepare_packages(&config, stage_dir, &requested, &mut session)
        .with_context(|| format!("Failed to stage {}", stage_dir.display()))?;

    for job in &jobs {
        let plan = &job.plan;
        println!("Title: {} ({})", job.title_id, job.content_id);
        println!("  Project: {}", job.gp4_path.display());
        println!("  Storage: {}", plan.storage_type);
        println!("  Chunks: {}", plan.chunk_count);
        println!("  Files: {}", plan.entries().count());
        println!("  Excluded: {}", plan.excluded.len());

        if verbose {
            for (layer, entries) in plan.layers.iter().enumerate() {
                for entry in entries {
                    println!(
                        "    [layer {}] chunk {:<3} {}{}",
                        layer,
                        entry.chunk_id,
                        entry.target_path,
                        if entry.use_compression { "" } else { " (uncompressed)" }
                    );
                }
            }
            for (path, reason) in &plan.excluded {
                println!("    [excluded] {} - {}", path, reason);
            }
        }
    }

    let shortened = session.shortener().mappings();
    if !shortened.is_empty() {
        println!("Shortened directories: {}", shortened.len());
        if verbose {
            let mut mappings: Vec<_> = shortened.iter().collect();
            mappings.sort();
            for (short, original) in mappings {
                println!("  {} <- {}", short, original);
            }
        }
    }

    Ok(())
}

/// Stage and package the requested titles
pub fn cmd_package(config_path: &Path, stage_dir: &Path, titles: &[String]) -> Result<()> {
    let config = load_config(config_path)?;
    let tool = publish_tool(&config);
    let mut session = BuildSession::new();

    let jobs = package_titles(&config, stage_dir, titles, &tool, &mut session)
        .context("Packaging failed")?;

    println!("Created {} package(s):", jobs.len());
    for job in &jobs {
        println!("  {} -> {}", job.title_id, job.output_dir.display());
    }
    info!("Packaging tool ran {} time(s)", session.publish_runs());
    Ok(())
}

/// Unpack a package with the configured passcode
pub fn cmd_extract(config_path: &Path, package: &Path, output: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    publish_tool(&config)
        .img_extract(package, &config.passcode(), output)
        .with_context(|| format!("Failed to extract {}", package.display()))?;
    println!("Extracted {} to {}", package.display(), output.display());
    Ok(())
}

/// Print the shortened form of each path
pub fn cmd_shorten(paths: &[String]) -> Result<()> {
    for path in paths {
        let result = shorten(path);
        if result.shortened {
            println!("{} -> {}", path, result.new_path);
        } else {
            println!("{} (unchanged)", result.new_path);
        }
    }
    Ok(())
}
