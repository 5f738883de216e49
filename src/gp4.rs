// src/gp4.rs

//! GP4 package project writer
//!
//! Serializes a [`StagePlan`] into the XML project consumed by the vendor
//! packaging tool. The same writer produces the playgo emulation manifest,
//! which is a GP4 project whose files carry no original path.

use crate::config::PackageMode;
use crate::error::Result;
use crate::staging::{EMULATION_MANIFEST, LanguageTable, StagePlan, scenario_order};
use chrono::{Local, NaiveDateTime};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const VOLUME_ID: &str = "PS4VOLUME";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inputs for one GP4 project
#[derive(Debug, Clone)]
pub struct PackageDescriptor<'a> {
    pub plan: &'a StagePlan,
    pub languages: &'a LanguageTable,
    pub content_id: String,
    pub passcode: String,
    pub mode: PackageMode,
    /// Base application package a patch applies to
    pub app_path: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl<'a> PackageDescriptor<'a> {
    pub fn new(
        plan: &'a StagePlan,
        languages: &'a LanguageTable,
        content_id: impl Into<String>,
        passcode: impl Into<String>,
        mode: PackageMode,
    ) -> Self {
        Self {
            plan,
            languages,
            content_id: content_id.into(),
            passcode: passcode.into(),
            mode,
            app_path: None,
            timestamp: Local::now().naive_local(),
        }
    }
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn element<'a>(name: &'a str, attributes: &[(&str, String)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        start.push_attribute((*key, value.as_str()));
    }
    start
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the GP4 project as a string
pub fn render_gp4(descriptor: &PackageDescriptor<'_>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    writer.write_event(Event::Start(element(
        "psproject",
        &[("fmt", "gp4".to_string()), ("version", "1000".to_string())],
    )))?;

    write_volume(&mut writer, descriptor)?;
    write_files(&mut writer, descriptor.plan)?;
    write_rootdir(&mut writer, descriptor.plan)?;

    writer.write_event(Event::End(BytesEnd::new("psproject")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_volume(writer: &mut XmlWriter, descriptor: &PackageDescriptor<'_>) -> Result<()> {
    let plan = descriptor.plan;
    writer.write_event(Event::Start(BytesStart::new("volume")))?;
    text_element(writer, "volume_type", descriptor.mode.volume_type())?;
    text_element(writer, "volume_id", VOLUME_ID)?;
    text_element(
        writer,
        "volume_ts",
        &descriptor.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    )?;

    let mut package = vec![
        ("content_id", descriptor.content_id.clone()),
        ("passcode", descriptor.passcode.clone()),
        ("storage_type", plan.storage_type.as_str().to_string()),
        ("app_type", "full".to_string()),
    ];
    if let Some(app_path) = &descriptor.app_path {
        package.push(("app_path", app_path.clone()));
    }
    writer.write_event(Event::Empty(element("package", &package)))?;

    writer.write_event(Event::Start(element(
        "chunk_info",
        &[
            ("chunk_count", plan.chunk_count.to_string()),
            ("scenario_count", "1".to_string()),
        ],
    )))?;
    write_chunks(writer, descriptor)?;
    write_scenarios(writer, descriptor)?;
    writer.write_event(Event::End(BytesEnd::new("chunk_info")))?;

    writer.write_event(Event::End(BytesEnd::new("volume")))?;
    Ok(())
}

fn write_chunks(writer: &mut XmlWriter, descriptor: &PackageDescriptor<'_>) -> Result<()> {
    let plan = descriptor.plan;
    let languages = descriptor.languages;

    let mut attributes = Vec::new();
    let supported = languages.supported_languages();
    if !supported.is_empty() {
        attributes.push(("supported_languages", supported.join(" ")));
    }
    if let Some(default) = languages.default_language() {
        attributes.push(("default_language", default.to_string()));
    }
    writer.write_event(Event::Start(element("chunks", &attributes)))?;

    let disc = plan.storage_type.is_disc();
    for id in 0..plan.chunk_count {
        let mut chunk = vec![("id", id.to_string())];
        if disc {
            let layer = plan.chunk_layers.get(id as usize).copied().unwrap_or(0);
            chunk.push(("layer_no", layer.to_string()));
        }
        let cultures = languages.languages_for_chunk(id);
        if !cultures.is_empty() {
            chunk.push(("languages", cultures.join(" ")));
        }
        let label = languages
            .label_for_chunk(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Chunk #{}", id));
        chunk.push(("label", label));
        writer.write_event(Event::Empty(element("chunk", &chunk)))?;
    }

    writer.write_event(Event::End(BytesEnd::new("chunks")))?;
    Ok(())
}

fn write_scenarios(writer: &mut XmlWriter, descriptor: &PackageDescriptor<'_>) -> Result<()> {
    let count = descriptor.plan.chunk_count;
    let initial = descriptor.languages.initial_chunks();
    let initial_count = initial.iter().filter(|c| **c < count).count();
    let order = scenario_order(count, &initial);

    writer.write_event(Event::Start(element(
        "scenarios",
        &[("default_id", "0".to_string())],
    )))?;
    writer.write_event(Event::Start(element(
        "scenario",
        &[
            ("id", "0".to_string()),
            ("type", "sp".to_string()),
            ("initial_chunk_count", initial_count.to_string()),
            ("label", "Scenario #0".to_string()),
        ],
    )))?;
    writer.write_event(Event::Text(BytesText::new(&join(order))))?;
    writer.write_event(Event::End(BytesEnd::new("scenario")))?;
    writer.write_event(Event::End(BytesEnd::new("scenarios")))?;
    Ok(())
}

fn write_files(writer: &mut XmlWriter, plan: &StagePlan) -> Result<()> {
    writer.write_event(Event::Start(element("files", &[("img_no", "0".to_string())])))?;
    for entry in plan.entries() {
        let mut file = vec![
            ("targ_path", entry.target_path.clone()),
            ("orig_path", entry.original_path.clone()),
            ("chunks", entry.chunk_id.to_string()),
        ];
        if entry.use_compression {
            file.push(("pfs_compression", "enable".to_string()));
        }
        writer.write_event(Event::Empty(element("file", &file)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("files")))?;
    Ok(())
}

#[derive(Default)]
struct DirNode {
    children: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }
}

fn write_rootdir(writer: &mut XmlWriter, plan: &StagePlan) -> Result<()> {
    let mut root = DirNode::default();
    for dir in plan.directories() {
        root.insert(&dir);
    }

    if root.children.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("rootdir")))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new("rootdir")))?;
    write_dirs(writer, &root)?;
    writer.write_event(Event::End(BytesEnd::new("rootdir")))?;
    Ok(())
}

fn write_dirs(writer: &mut XmlWriter, node: &DirNode) -> Result<()> {
    for (name, child) in &node.children {
        let dir = element("dir", &[("targ_name", name.clone())]);
        if child.children.is_empty() {
            writer.write_event(Event::Empty(dir))?;
        } else {
            writer.write_event(Event::Start(dir))?;
            write_dirs(writer, child)?;
            writer.write_event(Event::End(BytesEnd::new("dir")))?;
        }
    }
    Ok(())
}

/// Write a GP4 project to `path`
pub fn write_gp4(path: &Path, descriptor: &PackageDescriptor<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_gp4(descriptor)?)?;
    info!(
        "Wrote {} ({} files, {} chunks)",
        path.display(),
        descriptor.plan.entries().count(),
        descriptor.plan.chunk_count
    );
    Ok(())
}

/// Write the (disabled) playgo emulation manifest into the stage directory
pub fn write_emulation_manifest(
    stage_dir: &Path,
    descriptor: &PackageDescriptor<'_>,
) -> Result<PathBuf> {
    let path = stage_dir.join(EMULATION_MANIFEST);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, render_gp4(descriptor)?)?;
    debug!("Wrote emulation manifest {}", path.display());
    Ok(path)
}
