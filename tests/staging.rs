// tests/staging.rs

//! End-to-end staging tests: stage tree in, package plan and GP4 out.

mod common;

use common::{stage_tree, write_file};
use orbis_deploy::config::DeployConfig;
use orbis_deploy::gp4::{PackageDescriptor, render_gp4};
use orbis_deploy::package::prepare_packages;
use orbis_deploy::staging::{
    EMULATION_MANIFEST, PathShortener, StageSettings, StorageType, build_stage_plan, path_crc,
};
use orbis_deploy::{BuildSession, Error};

fn settings(config: &DeployConfig) -> StageSettings {
    StageSettings::from_config(config, "CUSA00001").unwrap()
}

#[test]
fn test_deep_file_and_prx_remap() {
    let stage = stage_tree(&["eboot.self", "a/b/c/d/e/f/g/x.pak", "h.prx"]);
    let config = DeployConfig::default();
    let mut session = BuildSession::new();

    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();

    let deep = plan.entry("deepfiles/a44f46f4/x.pak").expect("deep file shortened");
    assert_eq!(deep.chunk_id, 0);
    assert!(!deep.use_compression);

    let prx = plan.entry("prx/h.prx").expect("prx remapped");
    assert_eq!(prx.chunk_id, 0);

    assert!(plan.entry("eboot.bin").is_some());
    assert_eq!(
        session.shortener().resolve("deepfiles/a44f46f4"),
        Some("a/b/c/d/e/f/g")
    );
    assert_eq!(path_crc("a/b/c/d/e/f/g"), 0xa44f46f4);
}

#[test]
fn test_shallow_directories_untouched() {
    let stage = stage_tree(&["eboot.self", "a/b/c/d/e/x.txt"]);
    let config = DeployConfig::default();
    let mut session = BuildSession::new();

    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();
    assert!(plan.entry("a/b/c/d/e/x.txt").is_some());
    assert!(session.shortener().mappings().is_empty());
}

#[test]
fn test_forced_collision_is_fatal() {
    let stage = stage_tree(&[
        "eboot.self",
        "a/b/c/d/e/f/one.txt",
        "z/y/x/w/v/u/two.txt",
    ]);
    let config = DeployConfig::default();
    let mut session = BuildSession::with_shortener(PathShortener::with_hasher(|_| 0xdead));

    let err = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap_err();
    match err {
        Error::PathCollision { shortened, .. } => assert_eq!(shortened, "deepfiles/dead"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_chunk_rules_and_language_chunks() {
    let stage = stage_tree(&[
        "eboot.self",
        "content/paks/pakchunk3-ps4.pak",
        "content/movies/intro.bk2",
        "content/audio/fr/voice.at9",
    ]);
    let config = DeployConfig::parse(
        r#"
[chunks]
custom = ["*.bk2:2"]

[[chunks.install_bundles]]
chunk = 1
patterns = ["^content/audio/"]

[[languages]]
culture = "en-US"
label = "English"
chunk = 0
default = true

[[languages]]
culture = "ja"
label = "Japanese"
chunk = 5
"#,
    )
    .unwrap();
    let mut session = BuildSession::new();
    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();

    assert_eq!(plan.entry("content/movies/intro.bk2").unwrap().chunk_id, 2);
    assert_eq!(plan.entry("content/audio/fr/voice.at9").unwrap().chunk_id, 1);
    assert_eq!(plan.entry("content/paks/pakchunk3-ps4.pak").unwrap().chunk_id, 3);
    // Language chunk 5 extends the count past the highest file chunk
    assert_eq!(plan.chunk_count, 6);
    assert_eq!(plan.chunk_layers.len(), 6);
}

#[test]
fn test_force_dual_layer_on_disc() {
    let stage = stage_tree(&["eboot.self", "content/paks/pakchunk1-ps4.pak"]);
    let config = DeployConfig::parse(
        r#"
[package]
storage_type = "bd50"
force_dual_layer = true
"#,
    )
    .unwrap();
    let mut session = BuildSession::new();
    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();

    assert_eq!(plan.chunk_layers, vec![0, 1]);
    assert_eq!(plan.storage_type, StorageType::Bd50);
    assert_eq!(plan.layers.len(), 2);
    assert_eq!(plan.layers[1][0].target_path, "content/paks/pakchunk1-ps4.pak");
}

#[test]
fn test_force_dual_layer_on_default_digital_storage() {
    let stage = stage_tree(&["eboot.self", "content/paks/pakchunk1-ps4.pak"]);
    let config = DeployConfig::parse("[package]\nforce_dual_layer = true\n").unwrap();
    let mut session = BuildSession::new();
    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();

    assert_eq!(plan.chunk_layers, vec![0, 1]);
    assert_eq!(plan.storage_type, StorageType::Digital50);
}

#[test]
fn test_huge_pakchunk_name_lands_in_chunk_zero() {
    let stage = stage_tree(&[
        "eboot.self",
        "content/paks/pakchunk4294967295-ps4.pak",
        "content/paks/pakchunk99999999-ps4.pak",
    ]);
    let config = DeployConfig::default();
    let mut session = BuildSession::new();
    let plan = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap();

    assert_eq!(plan.chunk_count, 1);
    assert_eq!(
        plan.entry("content/paks/pakchunk4294967295-ps4.pak").unwrap().chunk_id,
        0
    );
    assert_eq!(
        plan.entry("content/paks/pakchunk99999999-ps4.pak").unwrap().chunk_id,
        0
    );
}

#[test]
fn test_out_of_range_language_chunk_is_rejected() {
    let stage = stage_tree(&["eboot.self"]);
    let config = DeployConfig::parse(
        r#"
[[languages]]
culture = "en-US"
label = "English"
chunk = 4294967295
"#,
    )
    .unwrap();
    let mut session = BuildSession::new();
    let err = build_stage_plan(stage.path(), &settings(&config), &mut session, false).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_patch_titles_flatten_layers() {
    let stage = stage_tree(&[
        "eboot.self",
        "sce_sys/param.sfo",
        "sce_sys/param_patch.sfo",
        "content/paks/pakchunk1-ps4.pak",
    ]);
    let work = tempfile::tempdir().unwrap();
    let layer_file = work.path().join("layers.txt");
    write_file(&layer_file, "# chunk layer\n0 0\n1 1\n");

    let config = DeployConfig::parse(&format!(
        r#"
[project]
titles = [{{ title_id = "CUSA00001" }}, {{ title_id = "CUSA00002" }}]

[package]
mode = "patch"
storage_type = "bd50"

[chunks]
layer_file = "{}"

[packaging]
output_dir = "{}"
"#,
        layer_file.display().to_string().replace('\\', "/"),
        work.path().join("out").display().to_string().replace('\\', "/"),
    ))
    .unwrap();

    let mut session = BuildSession::new();
    let jobs = prepare_packages(&config, stage.path(), &[], &mut session).unwrap();
    assert_eq!(jobs.len(), 2);

    for job in &jobs {
        assert_eq!(job.plan.chunk_count, 2);
        assert_eq!(job.plan.chunk_layers, vec![0, 0]);
        assert_eq!(job.plan.storage_type, StorageType::Digital50);
        assert!(job.plan.entry("sce_sys/param.sfo").is_some());

        let gp4 = std::fs::read_to_string(&job.gp4_path).unwrap();
        assert!(gp4.contains("<volume_type>pkg_ps4_patch</volume_type>"));
        assert!(gp4.contains("storage_type=\"digital50\""));
        assert!(!gp4.contains("layer_no"));
    }

    let manifest = std::fs::read_to_string(stage.path().join(EMULATION_MANIFEST)).unwrap();
    assert!(manifest.contains("orig_path=\"\""));
}

#[test]
fn test_emulated_gp4_has_empty_origins() {
    let stage = stage_tree(&["eboot.self", "content/a.txt"]);
    let config = DeployConfig::default();
    let settings = settings(&config);
    let mut session = BuildSession::new();
    let plan = build_stage_plan(stage.path(), &settings, &mut session, true).unwrap();

    let descriptor = PackageDescriptor::new(
        &plan,
        &settings.languages,
        "UP0000-CUSA00001_00-0000000000000000",
        config.passcode(),
        settings.mode,
    );
    let xml = render_gp4(&descriptor).unwrap();
    assert!(xml.contains("<file targ_path=\"eboot.bin\" orig_path=\"\" chunks=\"0\" pfs_compression=\"enable\"/>"));
    assert!(xml.contains("<dir targ_name=\"content\"/>"));
}
