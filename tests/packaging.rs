// tests/packaging.rs

//! Parallel packaging tests with a scripted publishing tool.

mod common;

use common::{MockRunner, stage_tree};
use orbis_deploy::config::DeployConfig;
use orbis_deploy::package::{PublishTool, create_packages, package_titles, prepare_packages};
use orbis_deploy::{BuildSession, Error, VendorTool};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn publish(runner: &Arc<MockRunner>) -> PublishTool {
    PublishTool::new(
        VendorTool::new("orbis-pub-cmd", runner.clone()),
        Duration::from_secs(5),
    )
}

fn two_title_config(output_dir: &std::path::Path) -> DeployConfig {
    DeployConfig::parse(&format!(
        r#"
[[project.titles]]
title_id = "CUSA00001"

[[project.titles]]
title_id = "CUSA00002"
content_id = "EP0000-CUSA00002_00-GAME000000000000"

[packaging]
output_dir = "{}"
stagger_secs = 0
"#,
        output_dir.display().to_string().replace('\\', "/")
    ))
    .unwrap()
}

#[test]
fn test_packages_every_title() {
    let stage = stage_tree(&["eboot.self", "content/data.bin"]);
    let out = tempfile::tempdir().unwrap();
    let config = two_title_config(out.path());
    let runner = MockRunner::new();
    let mut session = BuildSession::new();

    let jobs = package_titles(&config, stage.path(), &[], &publish(&runner), &mut session).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(runner.count("img_create"), 2);
    assert_eq!(session.publish_runs(), 2);
    assert_eq!(jobs[1].content_id, "EP0000-CUSA00002_00-GAME000000000000");
    for job in &jobs {
        assert!(job.gp4_path.exists());
        assert!(
            runner
                .calls_of("img_create")
                .iter()
                .any(|call| call[1] == job.gp4_path.display().to_string())
        );
    }
}

#[test]
fn test_failures_are_aggregated() {
    let stage = stage_tree(&["eboot.self"]);
    let out = tempfile::tempdir().unwrap();
    let config = two_title_config(out.path());
    let runner = MockRunner::new();
    runner.fail("img_create", 3);
    let mut session = BuildSession::new();

    let jobs = prepare_packages(&config, stage.path(), &[], &mut session).unwrap();
    let err = create_packages(&publish(&runner), &jobs, Duration::ZERO, &session).unwrap_err();

    match err {
        Error::PackagingFailed { failed, total } => {
            assert_eq!(failed, 2);
            assert_eq!(total, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Every task ran even though the first one failed
    assert_eq!(runner.count("img_create"), 2);
}

#[test]
fn test_packaging_starts_are_staggered() {
    let stage = stage_tree(&["eboot.self"]);
    let out = tempfile::tempdir().unwrap();
    let config = DeployConfig::parse(&format!(
        r#"
[project]
titles = [{{ title_id = "CUSA00001" }}, {{ title_id = "CUSA00002" }}, {{ title_id = "CUSA00003" }}]

[packaging]
output_dir = "{}"
"#,
        out.path().display().to_string().replace('\\', "/")
    ))
    .unwrap();
    let runner = MockRunner::new();
    let mut session = BuildSession::new();
    let jobs = prepare_packages(&config, stage.path(), &[], &mut session).unwrap();
    assert_eq!(jobs.len(), 3);

    let stagger = Duration::from_millis(80);
    let started = Instant::now();
    create_packages(&publish(&runner), &jobs, stagger, &session).unwrap();

    let mut starts: Vec<Duration> = runner
        .start_times("img_create")
        .into_iter()
        .map(|at| at.duration_since(started))
        .collect();
    starts.sort();
    assert_eq!(starts.len(), 3);
    // Task i may not start before i staggers have elapsed
    for (index, start) in starts.iter().enumerate() {
        assert!(
            *start >= stagger * index as u32,
            "run {} started after {:?}",
            index,
            start
        );
    }
}

#[test]
fn test_title_mismatch_stops_before_packaging() {
    let stage = stage_tree(&["eboot.self"]);
    let config = DeployConfig::parse(
        r#"
[[project.titles]]
title_id = "CUSA00001"
content_id = "UP0000-CUSA00009_00-GAME000000000000"
"#,
    )
    .unwrap();
    let runner = MockRunner::new();
    let mut session = BuildSession::new();

    let err = package_titles(&config, stage.path(), &[], &publish(&runner), &mut session)
        .unwrap_err();
    assert!(matches!(err, Error::TitleIdMismatch { .. }));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_requested_subset_only() {
    let stage = stage_tree(&["eboot.self"]);
    let out = tempfile::tempdir().unwrap();
    let config = two_title_config(out.path());
    let mut session = BuildSession::new();

    let jobs =
        prepare_packages(&config, stage.path(), &["CUSA00002".to_string()], &mut session).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].title_id, "CUSA00002");
}

#[test]
fn test_publish_tool_arguments() {
    let runner = MockRunner::new();
    let tool = publish(&runner);
    let out = tempfile::tempdir().unwrap();

    tool.sfo_create(
        std::path::Path::new("param.sfx"),
        &out.path().join("sce_sys/param.sfo"),
    )
    .unwrap();
    tool.img_extract(std::path::Path::new("game.pkg"), "secret", out.path())
        .unwrap();

    assert!(out.path().join("sce_sys").is_dir());
    let extract = &runner.calls_of("img_extract")[0];
    assert_eq!(extract[1], "--passcode=secret");
    assert_eq!(extract[2], "game.pkg");
}
