// tests/device.rs

//! Devkit state machine tests against a scripted target manager.

mod common;

use common::{MockRunner, detail, fast_options, mock_tools, stage_tree};
use orbis_deploy::device::{ConnectionState, Devkit, InstallRequest, PowerStatus};
use orbis_deploy::{BuildSession, Error};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DEVICE_LIST: &str = "Name      Host\nkit-01    10.0.0.5\n";

fn runner_with(power: &str, connection: &str) -> Arc<MockRunner> {
    let runner = MockRunner::new();
    runner.respond("list", DEVICE_LIST);
    runner.respond("detail", &detail(power, connection));
    runner
}

fn open(runner: &Arc<MockRunner>, name: &str) -> Devkit {
    let mut session = BuildSession::new();
    Devkit::open(name, mock_tools(runner), fast_options(), &mut session).unwrap()
}

#[test]
fn test_open_known_device_queries_state() {
    let runner = runner_with("On", "Connected");
    let mut devkit = open(&runner, "kit-01");

    assert!(devkit.is_queryable());
    assert!(devkit.is_on().unwrap());
    assert!(devkit.is_connected().unwrap());
    assert_eq!(runner.count("detail"), 1);
    assert_eq!(runner.count("add"), 0);
    assert_eq!(runner.calls_of("detail")[0], vec!["detail", "-target=kit-01"]);
}

#[test]
fn test_power_off_is_known_without_query() {
    let runner = runner_with("On", "Connected");
    let mut devkit = open(&runner, "kit-01");

    devkit.power_off().unwrap();
    assert!(!devkit.is_on().unwrap());
    assert_eq!(
        devkit.connection_state().unwrap(),
        ConnectionState::Unavailable
    );
    assert_eq!(runner.count("poweroff"), 1);
    assert_eq!(runner.count("detail"), 1);
}

#[test]
fn test_disconnect_forces_requery() {
    let runner = runner_with("On", "Connected");
    let mut devkit = open(&runner, "kit-01");

    devkit.disconnect().unwrap();
    assert!(devkit.cached_state().is_none());
    devkit.is_connected().unwrap();
    assert_eq!(runner.count("detail"), 2);
}

#[test]
fn test_power_on_and_reboot_invalidate() {
    let runner = runner_with("Standby", "Available");
    let mut devkit = open(&runner, "kit-01");
    let before = runner.count("detail");

    devkit.power_on().unwrap();
    devkit.power_status().unwrap();
    devkit.reboot().unwrap();
    devkit.power_status().unwrap();
    assert_eq!(runner.count("detail"), before + 2);
}

#[test]
fn test_connect_is_optimistic() {
    let runner = runner_with("On", "Available");
    let mut devkit = open(&runner, "kit-01");
    let before = runner.count("detail");

    devkit.connect().unwrap();
    assert!(devkit.is_connected().unwrap());
    assert_eq!(devkit.power_status().unwrap(), PowerStatus::On);
    assert_eq!(runner.count("detail"), before);
}

#[test]
fn test_stale_session_force_disconnected() {
    let runner = runner_with("On", "Available");
    let _devkit = open(&runner, "kit-01");
    assert_eq!(runner.count("force-disconnect"), 1);

    let runner = runner_with("On", "Connected");
    let _devkit = open(&runner, "kit-01");
    assert_eq!(runner.count("force-disconnect"), 0);
}

#[test]
fn test_unknown_power_is_retried() {
    let runner = MockRunner::new();
    runner.respond("list", DEVICE_LIST);
    runner.respond("detail", &detail("Rebooting", "Unavailable"));
    runner.respond("detail", &detail("Rebooting", "Unavailable"));
    runner.respond("detail", &detail("On", "Connected"));

    let mut devkit = open(&runner, "kit-01");
    assert_eq!(runner.count("detail"), 3);
    assert!(devkit.is_on().unwrap());
}

#[test]
fn test_retries_are_bounded() {
    let runner = runner_with("Rebooting", "Unavailable");
    let mut devkit = open(&runner, "kit-01");

    assert_eq!(runner.count("detail"), 3);
    assert_eq!(devkit.power_status().unwrap(), PowerStatus::Unknown);
}

#[test]
fn test_unreachable_device_still_opens() {
    let runner = MockRunner::new();
    runner.respond("list", DEVICE_LIST);
    runner.fail("detail", 1);

    let devkit = open(&runner, "kit-01");
    assert!(!devkit.is_queryable());
    assert_eq!(runner.count("force-disconnect"), 0);
}

#[test]
fn test_failed_query_is_not_cached() {
    let runner = MockRunner::new();
    runner.respond("list", DEVICE_LIST);
    runner.fail("detail", 1);

    let mut devkit = open(&runner, "kit-01");
    assert!(devkit.cached_state().is_none());
    let before = runner.count("detail");

    assert!(devkit.state().is_err());
    assert!(devkit.state().is_err());
    assert_eq!(runner.count("detail"), before + 2);

    assert!(devkit.ensure_connected().is_err());
    assert_eq!(runner.count("connect"), 0);
}

#[test]
fn test_ip_device_added_and_removed_on_drop() {
    let runner = runner_with("On", "Connected");
    {
        let _devkit = open(&runner, "10.0.0.9");
        assert_eq!(runner.calls_of("add"), vec![vec!["add", "-target=10.0.0.9"]]);
        assert_eq!(runner.count("remove"), 0);
    }
    assert_eq!(runner.calls_of("remove"), vec![vec!["remove", "-target=10.0.0.9"]]);
}

#[test]
fn test_known_ip_is_not_added() {
    let runner = runner_with("On", "Connected");
    {
        let _devkit = open(&runner, "10.0.0.5");
    }
    assert_eq!(runner.count("add"), 0);
    assert_eq!(runner.count("remove"), 0);
}

#[test]
fn test_unknown_name_is_not_added() {
    let runner = runner_with("On", "Connected");
    {
        let _devkit = open(&runner, "kit-99");
    }
    assert_eq!(runner.count("add"), 0);
    assert_eq!(runner.count("remove"), 0);
}

#[test]
fn test_device_list_cached_in_session() {
    let runner = runner_with("On", "Connected");
    let mut session = BuildSession::new();
    let _a = Devkit::open("kit-01", mock_tools(&runner), fast_options(), &mut session).unwrap();
    let _b = Devkit::open("kit-01", mock_tools(&runner), fast_options(), &mut session).unwrap();

    assert_eq!(runner.count("list"), 1);
    assert_eq!(session.default_devices().unwrap().len(), 1);
}

#[test]
fn test_expired_state_is_refreshed() {
    let runner = runner_with("On", "Connected");
    let mut options = fast_options();
    options.state_ttl = Duration::ZERO;
    let mut session = BuildSession::new();
    let mut devkit = Devkit::open("kit-01", mock_tools(&runner), options, &mut session).unwrap();
    let before = runner.count("detail");

    devkit.is_on().unwrap();
    devkit.is_on().unwrap();
    assert_eq!(runner.count("detail"), before + 2);
}

#[test]
fn test_run_finds_launched_title() {
    let runner = runner_with("On", "Connected");
    runner.respond("plist", "12 SceShellCore\n");
    runner.respond("plist", "12 SceShellCore\n0x4e eboot.bin\n");
    let mut devkit = open(&runner, "kit-01");

    let result = devkit.run("/data/title", "eboot.bin", "-benchmark").unwrap();
    assert_eq!(result.pid, 0x4e);
    assert_eq!(
        runner.calls_of("launch")[0],
        vec![
            "launch",
            "-target=kit-01",
            "-elf=/data/title/eboot.bin",
            "-workingdirectory=/data/title",
            "-args=-benchmark",
        ]
    );
    assert_eq!(runner.count("plist"), 2);
}

#[test]
fn test_run_reports_immediate_exit() {
    let runner = runner_with("On", "Connected");
    runner.respond("plist", "12 SceShellCore\n");
    let mut devkit = open(&runner, "kit-01");

    let err = devkit.run("/data/title", "eboot.bin", "").unwrap_err();
    assert!(matches!(err, Error::Device(_)));
    assert_eq!(runner.count("plist"), 3);
}

#[test]
fn test_deploy_copy_timeout_is_not_fatal() {
    let runner = runner_with("On", "Connected");
    runner.time_out("dcopy");
    let mut devkit = open(&runner, "kit-01");
    let stage = stage_tree(&["eboot.bin"]);

    let result = devkit
        .install(&InstallRequest {
            stage_dir: stage.path().to_path_buf(),
            sandbox: "title".to_string(),
            deploy: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(result.device_path, "/data/title");
    assert!(!result.copied);
}

#[test]
fn test_reference_install_overlays_newer_executable() {
    let runner = runner_with("On", "Connected");
    let mut devkit = open(&runner, "kit-01");
    let stage = stage_tree(&["eboot.bin"]);
    let build = stage_tree(&["mygame.self", "mygame.sym"]);

    let past = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(stage.path().join("eboot.bin"))
        .unwrap()
        .set_modified(past)
        .unwrap();

    let result = devkit
        .install(&InstallRequest {
            stage_dir: stage.path().to_path_buf(),
            sandbox: "title".to_string(),
            deploy: false,
            executable: Some(build.path().join("mygame.self")),
            symbols: vec![build.path().join("mygame.sym")],
            extra_files: Vec::new(),
        })
        .unwrap();

    assert!(result.device_path.starts_with("/host/"));
    assert_eq!(result.overlaid, vec!["eboot.bin", "eboot.bin.sym"]);
    assert_eq!(
        fs::read_to_string(stage.path().join("eboot.bin")).unwrap(),
        "mygame.self"
    );
    assert!(stage.path().join("eboot.bin.sym").exists());
    assert_eq!(runner.count("dcopy"), 0);
}

#[test]
fn test_older_executable_not_overlaid() {
    let runner = runner_with("On", "Connected");
    let mut devkit = open(&runner, "kit-01");
    let build = stage_tree(&["mygame.self"]);
    let past = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(build.path().join("mygame.self"))
        .unwrap()
        .set_modified(past)
        .unwrap();
    let stage = stage_tree(&["eboot.bin"]);

    let result = devkit
        .install(&InstallRequest {
            stage_dir: stage.path().to_path_buf(),
            sandbox: "title".to_string(),
            executable: Some(build.path().join("mygame.self")),
            ..Default::default()
        })
        .unwrap();
    assert!(result.overlaid.is_empty());
}

#[test]
fn test_screenshot_failure_is_soft() {
    let runner = runner_with("On", "Connected");
    runner.fail("screenshot", 2);
    let devkit = open(&runner, "kit-01");
    assert!(!devkit.screenshot(std::path::Path::new("shot.png")));
}

#[test]
fn test_kill_process_arguments() {
    let runner = runner_with("On", "Connected");
    let devkit = open(&runner, "kit-01");
    devkit.kill_process(78).unwrap();
    assert_eq!(
        runner.calls_of("pkill"),
        vec![vec!["pkill", "-target=kit-01", "-pid=78"]]
    );
}
