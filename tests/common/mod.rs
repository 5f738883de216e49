// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use orbis_deploy::device::{DeviceTools, DevkitOptions};
use orbis_deploy::tool::{CommandOutput, ToolRunner, command_line};
use orbis_deploy::{Error, Result, VendorTool};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

enum Response {
    Output(CommandOutput),
    Timeout,
}

/// Scripted vendor tool runner
///
/// Responses are keyed by the first argument (the vendor subcommand) and
/// consumed in order; the last response for a subcommand repeats. Commands
/// without a script succeed with empty output.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<Vec<String>>>,
    started: Mutex<Vec<(String, Instant)>>,
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
}

impl MockRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, command: &str, response: Response) {
        self.scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a successful response
    pub fn respond(&self, command: &str, stdout: &str) {
        self.push(
            command,
            Response::Output(CommandOutput {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        );
    }

    /// Queue a non-zero exit
    pub fn fail(&self, command: &str, code: i32) {
        self.push(
            command,
            Response::Output(CommandOutput {
                code,
                stdout: String::new(),
                stderr: format!("{} failed", command),
            }),
        );
    }

    /// Queue a timeout
    pub fn time_out(&self, command: &str) {
        self.push(command, Response::Timeout);
    }

    /// Every invocation as `[program, args...]`
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of a subcommand
    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.get(1).map(String::as_str) == Some(command))
            .count()
    }

    /// Start times of every invocation of a subcommand, in call order
    pub fn start_times(&self, command: &str) -> Vec<Instant> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Invocations of a subcommand (arguments only)
    pub fn calls_of(&self, command: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.get(1).map(String::as_str) == Some(command))
            .map(|call| call[1..].to_vec())
            .collect()
    }
}

impl ToolRunner for MockRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call);

        let key = args.first().cloned().unwrap_or_default();
        self.started
            .lock()
            .unwrap()
            .push((key.clone(), Instant::now()));
        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(&key) else {
            return Ok(CommandOutput::default());
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(|r| match r {
                Response::Output(output) => Response::Output(output.clone()),
                Response::Timeout => Response::Timeout,
            })
        };
        match response {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::Timeout) => Err(Error::ToolTimeout {
                command: command_line(program, args),
                seconds: timeout.as_secs(),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}

/// Target and control tools backed by the same mock
pub fn mock_tools(runner: &Arc<MockRunner>) -> DeviceTools {
    DeviceTools {
        target: VendorTool::new("orbis-ctrl", runner.clone()),
        control: VendorTool::new("orbis-tm", runner.clone()),
    }
}

/// Devkit options without any waiting
pub fn fast_options() -> DevkitOptions {
    DevkitOptions {
        command_timeout: Duration::from_secs(5),
        copy_timeout: Duration::from_secs(5),
        query_retries: 2,
        retry_delay: Duration::ZERO,
        add_settle_delay: Duration::ZERO,
        state_ttl: Duration::from_secs(60),
        launch_poll_count: 3,
        launch_poll_interval: Duration::ZERO,
    }
}

/// `detail` output for a device state
pub fn detail(power: &str, connection: &str) -> String {
    format!(
        "Name: kit-01\nHost: 10.0.0.5\nPower: {}\nConnection: {}\n",
        power, connection
    )
}

/// Create a stage directory containing `files`
///
/// Keep the TempDir alive to prevent cleanup.
pub fn stage_tree(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        let path = dir.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, file.as_bytes()).unwrap();
    }
    dir
}

/// Write a text file, creating parent directories
pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
