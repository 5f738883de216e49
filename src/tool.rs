// src/tool.rs

//! Vendor command-line tool invocation
//!
//! Every vendor command runs with a caller supplied timeout. A command that
//! outlives it is killed (the vendor tools have no cooperative cancel) and
//! reported as [`Error::ToolTimeout`]; a non-zero exit becomes
//! [`Error::ToolFailed`] carrying the full command line.
//!
//! [`ToolRunner`] is the seam between the library and real processes.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Executes a program and waits for it up to `timeout`
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`
    ///
    /// Returns the output for any exit code; returns
    /// [`Error::ToolTimeout`] after killing a process that did not finish.
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let command = command_line(program, args);
        debug!("Running: {}", command);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound(program.to_string()),
                _ => Error::Io(e),
            })?;

        // Drain pipes on their own threads so chatty tools cannot block on a
        // full pipe while we wait.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ToolTimeout {
                    command,
                    seconds: timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            code: status.code().unwrap_or(-1),
            stdout: stdout.map(join_reader).unwrap_or_default(),
            stderr: stderr.map(join_reader).unwrap_or_default(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Locate a tool: explicit paths are used as-is, bare names go through PATH
pub fn resolve_tool(name: &str) -> Result<PathBuf> {
    let path = PathBuf::from(name);
    if path.components().count() > 1 {
        return if path.exists() {
            Ok(path)
        } else {
            Err(Error::ToolNotFound(name.to_string()))
        };
    }
    which::which(name).map_err(|_| Error::ToolNotFound(name.to_string()))
}

/// A vendor program bound to a runner
#[derive(Clone)]
pub struct VendorTool {
    program: String,
    runner: Arc<dyn ToolRunner>,
}

impl std::fmt::Debug for VendorTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorTool")
            .field("program", &self.program)
            .finish()
    }
}

impl VendorTool {
    pub fn new(program: impl Into<String>, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Bind to a real process runner, resolving the program through PATH
    ///
    /// Falls back to the bare name when the tool cannot be found yet, so the
    /// failure surfaces when (and if) the tool is actually invoked.
    pub fn system(name: &str) -> Self {
        let program = match resolve_tool(name) {
            Ok(path) => path.display().to_string(),
            Err(_) => {
                warn!("Tool {} not found on PATH", name);
                name.to_string()
            }
        };
        Self::new(program, Arc::new(ProcessRunner))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run and return the raw output regardless of exit code
    pub fn try_invoke(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let output = self.runner.run(&self.program, args, timeout)?;
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!("[{}] {}", self.program, line);
        }
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("[{}] {}", self.program, line);
        }
        Ok(output)
    }

    /// Run and require a zero exit code
    pub fn invoke(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let output = self.try_invoke(args, timeout)?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::ToolFailed {
                command: command_line(&self.program, args),
                code: output.code,
            })
        }
    }
}

/// Build an argument vector from string slices
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
