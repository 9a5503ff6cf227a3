//! Scripted stand-ins for the process and file seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::sink::FileSink;

/// Answers each command with the next scripted output (exit 0 once the
/// script runs out) and records what it was asked to run.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Mutex<VecDeque<CommandOutput>>,
    pub seen: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|c| c.display()).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.seen.lock().unwrap().push(command.clone());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| exited(0, "", "")))
    }
}

/// Never finishes.
pub struct HangingRunner;

#[async_trait]
impl CommandRunner for HangingRunner {
    async fn run(&self, _command: &CommandSpec) -> io::Result<CommandOutput> {
        std::future::pending().await
    }
}

/// Panics on every call.
pub struct PanickingRunner;

#[async_trait]
impl CommandRunner for PanickingRunner {
    async fn run(&self, _command: &CommandSpec) -> io::Result<CommandOutput> {
        panic!("runner exploded");
    }
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

/// Records writes; fails every one with `fail_with` if set.
#[derive(Default)]
pub struct RecordingSink {
    fail_with: Option<(io::ErrorKind, &'static str)>,
    pub writes: Mutex<Vec<(PathBuf, String)>>,
}

impl RecordingSink {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(kind: io::ErrorKind, message: &'static str) -> Self {
        Self {
            fail_with: Some((kind, message)),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn denied() -> Self {
        Self::failing(io::ErrorKind::PermissionDenied, "Permission denied (os error 13)")
    }

    pub fn attempts(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl FileSink for RecordingSink {
    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));
        match self.fail_with {
            Some((kind, message)) => Err(io::Error::new(kind, message)),
            None => Ok(()),
        }
    }
}
