//! Shared test helpers for agent loop tests.

use async_trait::async_trait;
use opsclaw_core::error::{ProviderError, RetrievalError};
use opsclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use opsclaw_core::retriever::{ContextRetriever, RetrievedContext};
use opsclaw_core::task::CancelFlag;
use opsclaw_tools::{CommandOutput, CommandRunner, CommandSpec, FileSink};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Once the script runs out it keeps answering with a `done` call.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        Self::with_results(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"tool": "done", "args": {}}"#.to_string()));
        next.map(|content| ProviderResponse { content, model })
    }
}

/// Never answers.
pub struct SilentProvider;

#[async_trait]
impl Provider for SilentProvider {
    fn name(&self) -> &str {
        "silent"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// Returns fixed snippets, or a fixed error.
pub struct StaticRetriever {
    pub result: Result<RetrievedContext, RetrievalError>,
    pub queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn snippets(snippets: &[&str]) -> Self {
        Self {
            result: Ok(snippets.iter().map(|s| s.to_string()).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: RetrievalError) -> Self {
        Self {
            result: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrievalError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}

/// Never answers.
pub struct SilentRetriever;

#[async_trait]
impl ContextRetriever for SilentRetriever {
    fn name(&self) -> &str {
        "silent"
    }

    async fn retrieve(&self, _query: &str) -> Result<RetrievedContext, RetrievalError> {
        std::future::pending().await
    }
}

/// Raises the cancel flag while a command is running, as an operator
/// cancelling mid-step would.
pub struct CancellingRunner {
    pub flag: CancelFlag,
}

#[async_trait]
impl CommandRunner for CancellingRunner {
    async fn run(&self, _command: &CommandSpec) -> io::Result<CommandOutput> {
        self.flag.cancel();
        Ok(exited(0, " 10:00:00 up 3 days"))
    }
}

/// Answers each command with the next scripted output (exit 0 once the
/// script runs out) and records the command lines it saw.
#[derive(Default)]
pub struct RecordingRunner {
    outputs: Mutex<VecDeque<CommandOutput>>,
    pub seen: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.seen.lock().unwrap().push(command.display());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| exited(0, "")))
    }
}

pub fn exited(code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// A direct write that the OS always refuses.
pub struct DeniedSink;

#[async_trait]
impl FileSink for DeniedSink {
    async fn write(&self, _path: &Path, _content: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "Permission denied (os error 13)",
        ))
    }
}
