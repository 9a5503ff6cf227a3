//! End-to-end integration tests for the OpsClaw task agent.
//!
//! These tests drive the full pipeline, from task submission through the
//! agent loop and tool dispatch to the on-disk task log, with a scripted
//! model and recorded host commands.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use opsclaw_agent::AgentLoop;
use opsclaw_config::{SchedulerConfig, ToolsConfig};
use opsclaw_core::error::{ProviderError, RetrievalError};
use opsclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use opsclaw_core::retriever::{ContextRetriever, RetrievedContext};
use opsclaw_core::task::{CancelFlag, Task, TaskStatus};
use opsclaw_core::task_log::{STALE_REASON, TaskLog};
use opsclaw_gateway::{GatewayState, build_router};
use opsclaw_providers::NoopRetriever;
use opsclaw_scheduler::Scheduler;
use opsclaw_tasklog::FileTaskLog;
use opsclaw_tools::{CommandOutput, CommandRunner, CommandSpec, Dispatcher, ElevatedSink, FileSink};
use tower::ServiceExt;

// ── Mocks ────────────────────────────────────────────────────────────────

/// A model that answers from a script, then repeats its last line.
struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(r#"{"tool": "done", "args": {}}"#.to_string()),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(ProviderResponse {
            content: last.clone(),
            model: request.model,
        })
    }
}

struct DownRetriever;

#[async_trait]
impl ContextRetriever for DownRetriever {
    fn name(&self) -> &str {
        "down"
    }

    async fn retrieve(&self, _query: &str) -> Result<RetrievedContext, RetrievalError> {
        Err(RetrievalError::Unavailable("connection refused".into()))
    }
}

/// Records every command line and reports success.
#[derive(Default)]
struct RecordingRunner {
    seen: Mutex<Vec<String>>,
}

impl RecordingRunner {
    fn commands(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.seen.lock().unwrap().push(command.display());
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "active (running)".into(),
            stderr: String::new(),
        })
    }
}

struct DeniedSink;

#[async_trait]
impl FileSink for DeniedSink {
    async fn write(&self, _path: &Path, _content: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    log: Arc<FileTaskLog>,
    runner: Arc<RecordingRunner>,
    agent: AgentLoop,
}

async fn harness(script: &[&str], retriever: Arc<dyn ContextRetriever>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FileTaskLog::open(dir.path()).await.unwrap());
    let runner = Arc::new(RecordingRunner::default());
    let config = ToolsConfig::default();
    let elevated = Arc::new(ElevatedSink::new(
        runner.clone(),
        config.elevation_command.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        runner.clone(),
        Arc::new(DeniedSink),
        elevated,
    ));
    let agent = AgentLoop::new(
        Arc::new(ScriptedProvider::new(script)),
        retriever,
        dispatcher,
        log.clone(),
        "local",
    );
    Harness {
        _dir: dir,
        log,
        runner,
        agent,
    }
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            req = req.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(req.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or_default())
}

// ── E2E: HTTP → scheduler → agent → task log ─────────────────────────────

#[tokio::test]
async fn e2e_check_nginx_status_over_http() {
    let h = harness(
        &[
            r#"{"tool": "service_control", "args": {"action": "status", "name": "nginx"}}"#,
            r#"{"tool": "done", "args": {"summary": "nginx is running"}}"#,
        ],
        Arc::new(NoopRetriever),
    )
    .await;

    let log: Arc<dyn TaskLog> = h.log.clone();
    let scheduler = Arc::new(Scheduler::start(
        &SchedulerConfig::default(),
        Arc::new(h.agent),
        log.clone(),
    ));
    let state = Arc::new(GatewayState {
        scheduler: scheduler.clone(),
        log,
        provider: Arc::new(ScriptedProvider::new(&[])),
        retriever: Arc::new(NoopRetriever),
    });
    let app = build_router(state, 64 * 1024);

    let (status, body) = send(
        app.clone(),
        "POST",
        "/tasks",
        Some(serde_json::json!({"task": "check nginx status"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["task_id"].as_str().unwrap().to_string();

    // Shutdown drains the queue before returning.
    scheduler.shutdown().await;

    let (status, body) = send(app.clone(), "GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["step_count"], 2);

    let (_, steps) = send(app, "GET", &format!("/tasks/{id}/steps"), None).await;
    let steps = steps.as_array().unwrap();
    assert_eq!(steps[0]["outcome"]["call"]["tool"], "service_control");
    assert_eq!(steps[0]["result"]["status"], "ok");
    assert_eq!(steps[0]["result"]["used_privilege_escalation"], false);
    assert_eq!(
        h.runner.commands(),
        vec!["sudo -n systemctl status nginx".to_string()]
    );
}

// ── E2E: privilege escalation through the real dispatcher ────────────────

#[tokio::test]
async fn e2e_protected_write_escalates_once() {
    let h = harness(
        &[
            r#"{"tool": "write_file", "args": {"path": "/etc/app.conf", "content": "port=80\n"}}"#,
            r#"{"tool": "done", "args": {"summary": "written"}}"#,
        ],
        Arc::new(DownRetriever),
    )
    .await;

    let task = Task::new("write config to /etc/app.conf");
    h.log.create(&task).await.unwrap();
    let task = h.agent.run(task, &CancelFlag::new()).await;

    assert_eq!(task.status, TaskStatus::Completed);
    let escalated: Vec<bool> = task
        .steps
        .iter()
        .map(|s| s.result.used_privilege_escalation)
        .collect();
    assert_eq!(escalated, vec![true, false]);
    let tees = h
        .runner
        .commands()
        .into_iter()
        .filter(|c| c.contains(" tee "))
        .count();
    assert_eq!(tees, 1);
}

// ── E2E: step limit persisted and reloaded from disk ─────────────────────

#[tokio::test]
async fn e2e_step_limit_survives_reload() {
    let h = harness(
        &[r#"{"tool": "shell_exec", "args": {"cmd": "uptime"}}"#],
        Arc::new(NoopRetriever),
    )
    .await;

    let task = Task::new("keep checking uptime").with_max_steps(3);
    h.log.create(&task).await.unwrap();
    let id = task.id.clone();
    h.agent.run(task, &CancelFlag::new()).await;

    let reopened = FileTaskLog::open(h.log.dir()).await.unwrap();
    let task = reopened.read(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::StepLimitExceeded);
    assert_eq!(task.steps.len(), 3);
    let indices: Vec<u32> = task.steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
}

// ── E2E: restart recovery ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_restart_fails_unfinished_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileTaskLog::open(dir.path()).await.unwrap();

    let running = Task::new("interrupted");
    log.create(&running).await.unwrap();
    log.set_status(&running.id, TaskStatus::Running, None).await.unwrap();
    let queued = Task::new("never started");
    log.create(&queued).await.unwrap();

    let restarted = FileTaskLog::open(dir.path()).await.unwrap();
    let mut stale = restarted.recover_stale().await.unwrap();
    stale.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(stale.len(), 2);

    for id in [&running.id, &queued.id] {
        let task = restarted.read(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure_reason.as_deref(), Some(STALE_REASON));
    }
}
