//! HTTP API gateway for OpsClaw.
//!
//! Exposes task submission, status, transcript, cancellation, the tool
//! table, and dependency health. Submissions go through the scheduler;
//! reads go straight to the task log.
//!
//! Built on Axum.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tracing::{info, warn};

use opsclaw_agent::AgentLoop;
use opsclaw_config::AppConfig;
use opsclaw_core::provider::Provider;
use opsclaw_core::retriever::ContextRetriever;
use opsclaw_core::task_log::TaskLog;
use opsclaw_providers::OpenAiCompatProvider;
use opsclaw_scheduler::Scheduler;
use opsclaw_tasklog::FileTaskLog;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub scheduler: Arc<Scheduler>,
    pub log: Arc<dyn TaskLog>,
    /// Held for health checks only; the agent loop owns its own handle.
    pub provider: Arc<dyn Provider>,
    pub retriever: Arc<dyn ContextRetriever>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with body limit and HTTP trace logging.
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    api::api_router(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Build every subsystem from config and serve until Ctrl-C.
///
/// Tasks left unfinished by a previous run are failed before the scheduler
/// accepts new work.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let log: Arc<dyn TaskLog> = Arc::new(FileTaskLog::open(&config.task_log.dir).await?);
    let stale = log.recover_stale().await?;
    if !stale.is_empty() {
        warn!(count = stale.len(), "Marked unfinished tasks as failed");
    }

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let retriever = opsclaw_providers::retriever_from_config(&config.retrieval)?;
    let dispatcher = Arc::new(opsclaw_tools::default_dispatcher(&config.tools));

    let agent = AgentLoop::from_config(
        &config,
        provider.clone(),
        retriever.clone(),
        dispatcher,
        log.clone(),
    );
    let scheduler = Arc::new(Scheduler::start(
        &config.scheduler,
        Arc::new(agent),
        log.clone(),
    ));

    let state = Arc::new(GatewayState {
        scheduler: scheduler.clone(),
        log,
        provider,
        retriever,
    });
    let app = build_router(state, config.gateway.max_body_bytes);

    info!(addr = %addr, model = %config.provider.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining task queue");
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
