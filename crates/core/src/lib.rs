//! # OpsClaw Core
//!
//! Domain types, traits, and error definitions for the OpsClaw task agent.
//! This crate has **no framework dependencies**. It defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external seam is a trait here (model endpoint, retrieval endpoint,
//! task log, task runner). Implementations live in their own crates, which
//! keeps the agent loop testable with scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod retriever;
pub mod runner;
pub mod task;
pub mod task_log;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use retriever::{ContextRetriever, RetrievedContext};
pub use runner::TaskRunner;
pub use task::{
    CANCELLED_REASON, CancelFlag, ParseFailure, ParseFailureReason, ParseStrategy, ParseWarning,
    Step, StepOutcome, Task, TaskId, TaskStatus, TaskSummary,
};
pub use task_log::{STALE_REASON, TaskLog};
pub use tool::{FailureKind, ServiceAction, ToolCall, ToolName, ToolResult, ToolSpec, ToolStatus};
