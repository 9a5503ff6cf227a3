//! The agent task loop for OpsClaw.
//!
//! The loop follows a **Ask → Parse → Act → Record** cycle:
//!
//! 1. **Retrieve** background snippets for the task description
//! 2. **Ask** the model for exactly one tool call, with the transcript so far
//! 3. **Parse** the reply with the tiered [`parser`]
//! 4. **Act** through the tool dispatcher (or stop on `done`)
//! 5. **Record** the step in the task log, then decide whether to go on
//!
//! The loop ends on `done`, when the step budget is spent, after too many
//! unusable replies in a row, on cancellation, or when the model or
//! retrieval endpoint times out.

pub mod loop_runner;
pub mod parser;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::AgentLoop;
pub use parser::{ParseOutcome, parse};
