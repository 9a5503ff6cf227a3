//! Prompt assembly.
//!
//! The prompt is rebuilt from scratch on every iteration: system
//! instructions, the task with its retrieved context, then one
//! assistant/user pair per step already taken. History is a projection of
//! the task's steps and is never stored separately.

use opsclaw_core::message::Message;
use opsclaw_core::task::{Step, Task};
use opsclaw_core::tool::{REGISTRY, ToolResult};

/// Appended to every tool result fed back to the model.
pub const CONTINUE_HINT: &str = "Continue or report completion.";

/// System instructions: tool table, output rules, and the completion convention.
pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "You are an autonomous Linux ops agent. You have these tools:\n\n",
    );

    for spec in REGISTRY {
        prompt.push_str(&format!("- {}: {}", spec.signature(), spec.description));
        for param in spec.params.iter().filter(|p| !p.allowed.is_empty()) {
            prompt.push_str(&format!(" ({}: {})", param.name, param.allowed.join("/")));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nCRITICAL RULES:\n\
         1. Your response MUST be ONLY ONE SINGLE JSON object\n\
         2. Output ONLY the NEXT tool call, not multiple tool calls\n\
         3. No explanations, no markdown, no extra text\n\
         4. When the task is finished, call the done tool with a short summary\n\
         \n\
         Format: {\"tool\": \"<name>\", \"args\": {...}}\n\
         \n\
         Example valid response:\n\
         {\"tool\": \"service_control\", \"args\": {\"action\": \"status\", \"name\": \"nginx\"}}\n\
         \n\
         Completion example:\n\
         {\"tool\": \"done\", \"args\": {\"summary\": \"nginx is running\"}}\n\
         \n\
         Think step by step internally, but output ONLY ONE JSON object for the next step.",
    );
    prompt
}

/// The opening user message: retrieved context followed by the task.
pub fn task_message(description: &str, context: &[String]) -> Message {
    Message::user(format!(
        "Context:\n{}\n\nTask: {description}",
        context.join("\n")
    ))
}

/// Feed a tool result back to the model.
pub fn result_message(result: &ToolResult) -> Message {
    let json = serde_json::to_string(result).unwrap_or_else(|_| result.output.clone());
    Message::user(format!("Result: {json}\n\n{CONTINUE_HINT}"))
}

fn step_messages(step: &Step) -> [Message; 2] {
    [
        Message::assistant(step.raw_output.clone()),
        result_message(&step.result),
    ]
}

/// Full message list for the next model call.
pub fn build_messages(task: &Task, context: &[String]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2 + task.steps.len() * 2);
    messages.push(Message::system(system_prompt()));
    messages.push(task_message(&task.description, context));
    messages.extend(task.steps.iter().flat_map(step_messages));
    messages
}
