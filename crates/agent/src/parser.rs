//! Tiered extraction of one tool call from free-form model text.
//!
//! Small local models rarely answer with clean JSON. The parser tries an
//! ordered list of strategies, each a pure function over the raw text, and
//! stops at the first that finds something shaped like a call:
//!
//! 1. **Strict**: the whole (trimmed) text is a JSON call object
//! 2. **Fenced**: the first ```` ``` ```` block holds a JSON call object
//! 3. **First call**: the first flat `{"tool": .., "args": {..}}` in the text
//! 4. **Lenient**: any flat object span with a `"tool"` key, after repairing
//!    trailing commas and unclosed braces
//!
//! Validation against the tool registry runs once, on the winner.

use opsclaw_core::task::{
    ParseFailure, ParseFailureReason, ParseStrategy, ParseWarning, StepOutcome,
};
use opsclaw_core::tool::ToolCall;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("fenced block pattern compiles")
});

/// Cannot match an `args` object with nested braces. Nested arguments fall
/// through to the lenient strategy.
static FIRST_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"tool"\s*:\s*"[^"]+"\s*,\s*"args"\s*:\s*\{[^}]*\}\s*\}"#)
        .expect("first call pattern compiles")
});

static LENIENT_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\{[^{]*?"tool"[^}]*?\}"#).expect("lenient span pattern compiles")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern compiles"));

/// Result of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Call {
        call: ToolCall,
        strategy: ParseStrategy,
        warnings: Vec<ParseWarning>,
    },
    Failure(ParseFailure),
}

impl ParseOutcome {
    pub fn into_step_outcome(self) -> StepOutcome {
        match self {
            ParseOutcome::Call {
                call,
                strategy,
                warnings,
            } => StepOutcome::Call {
                call,
                strategy,
                warnings,
            },
            ParseOutcome::Failure(failure) => StepOutcome::ParseFailure {
                reason: failure.reason,
                detail: failure.detail,
            },
        }
    }
}

/// What a single strategy made of the text.
#[derive(Debug, PartialEq)]
enum Attempt {
    /// A call-shaped object: tool name and raw arguments.
    Matched {
        tool: String,
        args: Map<String, Value>,
        warnings: Vec<ParseWarning>,
    },
    /// Valid JSON object, but not `{"tool": string, "args"?: object}`.
    NotCall,
    Nothing,
}

type Strategy = fn(&str) -> Attempt;

const STRATEGIES: [(ParseStrategy, Strategy); 4] = [
    (ParseStrategy::Strict, strict),
    (ParseStrategy::Fenced, fenced),
    (ParseStrategy::FirstCall, first_call),
    (ParseStrategy::Lenient, lenient),
];

/// Parse raw model output into a validated call or a typed failure.
///
/// Unknown argument keys are dropped unless `reject_unknown_args` is set.
pub fn parse(raw: &str, reject_unknown_args: bool) -> ParseOutcome {
    let mut saw_object = false;

    for (strategy, attempt) in STRATEGIES {
        match attempt(raw) {
            Attempt::Matched {
                tool,
                args,
                warnings,
            } => {
                debug!(strategy = ?strategy, tool = %tool, "Extracted tool call");
                return match ToolCall::from_parts(&tool, &args, reject_unknown_args) {
                    Ok(call) => ParseOutcome::Call {
                        call,
                        strategy,
                        warnings,
                    },
                    Err(failure) => ParseOutcome::Failure(failure.with_raw(raw)),
                };
            }
            Attempt::NotCall => saw_object = true,
            Attempt::Nothing => {}
        }
    }

    let failure = if saw_object {
        ParseFailure::new(
            ParseFailureReason::InvalidSchema,
            "JSON object found but it is not {\"tool\": <name>, \"args\": {...}}",
        )
    } else {
        ParseFailure::new(ParseFailureReason::NoJson, "no JSON object found")
    };
    ParseOutcome::Failure(failure.with_raw(raw))
}

/// Classify a parsed JSON value as a call, a non-call object, or neither.
fn classify(value: Value) -> Attempt {
    let Value::Object(mut obj) = value else {
        return Attempt::Nothing;
    };
    let Some(Value::String(tool)) = obj.remove("tool") else {
        return Attempt::NotCall;
    };
    let args = match obj.remove("args") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args,
        Some(_) => return Attempt::NotCall,
    };
    Attempt::Matched {
        tool,
        args,
        warnings: Vec::new(),
    }
}

fn from_json(text: &str) -> Attempt {
    serde_json::from_str::<Value>(text.trim()).map_or(Attempt::Nothing, classify)
}

fn strict(raw: &str) -> Attempt {
    from_json(raw)
}

fn fenced(raw: &str) -> Attempt {
    FENCED_BLOCK
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(Attempt::Nothing, |m| from_json(m.as_str()))
}

fn first_call(raw: &str) -> Attempt {
    let Some(m) = FIRST_CALL.find(raw) else {
        return Attempt::Nothing;
    };
    match from_json(m.as_str()) {
        Attempt::Matched {
            tool,
            args,
            mut warnings,
        } => {
            if raw.trim() != m.as_str() {
                warnings.push(ParseWarning::CollapsedToFirstCall);
            }
            Attempt::Matched {
                tool,
                args,
                warnings,
            }
        }
        // A regex hit that is not valid JSON; let the lenient pass try.
        _ => Attempt::Nothing,
    }
}

fn lenient(raw: &str) -> Attempt {
    LENIENT_SPAN
        .find(raw)
        .map_or(Attempt::Nothing, |m| from_json(&repair(m.as_str())))
}

/// Strip trailing commas and close any braces left open.
fn repair(span: &str) -> String {
    let mut fixed = TRAILING_COMMA.replace_all(span, "$1").into_owned();
    let open = fixed.matches('{').count();
    let close = fixed.matches('}').count();
    for _ in close..open {
        fixed.push('}');
    }
    fixed
}
