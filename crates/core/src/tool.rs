//! The closed tool set: call variants, argument schemas, and results.
//!
//! Tools are what give the agent the ability to act on the host: install
//! packages, manage services, read and write files, and run shell commands.
//! The set is fixed at compile time. A [`ToolCall`] can only be built through
//! [`ToolCall::from_parts`], which checks the name against [`REGISTRY`] and
//! the arguments against that tool's [`ToolSpec`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

use crate::error::ToolError;
use crate::task::{ParseFailure, ParseFailureReason};

/// Names of every registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    PackageInstall,
    ServiceControl,
    ReadFile,
    WriteFile,
    ShellExec,
    /// Reserved completion signal. Never executed.
    Done,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::PackageInstall,
        ToolName::ServiceControl,
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::ShellExec,
        ToolName::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::PackageInstall => "package_install",
            ToolName::ServiceControl => "service_control",
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::ShellExec => "shell_exec",
            ToolName::Done => "done",
        }
    }

    /// Look up a registered tool by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == name)
    }

    pub fn spec(&self) -> &'static ToolSpec {
        // REGISTRY is declared in variant order.
        &REGISTRY[*self as usize]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions accepted by `service_control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Status,
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Status => "status",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
        }
    }
}

/// A validated request to run one tool.
///
/// Serialized as `{"tool": "<name>", "args": {...}}`, the same shape the
/// model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    PackageInstall {
        name: String,
    },
    ServiceControl {
        action: ServiceAction,
        name: String,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    ShellExec {
        cmd: String,
    },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::PackageInstall { .. } => ToolName::PackageInstall,
            ToolCall::ServiceControl { .. } => ToolName::ServiceControl,
            ToolCall::ReadFile { .. } => ToolName::ReadFile,
            ToolCall::WriteFile { .. } => ToolName::WriteFile,
            ToolCall::ShellExec { .. } => ToolName::ShellExec,
            ToolCall::Done { .. } => ToolName::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, ToolCall::Done { .. })
    }

    /// Build a call from an untyped name and argument map.
    ///
    /// Unknown argument keys are dropped unless `reject_unknown` is set, in
    /// which case they fail with `invalid_args`.
    pub fn from_parts(
        tool: &str,
        args: &Map<String, Value>,
        reject_unknown: bool,
    ) -> Result<Self, ParseFailure> {
        let name = ToolName::parse(tool).ok_or_else(|| {
            ParseFailure::new(
                ParseFailureReason::UnregisteredTool,
                format!("unknown tool '{tool}'"),
            )
        })?;
        let spec = name.spec();

        let mut accepted = Map::new();
        for (key, value) in args {
            if spec.param(key).is_some() {
                accepted.insert(key.clone(), value.clone());
            } else if reject_unknown {
                return Err(ParseFailure::new(
                    ParseFailureReason::InvalidArgs,
                    format!("{tool}: unexpected argument '{key}'"),
                ));
            } else {
                debug!(tool = %tool, argument = %key, "Ignoring unknown tool argument");
            }
        }

        accepted.retain(|_, v| !v.is_null());

        for param in spec.params {
            match accepted.get(param.name) {
                None if param.required => {
                    return Err(ParseFailure::new(
                        ParseFailureReason::InvalidArgs,
                        format!("{tool}: missing required argument '{}'", param.name),
                    ));
                }
                None => {}
                Some(Value::String(s)) => {
                    if !param.allowed.is_empty() && !param.allowed.contains(&s.as_str()) {
                        return Err(ParseFailure::new(
                            ParseFailureReason::InvalidArgs,
                            format!(
                                "{tool}: '{}' must be one of {}, got '{s}'",
                                param.name,
                                param.allowed.join("|")
                            ),
                        ));
                    }
                }
                Some(other) => {
                    return Err(ParseFailure::new(
                        ParseFailureReason::InvalidArgs,
                        format!("{tool}: '{}' must be a string, got {other}", param.name),
                    ));
                }
            }
        }

        let value = serde_json::json!({ "tool": tool, "args": accepted });
        serde_json::from_value(value).map_err(|e| {
            ParseFailure::new(ParseFailureReason::InvalidArgs, format!("{tool}: {e}"))
        })
    }
}

/// One declared argument of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    /// Permitted values. Empty means any string.
    #[serde(skip_serializing_if = "unconstrained")]
    pub allowed: &'static [&'static str],
}

fn unconstrained(allowed: &&'static [&'static str]) -> bool {
    allowed.is_empty()
}

/// Declared schema of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Call-style signature, e.g. `service_control(action, name)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// The fixed tool table. Part of the system-instruction contract.
pub static REGISTRY: &[ToolSpec] = &[
    ToolSpec {
        name: ToolName::PackageInstall,
        description: "Install a package with the system package manager",
        params: &[ParamSpec {
            name: "name",
            description: "Package name",
            required: true,
            allowed: &[],
        }],
    },
    ToolSpec {
        name: ToolName::ServiceControl,
        description: "Manage a system service",
        params: &[
            ParamSpec {
                name: "action",
                description: "What to do with the service",
                required: true,
                allowed: &["status", "start", "stop", "restart", "enable", "disable"],
            },
            ParamSpec {
                name: "name",
                description: "Service unit name",
                required: true,
                allowed: &[],
            },
        ],
    },
    ToolSpec {
        name: ToolName::ReadFile,
        description: "Read the content of a file",
        params: &[ParamSpec {
            name: "path",
            description: "Absolute file path",
            required: true,
            allowed: &[],
        }],
    },
    ToolSpec {
        name: ToolName::WriteFile,
        description: "Write content to a file, escalating privileges only if the plain write is denied",
        params: &[
            ParamSpec {
                name: "path",
                description: "Absolute file path",
                required: true,
                allowed: &[],
            },
            ParamSpec {
                name: "content",
                description: "Full new file content",
                required: true,
                allowed: &[],
            },
        ],
    },
    ToolSpec {
        name: ToolName::ShellExec,
        description: "Run a shell command exactly as given; prefix it with sudo yourself if it needs root",
        params: &[ParamSpec {
            name: "cmd",
            description: "Command line passed to sh -c",
            required: true,
            allowed: &[],
        }],
    },
    ToolSpec {
        name: ToolName::Done,
        description: "Report that the task is finished",
        params: &[ParamSpec {
            name: "summary",
            description: "Short outcome summary",
            required: false,
            allowed: &[],
        }],
    },
];

/// Whether a tool invocation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Why a step produced an `error` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidCall,
    UnknownTool,
    InvalidArgs,
    Execution,
    Timeout,
    EscalationExhausted,
}

/// The outcome of one step's tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,

    /// Human-readable output fed back to the model
    pub output: String,

    /// Optional structured data (e.g. `returncode`/`stdout`/`stderr`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// True only when an elevated execution path was used
    #[serde(default)]
    pub used_privilege_escalation: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Ok,
            output: output.into(),
            data: None,
            used_privilege_escalation: false,
            exit_code: None,
            failure: None,
        }
    }

    pub fn error(kind: FailureKind, output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            output: output.into(),
            data: None,
            used_privilege_escalation: false,
            exit_code: None,
            failure: Some(kind),
        }
    }

    /// The result recorded for a step whose model output could not be parsed.
    pub fn from_parse_failure(failure: &ParseFailure) -> Self {
        let kind = match failure.reason {
            ParseFailureReason::UnregisteredTool => FailureKind::UnknownTool,
            ParseFailureReason::InvalidArgs => FailureKind::InvalidArgs,
            ParseFailureReason::NoJson | ParseFailureReason::InvalidSchema => {
                FailureKind::InvalidCall
            }
        };
        Self::error(kind, format!("{}: {}", failure.reason, failure.detail))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn escalated(mut self, used: bool) -> Self {
        self.used_privilege_escalation = used;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        let output = err.to_string();
        match err {
            ToolError::InvalidArguments(_) => ToolResult::error(FailureKind::InvalidArgs, output),
            ToolError::ExecutionFailed { .. } => ToolResult::error(FailureKind::Execution, output),
            ToolError::Timeout { .. } => ToolResult::error(FailureKind::Timeout, output),
            ToolError::EscalationExhausted {
                unprivileged,
                escalated,
                ..
            } => ToolResult::error(FailureKind::EscalationExhausted, output)
                .with_data(serde_json::json!({
                    "unprivileged_error": unprivileged,
                    "escalated_error": escalated,
                }))
                .escalated(true),
        }
    }
}
