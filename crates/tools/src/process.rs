//! Process execution seam.
//!
//! Every tool that launches a program goes through [`CommandRunner`], so
//! tests can script exit codes, permission failures and hangs without
//! touching the host.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A program invocation as discrete argv entries. Never passed through a
/// shell unless the program itself is `sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Prepend the elevation prefix (e.g. `sudo -n`). An empty prefix
    /// leaves the command unchanged.
    pub fn elevated(self, prefix: &[String]) -> Self {
        let Some((head, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args: Vec<String> = rest.to_vec();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: head.clone(),
            args,
            stdin: self.stdin,
        }
    }

    /// The full command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// `{returncode, stdout, stderr}` with each stream cut to its last
    /// `tail_chars` characters. A signal death reports `returncode: -1`.
    pub fn to_data(&self, tail_chars: usize) -> serde_json::Value {
        serde_json::json!({
            "returncode": self.exit_code.unwrap_or(-1),
            "stdout": tail(&self.stdout, tail_chars),
            "stderr": tail(&self.stderr, tail_chars),
        })
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. An `Err` means the process could not be started
    /// or waited on; a non-zero exit is an `Ok` output.
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs real processes with `tokio::process`.
///
/// Children are killed when the future is dropped, so an outer timeout
/// really stops the command.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
        debug!(command = %command.display(), "Spawning process");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin while draining stdout, or a chatty child like `tee` can
        // fill its pipe and stall. Dropping the handle closes the pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            match (stdin, command.stdin.as_deref()) {
                (Some(mut pipe), Some(input)) => pipe.write_all(input.as_bytes()).await,
                _ => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if let Err(e) = fed
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e);
        }
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Keep only the last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        text.to_string()
    } else {
        text.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevation_prefix_is_prepended() {
        let prefix = vec!["sudo".to_string(), "-n".to_string()];
        let cmd = CommandSpec::new("systemctl")
            .args(["status", "nginx"])
            .elevated(&prefix);
        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.args, vec!["-n", "systemctl", "status", "nginx"]);
        assert_eq!(cmd.display(), "sudo -n systemctl status nginx");
    }

    #[test]
    fn empty_prefix_leaves_command_alone() {
        let cmd = CommandSpec::new("tee").arg("/tmp/x").elevated(&[]);
        assert_eq!(cmd.program, "tee");
        assert_eq!(cmd.args, vec!["/tmp/x"]);
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("héllo", 4), "éllo");
    }

    #[test]
    fn data_tails_each_stream() {
        let out = CommandOutput {
            exit_code: None,
            stdout: "0123456789".into(),
            stderr: "err".into(),
        };
        let data = out.to_data(4);
        assert_eq!(data["returncode"], -1);
        assert_eq!(data["stdout"], "6789");
        assert_eq!(data["stderr"], "err");
    }

    #[tokio::test]
    async fn system_runner_captures_output() {
        let out = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn system_runner_pipes_stdin() {
        let out = SystemRunner
            .run(&CommandSpec::new("cat").stdin("piped text"))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "piped text");
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let result = SystemRunner
            .run(&CommandSpec::new("/nonexistent/opsclaw-test-binary"))
            .await;
        assert!(result.is_err());
    }
}
