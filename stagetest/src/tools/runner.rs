//! Subprocess execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, instrument};

use crate::errors::ToolError;

const REDACTED: &str = "<redacted>";

/// A command line to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables, added to the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Directory to run in.
    pub working_dir: Option<PathBuf>,
    /// Values masked whenever the command is rendered.
    #[serde(skip)]
    secrets: Vec<String>,
}

impl ShellCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets several environment variables.
    #[must_use]
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Marks a value that must never appear in logs or error messages.
    #[must_use]
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Returns the arguments with secrets masked.
    #[must_use]
    pub fn redacted_args(&self) -> Vec<String> {
        self.args.iter().map(|a| self.redact(a)).collect()
    }

    /// Renders the command line for logs, with secrets masked.
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.redacted_args().into_iter().map(|a| quote(&a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns true if any argument equals `arg`.
    #[must_use]
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("{arg:?}")
    } else {
        arg.to_string()
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// Returns true if the command exited with status 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands.
///
/// Implementations return [`ToolError::NonZeroExit`] for unsuccessful exits,
/// so callers only see `Ok` for status 0.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures its output.
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ToolError>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %command.render()))]
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ToolError> {
        let mut process = tokio::process::Command::new(&command.program);
        process
            .args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = command.working_dir {
            process.current_dir(dir);
        }

        info!("Running command");
        let output = process.output().await.map_err(|source| ToolError::Launch {
            command: command.render(),
            source,
        })?;

        let captured = CommandOutput {
            stdout: command.redact(&String::from_utf8_lossy(&output.stdout)),
            stderr: command.redact(&String::from_utf8_lossy(&output.stderr)),
            code: output.status.code(),
        };
        debug!(code = ?captured.code, stdout = %captured.stdout, "Command finished");

        if output.status.success() {
            Ok(captured)
        } else {
            Err(ToolError::NonZeroExit {
                command: command.render(),
                code: captured.code,
                stdout: captured.stdout,
                stderr: captured.stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_masks_secrets() {
        let cmd = ShellCommand::new("terraform")
            .args(["apply", "-var", "credentials={\"key\": 1}"])
            .secret("{\"key\": 1}");

        assert_eq!(cmd.render(), "terraform apply -var credentials=<redacted>");
        assert!(cmd.has_arg("apply"));
        assert_eq!(cmd.args[2], "credentials={\"key\": 1}");
    }

    #[test]
    fn test_render_quotes_whitespace() {
        let cmd = ShellCommand::new("echo").arg("two words").arg("");
        assert_eq!(cmd.render(), "echo \"two words\" \"\"");
    }

    #[test]
    fn test_empty_secret_is_ignored() {
        let cmd = ShellCommand::new("gcloud").arg("--quiet").secret("");
        assert_eq!(cmd.render(), "gcloud --quiet");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let cmd = ShellCommand::new("sh")
            .args(["-c", "printf \"$GREETING\""])
            .env("GREETING", "hello");
        let output = SystemRunner.run(&cmd).await.unwrap();
        assert_eq!(output.stdout, "hello");
        assert!(output.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_reports_non_zero_exit() {
        let cmd = ShellCommand::new("sh").args(["-c", "echo nope >&2; exit 3"]);
        let err = SystemRunner.run(&cmd).await.unwrap_err();
        match err {
            ToolError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_error() {
        let cmd = ShellCommand::new("definitely-not-a-real-binary-7f3a");
        let err = SystemRunner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, ToolError::Launch { .. }));
    }
}
