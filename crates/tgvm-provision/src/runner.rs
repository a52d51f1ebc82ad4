use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tgvm_core::error::StepError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Shell-style rendering for logs and dry-run previews.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| shell_escape(a)));
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Seam between handlers and the host's processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until `timeout`; a non-zero exit is not an error here.
    async fn output(&self, cmd: &CommandSpec, timeout: Duration) -> Result<CommandOutput, StepError>;
}

/// Runs commands on the local machine.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, cmd: &CommandSpec, timeout: Duration) -> Result<CommandOutput, StepError> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| StepError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| StepError::io(&cmd.program, e))?;
            // Dropping closes the pipe so the child sees EOF.
            drop(stdin);
        }

        // On expiry the child is dropped and killed.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| StepError::Timeout {
                program: cmd.program.clone(),
                timeout,
            })?
            .map_err(|e| StepError::io(&cmd.program, e))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run and require a zero exit status; returns stdout.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    cmd: &CommandSpec,
    timeout: Duration,
) -> Result<String, StepError> {
    let out = runner.output(cmd, timeout).await?;
    if !out.success() {
        return Err(StepError::Command {
            program: cmd.program.clone(),
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out.stdout)
}

/// Shell-escape a string for display.
pub fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
