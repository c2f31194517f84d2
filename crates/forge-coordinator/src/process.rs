//! External tool execution with captured, streamed output
//!
//! Every process-backed collaborator (creation tool, cluster API CLI,
//! workload CLI, provisioning engine) runs through [`run_command`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for command execution
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Command timeout (kills process if exceeded)
    pub timeout: Duration,
    /// Time to wait for output readers to drain after the process exits
    pub stream_flush_timeout: Duration,
}

impl CommandConfig {
    /// Long-running mutating commands (cluster create/delete, engine apply/destroy)
    pub fn for_mutation() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            stream_flush_timeout: Duration::from_secs(5),
        }
    }

    /// Short read-only queries (cluster lookup, job status)
    pub fn for_query() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            stream_flush_timeout: Duration::from_secs(2),
        }
    }
}

/// Placeholder logged in place of a secret argument's value
const REDACTED: &str = "***";

/// One command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    /// Indices into `args` that must never be logged
    secret_args: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            secret_args: Vec::new(),
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

    /// Append an argument carrying a credential; logs show `--flag=***`
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Arguments as they may appear in logs
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if !self.secret_args.contains(&i) {
                    return arg.clone();
                }
                match arg.split_once('=') {
                    Some((flag, _)) => format!("{flag}={REDACTED}"),
                    None => REDACTED.to_string(),
                }
            })
            .collect()
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ToolOutput {
    /// Turn a non-zero exit into an error carrying stderr
    pub fn into_success(self, what: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            anyhow::bail!("{what} failed: {}", self.stderr.trim())
        }
    }
}

/// Run a command, streaming each output line to the log and capturing both streams
///
/// # Returns
/// * `Ok(ToolOutput)` once the process exits (successfully or not)
/// * `Err` on timeout (the process is killed) or spawn failure
pub async fn run_command(spec: &CommandSpec, config: &CommandConfig) -> Result<ToolOutput> {
    let cmd = spec.program_name();
    info!(
        cmd = %cmd,
        args = ?spec.display_args(),
        timeout_secs = config.timeout.as_secs(),
        "Running command"
    );

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", cmd))?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let stdout_handle = collect_lines(stdout, cmd.clone(), "stdout");
    let stderr_handle = collect_lines(stderr, cmd.clone(), "stderr");

    let success = match tokio::time::timeout(config.timeout, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => return Err(e).context("Failed waiting for command"),
        Err(_) => {
            warn!(
                cmd = %cmd,
                timeout_secs = config.timeout.as_secs(),
                "Command timed out, killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out process");
            }
            anyhow::bail!(
                "Command '{}' timed out after {}s",
                cmd,
                config.timeout.as_secs()
            );
        }
    };

    let stdout = drain(stdout_handle, config.stream_flush_timeout).await;
    let stderr = drain(stderr_handle, config.stream_flush_timeout).await;

    debug!(cmd = %cmd, success, "Command finished");
    Ok(ToolOutput {
        stdout,
        stderr,
        success,
    })
}

fn collect_lines<R>(reader: R, cmd: String, stream: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut collected = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(cmd = %cmd, stream, "{}", line);
            collected.push(line);
        }
        collected
    })
}

async fn drain(handle: JoinHandle<Vec<String>>, flush_timeout: Duration) -> String {
    match tokio::time::timeout(flush_timeout, handle).await {
        Ok(Ok(lines)) => lines.join("\n"),
        _ => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let spec = CommandSpec::new("sh").args(["-c", "echo one; echo two; echo err >&2"]);
        let output = run_command(&spec, &CommandConfig::for_query()).await.unwrap();

        assert!(output.success);
        assert_eq!(output.stdout, "one\ntwo");
        assert_eq!(output.stderr, "err");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let output = run_command(&spec, &CommandConfig::for_query()).await.unwrap();

        assert!(!output.success);
        let err = output.into_success("sh").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $FORGE_TEST_VALUE; pwd"])
            .env("FORGE_TEST_VALUE", "hello")
            .current_dir(dir.path());
        let output = run_command(&spec, &CommandConfig::for_query()).await.unwrap();

        let lines: Vec<&str> = output.stdout.lines().collect();
        assert_eq!(lines[0], "hello");
        assert!(lines[1].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = CommandSpec::new("sh").args(["-c", "sleep 30"]);
        let config = CommandConfig {
            timeout: Duration::from_millis(200),
            stream_flush_timeout: Duration::from_millis(100),
        };
        let err = run_command(&spec, &config).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_secret_args_reach_process_but_not_logs() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$1 $2\"", "sh"])
            .secret_arg("--token=hunter2")
            .secret_arg("bare-secret")
            .arg("--env=staging");

        assert_eq!(
            spec.display_args(),
            vec!["-c", "echo \"$1 $2\"", "sh", "--token=***", "***", "--env=staging"]
        );
        assert!(!format!("{:?}", spec.display_args()).contains("hunter2"));

        let output = run_command(&spec, &CommandConfig::for_query()).await.unwrap();
        assert_eq!(output.stdout, "--token=hunter2 bare-secret");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = CommandSpec::new("/nonexistent/forge-tool");
        assert!(run_command(&spec, &CommandConfig::for_query()).await.is_err());
    }
}
