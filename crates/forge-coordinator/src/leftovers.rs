//! Follow-up cleanup of resources the deletion tool reports but does not remove
//!
//! The deletion tool prints a block of manual follow-up commands after a
//! marker line. That block is parsed into [`ToolCommand`]s and each one is
//! run independently. Failures are collected, never escalated.

use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::remote::{AuthContext, ClusterTool, ToolCommand};

/// Line that opens the leftover-commands block
pub const LEFTOVER_MARKER: &str =
    "INFO: Once the cluster is uninstalled use the following commands to remove the above aws resources";

/// Any informational line; the first one after the marker closes the block
const INFO_MARKER: &str = "INFO:";

/// Prefix of candidate lines (the tool's own invocation)
const TOOL_PREFIX: &str = "rosa ";

/// Extract the follow-up commands from deletion output, in order.
///
/// Output without the marker yields no commands. A block without a closing
/// informational line runs to the end of the output.
pub fn parse_leftover_commands(output: &str) -> Vec<ToolCommand> {
    let Some(start) = output.find(LEFTOVER_MARKER) else {
        debug!("No leftover-resources block in deletion output");
        return Vec::new();
    };

    let after_marker = &output[start + LEFTOVER_MARKER.len()..];
    // Skip the rest of the marker line (trailing punctuation)
    let block = after_marker.split_once('\n').map_or("", |(_, rest)| rest);
    let block = block.find(INFO_MARKER).map_or(block, |end| &block[..end]);

    block
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(TOOL_PREFIX))
        .map(rewrite_cluster_flag)
        .filter(|cmd| !cmd.is_empty())
        .collect()
}

/// Rewrite the short `-c <cluster>` pair into `--cluster=<cluster>`.
fn rewrite_cluster_flag(line: &str) -> ToolCommand {
    let mut command = ToolCommand::default();
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "-c" => match tokens.next() {
                Some(cluster) => command.push(format!("--cluster={cluster}")),
                None => command.push(token),
            },
            _ => match token.strip_prefix("-c=") {
                Some(cluster) => command.push(format!("--cluster={cluster}")),
                None => command.push(token),
            },
        }
    }
    command
}

/// Result of running one follow-up command
#[derive(Debug)]
pub struct CleanupOutcome {
    pub command: ToolCommand,
    pub result: Result<(), LifecycleError>,
}

/// Per-command outcomes of one cleanup pass
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LifecycleError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Runs the follow-up commands found in deletion output
pub struct LeftoverResourceCleaner<'a, T> {
    tool: &'a T,
    auth: &'a AuthContext,
    region: &'a str,
}

impl<'a, T: ClusterTool> LeftoverResourceCleaner<'a, T> {
    pub fn new(tool: &'a T, auth: &'a AuthContext, region: &'a str) -> Self {
        Self { tool, auth, region }
    }

    /// Parse `deletion_output` and run every command it names, best effort.
    pub async fn clean(&self, deletion_output: &str) -> CleanupReport {
        let commands = parse_leftover_commands(deletion_output);
        if commands.is_empty() {
            return CleanupReport::default();
        }

        info!(count = commands.len(), "Removing leftover resources");
        let mut report = CleanupReport::default();
        for command in commands {
            let result = self.run_one(&command).await;
            if let Err(e) = &result {
                warn!(command = %command, error = %e, "Leftover cleanup command failed");
            }
            report.outcomes.push(CleanupOutcome { command, result });
        }
        report
    }

    async fn run_one(&self, command: &ToolCommand) -> Result<(), LifecycleError> {
        let cleanup_failed = |message: String| LifecycleError::Cleanup {
            command: command.to_string(),
            message,
        };

        let output = self
            .tool
            .execute(command, self.auth, self.region)
            .await
            .map_err(|e| cleanup_failed(format!("{e:#}")))?;

        if output.success {
            debug!(command = %command, "Leftover cleanup command succeeded");
            Ok(())
        } else {
            Err(cleanup_failed(output.stderr.trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ToolOutput;
    use forge_common::OcmEnvironment;
    use std::sync::Mutex;

    const SAMPLE: &str = "\
INFO: Cluster 'c1' will start uninstalling now
INFO: Your Account roles are not deleted
INFO: Once the cluster is uninstalled use the following commands to remove the above aws resources.

\trosa delete operator-roles -c 2f7a9k --mode auto
\trosa delete oidc-provider -c 2f7a9k
INFO: To watch your cluster uninstallation logs, run 'rosa logs uninstall -c c1 --watch'
";

    #[test]
    fn test_parses_block_in_order() {
        let commands = parse_leftover_commands(SAMPLE);
        let rendered: Vec<String> = commands.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "delete operator-roles --cluster=2f7a9k --mode auto",
                "delete oidc-provider --cluster=2f7a9k",
            ]
        );
    }

    #[test]
    fn test_lines_after_closing_marker_ignored() {
        let commands = parse_leftover_commands(SAMPLE);
        assert!(commands.iter().all(|c| !c.to_string().contains("logs")));
    }

    #[test]
    fn test_missing_marker_yields_nothing() {
        assert!(parse_leftover_commands("INFO: Cluster deleted\nrosa delete x -c y\n").is_empty());
        assert!(parse_leftover_commands("").is_empty());
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let output = format!("{LEFTOVER_MARKER}.\n  rosa delete oidc-provider -c abc\n");
        let commands = parse_leftover_commands(&output);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "delete oidc-provider --cluster=abc");
    }

    #[test]
    fn test_non_tool_lines_skipped() {
        let output = format!(
            "{LEFTOVER_MARKER}.\n  aws iam delete-role x\n  rosa delete operator-roles -c=abc\nINFO: done"
        );
        let commands = parse_leftover_commands(&output);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "delete operator-roles --cluster=abc");
    }

    struct ScriptedTool {
        fail_on: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl ClusterTool for ScriptedTool {
        async fn execute(
            &self,
            command: &ToolCommand,
            _auth: &AuthContext,
            _region: &str,
        ) -> anyhow::Result<ToolOutput> {
            let line = command.to_string();
            self.calls.lock().unwrap().push(line.clone());
            Ok(ToolOutput {
                stdout: String::new(),
                stderr: "role in use".to_string(),
                success: !line.contains(self.fail_on),
            })
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_commands() {
        let tool = ScriptedTool {
            fail_on: "operator-roles",
            calls: Mutex::new(Vec::new()),
        };
        let auth = AuthContext::new("token", OcmEnvironment::Stage);
        let cleaner = LeftoverResourceCleaner::new(&tool, &auth, "us-east-2");

        let report = cleaner.clean(SAMPLE).await;

        assert_eq!(tool.calls.lock().unwrap().len(), 2);
        assert_eq!(report.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert!(!report.is_clean());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert!(!failures[0].is_fatal());
    }

    #[tokio::test]
    async fn test_no_block_runs_nothing() {
        let tool = ScriptedTool {
            fail_on: "never",
            calls: Mutex::new(Vec::new()),
        };
        let auth = AuthContext::new("token", OcmEnvironment::Stage);
        let report = LeftoverResourceCleaner::new(&tool, &auth, "us-east-2")
            .clean("INFO: Cluster deleted")
            .await;
        assert!(report.is_empty());
        assert!(report.is_clean());
        assert!(tool.calls.lock().unwrap().is_empty());
    }
}
