//! Workload access through the `oc` CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use super::WorkloadClient;
use crate::process::{CommandConfig, CommandSpec, run_command};
use crate::wait::TimeoutWatcher;

#[derive(Debug, Clone)]
pub struct OcWorkloadClient {
    binary: PathBuf,
    kubeconfig: PathBuf,
    poll_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct Job {
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatus {
    #[serde(default)]
    conditions: Vec<JobCondition>,
}

#[derive(Debug, Deserialize)]
struct JobCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
}

impl OcWorkloadClient {
    pub fn new(binary: impl Into<PathBuf>, kubeconfig: &Path) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: kubeconfig.to_path_buf(),
            poll_interval: Duration::from_secs(10),
        }
    }

    /// Fetch the job as JSON; `None` while it does not exist
    async fn get_job(&self, namespace: &str, name: &str) -> anyhow::Result<Option<String>> {
        let spec = CommandSpec::new(&self.binary)
            .arg(format!("--kubeconfig={}", self.kubeconfig.display()))
            .args(["get", "job", name])
            .arg(format!("--namespace={namespace}"))
            .arg("--output=json");
        let output = run_command(&spec, &CommandConfig::for_query()).await?;
        if output.success {
            Ok(Some(output.stdout))
        } else if output.stderr.contains("NotFound") || output.stderr.contains("not found") {
            Ok(None)
        } else {
            anyhow::bail!("oc get job {namespace}/{name} failed: {}", output.stderr.trim())
        }
    }
}

/// Check a job's conditions for `condition`/`status`; a `Failed=True` job is an error
pub(crate) fn job_condition_met(json: &str, condition: &str, status: &str) -> anyhow::Result<bool> {
    let job: Job = serde_json::from_str(json).context("Failed to parse job")?;
    let conditions = &job.status.conditions;

    if condition != "Failed"
        && conditions
            .iter()
            .any(|c| c.condition_type == "Failed" && c.status == "True")
    {
        anyhow::bail!("job reported condition Failed=True");
    }

    Ok(conditions
        .iter()
        .any(|c| c.condition_type == condition && c.status == status))
}

impl WorkloadClient for OcWorkloadClient {
    async fn wait_for_job_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: &str,
        status: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let watcher = TimeoutWatcher::new(timeout).with_poll_interval(self.poll_interval);
        let what = format!("job {namespace}/{name} {condition}={status}");
        watcher
            .wait_for(&what, None, || async {
                match self.get_job(namespace, name).await? {
                    Some(json) => job_condition_met(&json, condition, status),
                    None => {
                        debug!(namespace = %namespace, job = %name, "Job not created yet");
                        Ok(false)
                    }
                }
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"{
        "kind": "Job",
        "metadata": {"name": "osd-cluster-ready", "namespace": "openshift-monitoring"},
        "status": {"conditions": [{"type": "Complete", "status": "True", "lastProbeTime": "2024-01-01T00:00:00Z"}], "succeeded": 1}
    }"#;

    #[test]
    fn test_complete_condition() {
        assert!(job_condition_met(COMPLETE, "Complete", "True").unwrap());
        assert!(!job_condition_met(COMPLETE, "Complete", "False").unwrap());
    }

    #[test]
    fn test_running_job_has_no_conditions() {
        let json = r#"{"kind": "Job", "status": {"active": 1}}"#;
        assert!(!job_condition_met(json, "Complete", "True").unwrap());
        assert!(!job_condition_met(r#"{"kind": "Job"}"#, "Complete", "True").unwrap());
    }

    #[test]
    fn test_failed_job_is_error() {
        let json = r#"{"status": {"conditions": [{"type": "Failed", "status": "True"}]}}"#;
        assert!(job_condition_met(json, "Complete", "True").is_err());
        assert!(job_condition_met(json, "Failed", "True").unwrap());
    }
}
