//! In-memory collaborators for lifecycle integration tests
//!
//! Every fake appends to a shared [`Journal`] so tests can assert the order
//! in which the controller touched each collaborator.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forge_common::{OcmEnvironment, ResourceKind};
use forge_coordinator::descriptor::{ClusterDescriptor, DescriptorContext, parse_cluster_arg};
use forge_coordinator::error::LifecycleError;
use forge_coordinator::infra::{ProvisioningEngine, StackOutputs, StackVariables};
use forge_coordinator::leftovers::CleanupReport;
use forge_coordinator::orchestrator::{LifecycleReporter, LifecycleState};
use forge_coordinator::remote::{
    AuthContext, ClusterApi, ClusterHandle, ClusterTool, ToolCommand, ToolOutput, WorkloadClient,
};
use forge_coordinator::versions::VersionCatalog;

pub const KUBECONFIG: &[u8] = b"apiVersion: v1\nkind: Config\nclusters: []\n";

/// Ordered record of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }
}

/// Creation/deletion tool answering from canned output
pub struct FakeTool {
    journal: Journal,
    deletion_output: String,
    failing: Mutex<Vec<String>>,
}

impl FakeTool {
    pub fn new(journal: &Journal, deletion_output: &str) -> Self {
        Self {
            journal: journal.clone(),
            deletion_output: deletion_output.to_string(),
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Exit non-zero for every command starting with `prefix`
    pub fn fail_on(self, prefix: &str) -> Self {
        self.failing.lock().unwrap().push(prefix.to_string());
        self
    }

    fn oidc_prefix(&self) -> String {
        self.journal
            .entries()
            .iter()
            .rev()
            .find_map(|e| {
                e.split_whitespace()
                    .find_map(|arg| arg.strip_prefix("--prefix="))
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }
}

impl ClusterTool for FakeTool {
    async fn execute(
        &self,
        command: &ToolCommand,
        _auth: &AuthContext,
        _region: &str,
    ) -> anyhow::Result<ToolOutput> {
        let line = command.to_string();
        self.journal.push(format!("rosa {line}"));

        if self.failing.lock().unwrap().iter().any(|p| line.starts_with(p)) {
            return Ok(ToolOutput {
                stdout: String::new(),
                stderr: format!("ERR: {line} failed"),
                success: false,
            });
        }

        let stdout = if line.starts_with("delete cluster") {
            self.deletion_output.clone()
        } else if line.starts_with("list oidc-config") {
            format!(
                r#"[{{"id": "oidc-other", "secret_arn": "arn:secret:someone-else"}},
                    {{"id": "oidc-1", "secret_arn": "arn:secret:{}-oidc"}}]"#,
                self.oidc_prefix()
            )
        } else {
            String::new()
        };
        Ok(ToolOutput {
            stdout,
            stderr: String::new(),
            success: true,
        })
    }
}

/// Behavior of the fake cluster object
#[derive(Debug, Clone, Default)]
pub struct HandleBehavior {
    /// How long `wait_ready` takes before succeeding
    pub ready_after: Duration,
    pub ready_error: Option<String>,
    /// Job fails instead of completing
    pub job_error: Option<String>,
}

/// Cluster-management API backed by a single in-memory cluster
pub struct FakeApi {
    journal: Journal,
    registered: AtomicBool,
    /// Number of `find` calls that answer `None` before the cluster appears
    absent_for: AtomicUsize,
    behavior: HandleBehavior,
    pub job_timeouts: Arc<Mutex<Vec<Duration>>>,
    pub workload_kubeconfigs: Mutex<Vec<PathBuf>>,
}

impl FakeApi {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            registered: AtomicBool::new(true),
            absent_for: AtomicUsize::new(0),
            behavior: HandleBehavior::default(),
            job_timeouts: Arc::new(Mutex::new(Vec::new())),
            workload_kubeconfigs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: HandleBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// The cluster object never shows up
    pub fn unregistered(self) -> Self {
        self.registered.store(false, Ordering::SeqCst);
        self
    }

    pub fn appearing_after(self, polls: usize) -> Self {
        self.absent_for.store(polls, Ordering::SeqCst);
        self
    }
}

impl ClusterApi for FakeApi {
    type Handle = FakeHandle;
    type Workload = FakeWorkload;

    async fn find(&self, name: &str, _auth: &AuthContext) -> anyhow::Result<Option<FakeHandle>> {
        self.journal.push(format!("find {name}"));
        if !self.registered.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self
            .absent_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        Ok(Some(FakeHandle {
            id: format!("{name}-id"),
            journal: self.journal.clone(),
            behavior: self.behavior.clone(),
        }))
    }

    async fn workload_client(&self, kubeconfig: &Path) -> anyhow::Result<FakeWorkload> {
        self.journal.push("workload client");
        self.workload_kubeconfigs
            .lock()
            .unwrap()
            .push(kubeconfig.to_path_buf());
        Ok(FakeWorkload {
            journal: self.journal.clone(),
            job_error: self.behavior.job_error.clone(),
            timeouts: self.job_timeouts.clone(),
        })
    }
}

pub struct FakeHandle {
    id: String,
    journal: Journal,
    behavior: HandleBehavior,
}

impl ClusterHandle for FakeHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait_ready(&self, _timeout: Duration) -> anyhow::Result<()> {
        self.journal.push("wait ready");
        tokio::time::sleep(self.behavior.ready_after).await;
        match &self.behavior.ready_error {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }

    async fn wait_deleted(&self, _timeout: Duration) -> anyhow::Result<()> {
        self.journal.push("wait deleted");
        Ok(())
    }

    async fn credentials(&self) -> anyhow::Result<Vec<u8>> {
        self.journal.push("credentials");
        Ok(KUBECONFIG.to_vec())
    }
}

pub struct FakeWorkload {
    journal: Journal,
    job_error: Option<String>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl WorkloadClient for FakeWorkload {
    async fn wait_for_job_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: &str,
        status: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        self.journal
            .push(format!("job {namespace}/{name} {condition}={status}"));
        self.timeouts.lock().unwrap().push(timeout);
        match &self.job_error {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }
}

/// Provisioning engine that records variables and never touches a cloud
pub struct FakeEngine {
    journal: Journal,
    fail_apply: bool,
    fail_destroy: bool,
    pub applied_vars: Mutex<Vec<StackVariables>>,
}

impl FakeEngine {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_apply: false,
            fail_destroy: false,
            applied_vars: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    /// Every destroy fails, leaving whatever was applied in place
    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }
}

impl ProvisioningEngine for FakeEngine {
    async fn init(&self, _working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()> {
        self.journal.push(format!("engine init {}", vars.cluster_name));
        Ok(())
    }

    async fn apply(&self, _working_dir: &Path, vars: &StackVariables) -> anyhow::Result<StackOutputs> {
        self.journal.push(format!("engine apply {}", vars.cluster_name));
        self.applied_vars.lock().unwrap().push(vars.clone());
        if self.fail_apply {
            anyhow::bail!("Error: creating EC2 VPC: VpcLimitExceeded");
        }
        let mut outputs = StackOutputs::default();
        outputs
            .0
            .insert("subnet_ids".to_string(), serde_json::json!(["subnet-a", "subnet-b"]));
        Ok(outputs)
    }

    async fn destroy(&self, _working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()> {
        self.journal.push(format!("engine destroy {}", vars.cluster_name));
        if self.fail_destroy {
            anyhow::bail!("Error: deleting EC2 Subnet: DependencyViolation");
        }
        Ok(())
    }
}

/// Reporter that keeps everything it is told
#[derive(Default)]
pub struct RecordingReporter {
    pub transitions: Mutex<Vec<(String, LifecycleState, LifecycleState)>>,
    pub cleanups: Mutex<Vec<(String, usize, usize)>>,
    pub rollback_steps: Mutex<Vec<(ResourceKind, bool)>>,
}

impl RecordingReporter {
    pub fn states(&self, cluster: &str) -> Vec<LifecycleState> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _, _)| name == cluster)
            .map(|(_, _, to)| *to)
            .collect()
    }
}

impl LifecycleReporter for RecordingReporter {
    fn report_transition(&self, cluster: &str, from: LifecycleState, to: LifecycleState) {
        self.transitions
            .lock()
            .unwrap()
            .push((cluster.to_string(), from, to));
    }

    fn report_cleanup(&self, cluster: &str, report: &CleanupReport) {
        self.cleanups.lock().unwrap().push((
            cluster.to_string(),
            report.succeeded(),
            report.failures().count(),
        ));
    }

    fn report_rollback_step(
        &self,
        _cluster: &str,
        resource: ResourceKind,
        result: Result<(), &LifecycleError>,
    ) {
        self.rollback_steps
            .lock()
            .unwrap()
            .push((resource, result.is_ok()));
    }
}

pub fn catalog() -> VersionCatalog {
    serde_json::from_str(forge_test_utils::CHANNEL_GROUP_CATALOG).unwrap()
}

pub fn context(install_base: &Path, require_version: bool) -> DescriptorContext {
    DescriptorContext {
        install_base: install_base.to_path_buf(),
        auth: AuthContext::new("test-token", OcmEnvironment::Stage),
        require_version,
    }
}

/// Normalized descriptor from a `k=v;...` argument, with its install dir prepared
pub fn descriptor(install_base: &Path, arg: &str) -> ClusterDescriptor {
    let raw = parse_cluster_arg(arg).unwrap();
    let descriptor = ClusterDescriptor::from_raw(&raw, &context(install_base, true)).unwrap();
    descriptor.prepare_install_dir().unwrap();
    descriptor
}
