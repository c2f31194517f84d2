//! Collaborator contracts for the remote control plane
//!
//! The lifecycle controller only sees these traits. Process-backed
//! implementations live in the submodules; tests supply in-memory fakes.

pub mod oc;
pub mod ocm_api;
pub mod rosa;
pub mod session;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use forge_common::OcmEnvironment;

pub use crate::process::ToolOutput;
pub use oc::OcWorkloadClient;
pub use ocm_api::{OcmCluster, OcmClusterApi};
pub use rosa::RosaCli;
pub use session::SessionStore;

/// Arguments for one creation/deletion tool invocation, without the program name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCommand {
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated command line
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    pub fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Check if `flag` is present, bare or with a value
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args
            .iter()
            .any(|arg| arg == flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Credentials and environment a tool call runs under
#[derive(Clone)]
pub struct AuthContext {
    pub token: String,
    pub environment: OcmEnvironment,
}

impl AuthContext {
    pub fn new(token: impl Into<String>, environment: OcmEnvironment) -> Self {
        Self {
            token: token.into(),
            environment,
        }
    }
}

// Keep the token out of logs
impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"<redacted>")
            .field("environment", &self.environment)
            .finish()
    }
}

/// Creation/deletion command tool
#[allow(async_fn_in_trait)]
pub trait ClusterTool {
    /// Run `command` against `region`. A non-zero exit is reported via
    /// [`ToolOutput::success`], not as an error.
    async fn execute(
        &self,
        command: &ToolCommand,
        auth: &AuthContext,
        region: &str,
    ) -> anyhow::Result<ToolOutput>;
}

/// Cluster-management API
#[allow(async_fn_in_trait)]
pub trait ClusterApi {
    type Handle: ClusterHandle;
    type Workload: WorkloadClient;

    /// Look up a cluster object by name; `None` while it does not exist yet
    async fn find(&self, name: &str, auth: &AuthContext) -> anyhow::Result<Option<Self::Handle>>;

    /// A client scoped to the cluster described by `kubeconfig`
    async fn workload_client(&self, kubeconfig: &Path) -> anyhow::Result<Self::Workload>;
}

/// A remote cluster object
#[allow(async_fn_in_trait)]
pub trait ClusterHandle {
    fn id(&self) -> &str;

    async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()>;

    async fn wait_deleted(&self, timeout: Duration) -> anyhow::Result<()>;

    /// Admin kubeconfig bytes
    async fn credentials(&self) -> anyhow::Result<Vec<u8>>;
}

/// Workload API of a running cluster
#[allow(async_fn_in_trait)]
pub trait WorkloadClient {
    async fn wait_for_job_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: &str,
        status: &str,
        timeout: Duration,
    ) -> anyhow::Result<()>;
}
