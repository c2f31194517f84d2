//! The cluster lifecycle state machine
//!
//! Create runs `Pending -> VersionResolved -> InfrastructureReady ->
//! CreationRequested -> Ready`, one transition at a time. Any failure while
//! entering a state moves to `RollingBack`, which undoes whatever the
//! progress record says exists and ends in `Destroyed` with a `RolledBack`
//! error. Destroy runs `DestroyRequested -> Destroyed` and surfaces
//! failures directly.

use std::path::{Path, PathBuf};

use anyhow::Context;
use forge_common::ResourceKind;
use forge_common::defaults::{
    CLUSTER_LOOKUP_TIMEOUT, VERIFICATION_JOB_NAME, VERIFICATION_JOB_NAMESPACE,
    VERIFICATION_JOB_TIMEOUT,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::flags::{creation_command, deletion_command};
use super::progress::LifecycleReporter;
use super::state::LifecycleState;
use crate::descriptor::ClusterDescriptor;
use crate::error::LifecycleError;
use crate::infra::{InfrastructureStack, ProvisioningEngine, StackRegistry};
use crate::leftovers::{CleanupReport, LeftoverResourceCleaner};
use crate::remote::rosa::{create_oidc_config, delete_oidc_config};
use crate::remote::{ClusterApi, ClusterHandle, ClusterTool, WorkloadClient};
use crate::versions::VersionCatalog;
use crate::wait::TimeoutWatcher;

/// What a successful create produced
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub version: Option<String>,
    pub kubeconfig: PathBuf,
    pub record: Option<PathBuf>,
}

/// What a successful destroy produced
#[derive(Debug, Default)]
pub struct DestroyOutcome {
    pub cleanup: CleanupReport,
}

/// What exists remotely so far; drives rollback
#[derive(Debug, Default)]
struct CreateProgress {
    state: LifecycleState,
    stack: Option<InfrastructureStack>,
    oidc_config_id: Option<String>,
    creation_requested: bool,
    job_dispatched: bool,
}

/// Drives one cluster at a time through create or destroy
pub struct ClusterLifecycleController<'a, T, A, E> {
    tool: &'a T,
    api: &'a A,
    engine: &'a E,
    catalog: &'a VersionCatalog,
    registry: StackRegistry,
    reporter: &'a dyn LifecycleReporter,
    manifest: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<'a, T, A, E> ClusterLifecycleController<'a, T, A, E>
where
    T: ClusterTool,
    A: ClusterApi,
    E: ProvisioningEngine,
{
    pub fn new(
        tool: &'a T,
        api: &'a A,
        engine: &'a E,
        catalog: &'a VersionCatalog,
        reporter: &'a dyn LifecycleReporter,
    ) -> Self {
        Self {
            tool,
            api,
            engine,
            catalog,
            registry: StackRegistry::new(),
            reporter,
            manifest: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a stack registry across controllers
    pub fn with_registry(mut self, registry: StackRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Manifest template copied into each stack's working directory
    pub fn with_manifest(mut self, manifest: Option<PathBuf>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Token whose cancellation aborts the current operation
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create the cluster, rolling back everything on failure.
    #[instrument(skip_all, fields(cluster = %descriptor.name))]
    pub async fn create(
        &self,
        descriptor: &mut ClusterDescriptor,
    ) -> Result<CreateOutcome, LifecycleError> {
        let mut progress = CreateProgress::default();

        while let Some(next) = progress.state.next_create_state() {
            let entered = if self.cancel.is_cancelled() {
                Err(LifecycleError::Cancelled {
                    what: format!("cluster {} {next}", descriptor.name),
                })
            } else {
                self.enter(next, descriptor, &mut progress).await
            };

            if let Err(e) = entered {
                error!(state = %progress.state, next = %next, error = %e, "Create step failed");
                if !e.triggers_rollback() {
                    return Err(e);
                }
                return Err(self.roll_back(descriptor, &mut progress, e).await);
            }
            self.advance(&descriptor.name, &mut progress.state, next);
        }

        let record = match descriptor.persist() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = ?e, "Failed to write cluster data record");
                None
            }
        };

        info!(version = ?descriptor.effective_version(), "Cluster ready");
        Ok(CreateOutcome {
            version: descriptor.effective_version().map(str::to_string),
            kubeconfig: descriptor.kubeconfig_path(),
            record,
        })
    }

    /// Perform the work of entering `next`
    async fn enter(
        &self,
        next: LifecycleState,
        descriptor: &mut ClusterDescriptor,
        progress: &mut CreateProgress,
    ) -> Result<(), LifecycleError> {
        match next {
            LifecycleState::VersionResolved => self.resolve_version(descriptor),
            LifecycleState::InfrastructureReady => self.provision(descriptor, progress).await,
            LifecycleState::CreationRequested => {
                progress.creation_requested = true;
                self.request_creation(descriptor).await
            }
            LifecycleState::Ready => self.await_ready(descriptor, progress).await,
            other => Err(LifecycleError::Input(format!(
                "{other} is not a create-path state"
            ))),
        }
    }

    fn resolve_version(&self, descriptor: &mut ClusterDescriptor) -> Result<(), LifecycleError> {
        let requested = descriptor.version.as_deref().ok_or_else(|| {
            LifecycleError::Input(format!("{}: no version requested", descriptor.name))
        })?;
        let resolved = self.catalog.resolve(requested, &descriptor.stream)?;
        descriptor.artifact = Some(resolved);
        Ok(())
    }

    /// OIDC config and network stack, hosted control plane only
    async fn provision(
        &self,
        descriptor: &mut ClusterDescriptor,
        progress: &mut CreateProgress,
    ) -> Result<(), LifecycleError> {
        if !descriptor.platform.needs_infrastructure() {
            debug!("Platform needs no infrastructure stack");
            return Ok(());
        }

        let mut stack = InfrastructureStack::new(
            &descriptor.name,
            &descriptor.region,
            &descriptor.install_dir,
            self.registry.clone(),
        )?;

        let provisioning_failed = |source: anyhow::Error| LifecycleError::Provisioning {
            cluster: descriptor.name.clone(),
            source,
        };

        let oidc_config_id = create_oidc_config(
            self.tool,
            &descriptor.name,
            &descriptor.auth,
            &descriptor.region,
        )
        .await
        .map_err(provisioning_failed)?;
        progress.oidc_config_id = Some(oidc_config_id.clone());
        descriptor.oidc_config_id = Some(oidc_config_id);

        if let Some(template) = &self.manifest {
            stack.install_manifest(template).map_err(provisioning_failed)?;
        }

        let applied = stack.apply(self.engine).await.map(|outputs| outputs.subnet_ids());
        // A failed apply may still hold resources if its own cleanup failed
        progress.stack = Some(stack);
        let subnet_ids = applied?;

        if let Some(subnet_ids) = subnet_ids {
            descriptor.parameters.insert("subnet-ids".to_string(), subnet_ids);
        }
        Ok(())
    }

    async fn request_creation(&self, descriptor: &ClusterDescriptor) -> Result<(), LifecycleError> {
        let command = creation_command(descriptor);
        info!(command = %command, "Requesting cluster creation");

        let output = self
            .tool
            .execute(&command, &descriptor.auth, &descriptor.region)
            .await
            .map_err(|e| LifecycleError::Creation {
                cluster: descriptor.name.clone(),
                message: format!("{e:#}"),
            })?;

        if !output.success {
            return Err(LifecycleError::Creation {
                cluster: descriptor.name.clone(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Wait for the cluster object and its ready condition, then run the post-ready hook
    async fn await_ready(
        &self,
        descriptor: &ClusterDescriptor,
        progress: &mut CreateProgress,
    ) -> Result<(), LifecycleError> {
        let watcher = TimeoutWatcher::new(descriptor.timeout);
        let cancel = Some(&self.cancel);

        let handle = watcher
            .bounded(CLUSTER_LOOKUP_TIMEOUT)
            .wait_for_value(&format!("cluster {} object", descriptor.name), cancel, || {
                self.api.find(&descriptor.name, &descriptor.auth)
            })
            .await?;
        info!(id = %handle.id(), "Cluster object found, waiting for ready");

        watcher
            .run(
                &format!("cluster {} ready", descriptor.name),
                cancel,
                handle.wait_ready(watcher.remaining()),
            )
            .await?;

        self.verify_ready(descriptor, &handle, progress).await
    }

    /// Persist credentials and wait for the readiness-verification job
    async fn verify_ready(
        &self,
        descriptor: &ClusterDescriptor,
        handle: &A::Handle,
        progress: &mut CreateProgress,
    ) -> Result<(), LifecycleError> {
        let creation_failed = |message: String| LifecycleError::Creation {
            cluster: descriptor.name.clone(),
            message,
        };

        let kubeconfig = handle
            .credentials()
            .await
            .map_err(|e| creation_failed(format!("fetching credentials failed: {e:#}")))?;
        let path = descriptor.kubeconfig_path();
        write_kubeconfig(&path, &kubeconfig)
            .map_err(|e| creation_failed(format!("{e:#}")))?;
        info!(kubeconfig = %path.display(), "Wrote kubeconfig");

        let client = self
            .api
            .workload_client(&path)
            .await
            .map_err(|e| creation_failed(format!("cluster client failed: {e:#}")))?;

        // Fixed bound, independent of the descriptor timeout
        let job_watcher = TimeoutWatcher::new(VERIFICATION_JOB_TIMEOUT);
        progress.job_dispatched = true;
        job_watcher
            .run(
                &format!("job {VERIFICATION_JOB_NAMESPACE}/{VERIFICATION_JOB_NAME} complete"),
                Some(&self.cancel),
                client.wait_for_job_condition(
                    VERIFICATION_JOB_NAMESPACE,
                    VERIFICATION_JOB_NAME,
                    "Complete",
                    "True",
                    job_watcher.budget(),
                ),
            )
            .await
    }

    /// Undo a failed create. Runs under its own budget and ignores the
    /// caller's cancellation so nothing created is abandoned.
    async fn roll_back(
        &self,
        descriptor: &ClusterDescriptor,
        progress: &mut CreateProgress,
        cause: LifecycleError,
    ) -> LifecycleError {
        let failed_in = progress.state;
        self.advance(&descriptor.name, &mut progress.state, LifecycleState::RollingBack);
        let watcher = TimeoutWatcher::new(descriptor.timeout);
        let mut rollback_failures = Vec::new();

        if progress.job_dispatched {
            debug!("Leaving verification job in place");
        }

        let mut steps = Vec::new();
        if progress.creation_requested {
            steps.push(ResourceKind::Cluster);
        }
        if progress.stack.as_ref().is_some_and(InfrastructureStack::may_hold_resources) {
            steps.push(ResourceKind::InfrastructureStack);
        }
        if progress.oidc_config_id.is_some() {
            steps.push(ResourceKind::OidcConfig);
        }
        steps.sort_by_key(|kind| kind.teardown_priority());

        for kind in steps {
            let result = match kind {
                ResourceKind::Cluster => self.roll_back_cluster(descriptor, &watcher).await,
                ResourceKind::InfrastructureStack => match progress.stack.as_mut() {
                    Some(stack) => stack.destroy(self.engine).await,
                    None => Ok(()),
                },
                ResourceKind::OidcConfig => match progress.oidc_config_id.as_deref() {
                    Some(id) => self.remove_oidc_config(descriptor, id).await,
                    None => Ok(()),
                },
            };
            self.reporter
                .report_rollback_step(&descriptor.name, kind, result.as_ref().map(|_| ()));
            if let Err(e) = result {
                rollback_failures.push(e.to_string());
            }
        }

        self.advance(&descriptor.name, &mut progress.state, LifecycleState::Destroyed);
        LifecycleError::RolledBack {
            cluster: descriptor.name.clone(),
            state: failed_in,
            cause: Box::new(cause),
            rollback_failures,
        }
    }

    /// Delete the cluster object if the creation tool got as far as registering it
    async fn roll_back_cluster(
        &self,
        descriptor: &ClusterDescriptor,
        watcher: &TimeoutWatcher,
    ) -> Result<(), LifecycleError> {
        match self.api.find(&descriptor.name, &descriptor.auth).await {
            Ok(None) => {
                debug!("Cluster object was never registered");
                return Ok(());
            }
            Ok(Some(_)) => {}
            Err(e) => warn!(error = ?e, "Cluster lookup failed, deleting anyway"),
        }
        self.delete_cluster(descriptor, watcher, None).await.map(|_| ())
    }

    /// Deletion tool, leftover cleanup, then wait for the object to disappear
    async fn delete_cluster(
        &self,
        descriptor: &ClusterDescriptor,
        watcher: &TimeoutWatcher,
        cancel: Option<&CancellationToken>,
    ) -> Result<CleanupReport, LifecycleError> {
        let deletion_failed = |message: String| LifecycleError::Deletion {
            cluster: descriptor.name.clone(),
            message,
        };

        let command = deletion_command(descriptor);
        info!(command = %command, "Requesting cluster deletion");
        let output = self
            .tool
            .execute(&command, &descriptor.auth, &descriptor.region)
            .await
            .map_err(|e| deletion_failed(format!("{e:#}")))?;
        if !output.success {
            return Err(deletion_failed(output.stderr.trim().to_string()));
        }

        let report = LeftoverResourceCleaner::new(self.tool, &descriptor.auth, &descriptor.region)
            .clean(&output.stdout)
            .await;
        self.reporter.report_cleanup(&descriptor.name, &report);

        let what = format!("cluster {} deleted", descriptor.name);
        let handle = watcher
            .run(&what, cancel, self.api.find(&descriptor.name, &descriptor.auth))
            .await?;
        match handle {
            Some(handle) => {
                watcher
                    .run(&what, cancel, handle.wait_deleted(watcher.remaining()))
                    .await?
            }
            None => debug!("Cluster object already gone"),
        }
        Ok(report)
    }

    /// Tear the cluster down; failures surface directly.
    #[instrument(skip_all, fields(cluster = %descriptor.name))]
    pub async fn destroy(
        &self,
        descriptor: &ClusterDescriptor,
    ) -> Result<DestroyOutcome, LifecycleError> {
        let mut state = LifecycleState::Pending;
        self.advance(&descriptor.name, &mut state, LifecycleState::DestroyRequested);

        let watcher = TimeoutWatcher::new(descriptor.timeout);
        let cleanup = self
            .delete_cluster(descriptor, &watcher, Some(&self.cancel))
            .await?;

        if descriptor.platform.needs_infrastructure() {
            let mut stack = InfrastructureStack::attach(
                &descriptor.name,
                &descriptor.region,
                &descriptor.install_dir,
                self.registry.clone(),
            )?;
            stack.destroy(self.engine).await?;
            if let Some(id) = descriptor.oidc_config_id.as_deref() {
                self.remove_oidc_config(descriptor, id).await?;
            }
        }

        self.advance(&descriptor.name, &mut state, LifecycleState::Destroyed);
        info!("Cluster destroyed");
        Ok(DestroyOutcome { cleanup })
    }

    async fn remove_oidc_config(
        &self,
        descriptor: &ClusterDescriptor,
        id: &str,
    ) -> Result<(), LifecycleError> {
        delete_oidc_config(self.tool, id, &descriptor.auth, &descriptor.region)
            .await
            .map_err(|e| LifecycleError::Deletion {
                cluster: descriptor.name.clone(),
                message: format!("OIDC config {id} delete failed: {e:#}"),
            })
    }

    fn advance(&self, cluster: &str, state: &mut LifecycleState, to: LifecycleState) {
        self.reporter.report_transition(cluster, *state, to);
        *state = to;
    }
}

fn write_kubeconfig(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
