//! Orchestration of cluster create/destroy runs
//!
//! A run hands each normalized descriptor to the
//! [`ClusterLifecycleController`], either one after another or concurrently
//! on the current task, and collects one outcome per cluster.

pub mod controller;
pub mod flags;
pub mod progress;
pub mod run;
pub mod state;

pub use controller::{ClusterLifecycleController, CreateOutcome, DestroyOutcome};
pub use flags::{creation_command, deletion_command};
pub use progress::{LifecycleReporter, LogReporter};
pub use run::run_from_config;
pub use state::LifecycleState;

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use forge_common::{CloudProvider, Platform};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::credentials::ScopedCredentialFile;
use crate::descriptor::ClusterDescriptor;
use crate::error::LifecycleError;
use crate::infra::ProvisioningEngine;
use crate::remote::{ClusterApi, ClusterTool, ToolCommand};
use crate::versions::VersionCatalog;

/// Which lifecycle operation a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Create,
    Destroy,
}

/// Run-wide knobs
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Drive all clusters concurrently instead of one after another
    pub parallel: bool,
    /// Service account installed for GCP clusters
    pub gcp_service_account: Option<PathBuf>,
    /// Where the service account is installed (defaults to `~/.gcp/osServiceAccount.json`)
    pub credential_target: Option<PathBuf>,
}

/// Result of one cluster's operation
#[derive(Debug)]
pub struct ClusterOutcome {
    pub name: String,
    pub platform: Platform,
    pub action: Action,
    pub result: Result<String, LifecycleError>,
    pub elapsed: Duration,
}

/// Per-cluster outcomes of a run, in descriptor order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<ClusterOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &ClusterOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Summary table for the terminal
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Cluster"),
                Cell::new("Platform"),
                Cell::new("Action"),
                Cell::new("Status"),
                Cell::new("Duration"),
                Cell::new("Details"),
            ]);

        for outcome in &self.outcomes {
            let (status, details) = match &outcome.result {
                Ok(details) => ("Succeeded", details.clone()),
                Err(e) => ("Failed", failure_details(e)),
            };
            table.add_row(vec![
                Cell::new(&outcome.name),
                Cell::new(outcome.platform),
                Cell::new(outcome.action),
                Cell::new(status),
                Cell::new(format!("{}s", outcome.elapsed.as_secs())),
                Cell::new(details),
            ]);
        }
        table.to_string()
    }

    /// Fail the run if any cluster failed
    pub fn into_result(self) -> anyhow::Result<()> {
        let failed: Vec<&str> = self.failed().map(|o| o.name.as_str()).collect();
        if failed.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{} cluster(s) failed: {}", failed.len(), failed.join(", "))
        }
    }
}

/// Drive every descriptor through `action` and collect the outcomes.
pub async fn run_clusters<T, A, E>(
    controller: &ClusterLifecycleController<'_, T, A, E>,
    action: Action,
    descriptors: Vec<ClusterDescriptor>,
    options: &RunOptions,
) -> RunSummary
where
    T: ClusterTool,
    A: ClusterApi,
    E: ProvisioningEngine,
{
    info!(
        action = %action,
        clusters = descriptors.len(),
        parallel = options.parallel,
        "Starting run"
    );

    let mut outcomes: Vec<(usize, ClusterOutcome)> = if options.parallel {
        let mut pending: FuturesUnordered<_> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| async move {
                (index, run_one(controller, action, descriptor, options).await)
            })
            .collect();

        let mut finished = Vec::new();
        while let Some(done) = pending.next().await {
            finished.push(done);
        }
        finished
    } else {
        let mut finished = Vec::new();
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            finished.push((index, run_one(controller, action, descriptor, options).await));
        }
        finished
    };

    outcomes.sort_by_key(|(index, _)| *index);
    RunSummary {
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    }
}

async fn run_one<T, A, E>(
    controller: &ClusterLifecycleController<'_, T, A, E>,
    action: Action,
    mut descriptor: ClusterDescriptor,
    options: &RunOptions,
) -> ClusterOutcome
where
    T: ClusterTool,
    A: ClusterApi,
    E: ProvisioningEngine,
{
    let started = Instant::now();
    let result = execute(controller, action, &mut descriptor, options).await;

    match &result {
        Ok(details) => info!(cluster = %descriptor.name, action = %action, details = %details, "Cluster finished"),
        Err(e) => error!(
            cluster = %descriptor.name,
            action = %action,
            error = %e,
            retryable = e.is_retryable(),
            "Cluster failed"
        ),
    }

    ClusterOutcome {
        name: descriptor.name,
        platform: descriptor.platform,
        action,
        result,
        elapsed: started.elapsed(),
    }
}

async fn execute<T, A, E>(
    controller: &ClusterLifecycleController<'_, T, A, E>,
    action: Action,
    descriptor: &mut ClusterDescriptor,
    options: &RunOptions,
) -> Result<String, LifecycleError>
where
    T: ClusterTool,
    A: ClusterApi,
    E: ProvisioningEngine,
{
    // Held for the whole operation; other GCP clusters wait for the slot
    let _credentials = match descriptor.cloud {
        CloudProvider::Gcp => Some(acquire_gcp_credentials(descriptor, options).await?),
        CloudProvider::Aws => None,
    };

    descriptor
        .prepare_install_dir()
        .map_err(|e| LifecycleError::Input(format!("{}: {e:#}", descriptor.name)))?;

    match action {
        Action::Create => {
            let outcome = controller.create(descriptor).await?;
            Ok(format!(
                "version {}, kubeconfig {}",
                outcome.version.as_deref().unwrap_or("unknown"),
                outcome.kubeconfig.display()
            ))
        }
        Action::Destroy => {
            let outcome = controller.destroy(descriptor).await?;
            let failed = outcome.cleanup.len() - outcome.cleanup.succeeded();
            Ok(if failed == 0 {
                format!("{} leftover command(s) run", outcome.cleanup.len())
            } else {
                format!(
                    "{} leftover command(s) run, {failed} failed",
                    outcome.cleanup.len()
                )
            })
        }
    }
}

async fn acquire_gcp_credentials(
    descriptor: &ClusterDescriptor,
    options: &RunOptions,
) -> Result<ScopedCredentialFile, LifecycleError> {
    let source = options.gcp_service_account.as_deref().ok_or_else(|| {
        LifecycleError::Input(format!(
            "{}: GCP clusters need --gcp-service-account-file",
            descriptor.name
        ))
    })?;
    let target = options
        .credential_target
        .clone()
        .or_else(ScopedCredentialFile::default_target)
        .ok_or_else(|| LifecycleError::Input("Cannot determine home directory".to_string()))?;

    let guard = ScopedCredentialFile::acquire(&target, source)
        .await
        .map_err(|e| LifecycleError::Input(format!("{}: {e:#}", descriptor.name)))?;
    debug!(path = %guard.path().display(), "Installed GCP service account");
    Ok(guard)
}

/// Error text for the summary table, with rollback failures and a hint
fn failure_details(e: &LifecycleError) -> String {
    let mut details = e.to_string();
    if let LifecycleError::RolledBack {
        rollback_failures, ..
    } = e
    {
        details.push_str(&format!(": {}", e.root_cause()));
        for failure in rollback_failures {
            details.push_str(&format!("\nrollback: {failure}"));
        }
    }
    if e.is_retryable() {
        details.push_str("\n(retryable)");
    }
    if let Some(hint) = e.suggestion() {
        details.push_str(&format!("\nhint: {hint}"));
    }
    details
}

/// Resolve the version and build the creation command without running anything
pub fn plan_creation(
    catalog: &VersionCatalog,
    descriptor: &mut ClusterDescriptor,
) -> Result<ToolCommand, LifecycleError> {
    let requested = descriptor.version.clone().ok_or_else(|| {
        LifecycleError::Input(format!("{}: no version requested", descriptor.name))
    })?;
    descriptor.artifact = Some(catalog.resolve(&requested, &descriptor.stream)?);
    Ok(creation_command(descriptor))
}
