//! Entry point wiring the process-backed collaborators into a run

use std::collections::BTreeSet;

use anyhow::Context;
use forge_common::defaults::STACK_DIR_NAME;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    Action, ClusterLifecycleController, LogReporter, RunSummary, deletion_command, plan_creation,
    run_clusters,
};
use crate::config::RunConfig;
use crate::descriptor::ClusterDescriptor;
use crate::infra::TerraformEngine;
use crate::remote::{OcmClusterApi, RosaCli, SessionStore, rosa};
use crate::versions::VersionCatalog;

/// Run `action` for every cluster in `config`.
///
/// Returns `Ok(None)` for a dry run, otherwise the per-cluster summary.
pub async fn run_from_config(
    config: RunConfig,
    action: Action,
    cancel: CancellationToken,
) -> anyhow::Result<Option<RunSummary>> {
    let descriptors = config.descriptors(action)?;

    let needs_remote_catalog = action == Action::Create && config.paths.versions_file.is_none();
    if !config.flags.dry_run || needs_remote_catalog {
        config.require_token()?;
    }

    let session_dir = std::env::temp_dir().join(format!("cluster-forge-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create {}", session_dir.display()))?;
    let sessions = SessionStore::new(&config.tools.ocm, &session_dir);

    let result = run_with_sessions(&config, action, descriptors, sessions, cancel).await;

    if let Err(e) = std::fs::remove_dir_all(&session_dir) {
        warn!(path = %session_dir.display(), error = %e, "Failed to remove OCM session directory");
    }

    result
}

async fn run_with_sessions(
    config: &RunConfig,
    action: Action,
    mut descriptors: Vec<ClusterDescriptor>,
    sessions: SessionStore,
    cancel: CancellationToken,
) -> anyhow::Result<Option<RunSummary>> {
    let tool = RosaCli::new(&config.tools.rosa, sessions.clone());
    let api = OcmClusterApi::new(&config.tools.ocm, &config.tools.oc, sessions);
    let engine = TerraformEngine::new(&config.tools.terraform);
    let reporter = LogReporter::new();

    let catalog = match action {
        Action::Create => load_catalog(config, &tool, &descriptors).await?,
        Action::Destroy => VersionCatalog::default(),
    };

    if config.flags.dry_run {
        print_plan(&catalog, action, &mut descriptors)?;
        return Ok(None);
    }

    let controller = ClusterLifecycleController::new(&tool, &api, &engine, &catalog, &reporter)
        .with_manifest(config.paths.vpc_manifest.clone())
        .with_cancellation(cancel);

    Ok(Some(
        run_clusters(&controller, action, descriptors, &config.run_options()).await,
    ))
}

/// Version catalog from `--versions-file`, or queried per channel group
async fn load_catalog(
    config: &RunConfig,
    tool: &RosaCli,
    descriptors: &[ClusterDescriptor],
) -> anyhow::Result<VersionCatalog> {
    if let Some(path) = &config.paths.versions_file {
        info!(path = %path.display(), "Loading version catalog");
        return VersionCatalog::load_json(path);
    }

    let Some(first) = descriptors.first() else {
        return Ok(VersionCatalog::default());
    };
    let groups: Vec<String> = descriptors
        .iter()
        .map(|d| d.stream.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    info!(channel_groups = ?groups, "Querying available versions");
    rosa::version_catalog(tool, &groups, &first.auth, &first.region).await
}

/// Print what a run would do without invoking any mutating tool
fn print_plan(
    catalog: &VersionCatalog,
    action: Action,
    descriptors: &mut [ClusterDescriptor],
) -> anyhow::Result<()> {
    for descriptor in descriptors.iter_mut() {
        let command = match action {
            Action::Create => plan_creation(catalog, descriptor)?,
            Action::Destroy => deletion_command(descriptor),
        };
        println!("{}: rosa {command}", descriptor.name);
        if descriptor.platform.needs_infrastructure() {
            println!(
                "{}: infrastructure stack in {}",
                descriptor.name,
                descriptor.install_dir.join(STACK_DIR_NAME).display()
            );
        }
    }
    Ok(())
}
