//! The `rosa` CLI as creation/deletion tool

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use super::session::{OCM_CONFIG_ENV, SessionStore};
use super::{AuthContext, ClusterTool, ToolCommand, ToolOutput};
use crate::process::{CommandConfig, CommandSpec, run_command};
use crate::versions::{CatalogKind, VersionCatalog};

#[derive(Debug, Clone)]
pub struct RosaCli {
    binary: PathBuf,
    sessions: SessionStore,
    config: CommandConfig,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    raw_id: String,
}

#[derive(Debug, Deserialize)]
struct OidcConfigEntry {
    id: String,
    #[serde(default)]
    secret_arn: String,
}

impl RosaCli {
    pub fn new(binary: impl Into<PathBuf>, sessions: SessionStore) -> Self {
        Self {
            binary: binary.into(),
            sessions,
            config: CommandConfig::for_mutation(),
        }
    }
}

/// Run `command` and fail on a non-zero exit
pub async fn execute_checked<T: ClusterTool>(
    tool: &T,
    command: &ToolCommand,
    auth: &AuthContext,
    region: &str,
) -> anyhow::Result<ToolOutput> {
    let what = format!("rosa {command}");
    tool.execute(command, auth, region).await?.into_success(&what)
}

/// Versions offered in `channel_group`
pub async fn list_versions<T: ClusterTool>(
    tool: &T,
    channel_group: &str,
    auth: &AuthContext,
    region: &str,
) -> anyhow::Result<Vec<String>> {
    let command = ToolCommand::new([
        "list".to_string(),
        "versions".to_string(),
        format!("--channel-group={channel_group}"),
        "--output=json".to_string(),
    ]);
    let output = execute_checked(tool, &command, auth, region).await?;
    parse_versions(&output.stdout)
        .with_context(|| format!("Failed to parse versions for channel group {channel_group}"))
}

/// Build a channel-group catalog covering `channel_groups`
pub async fn version_catalog<T: ClusterTool>(
    tool: &T,
    channel_groups: &[String],
    auth: &AuthContext,
    region: &str,
) -> anyhow::Result<VersionCatalog> {
    let mut catalog = VersionCatalog::new(CatalogKind::ChannelGroups);
    for group in channel_groups {
        let versions = list_versions(tool, group, auth, region).await?;
        debug!(channel_group = %group, count = versions.len(), "Fetched versions");
        catalog = catalog.with_source(group.clone(), versions);
    }
    Ok(catalog)
}

/// Create an unmanaged OIDC config named after `prefix` and return its id
pub async fn create_oidc_config<T: ClusterTool>(
    tool: &T,
    prefix: &str,
    auth: &AuthContext,
    region: &str,
) -> anyhow::Result<String> {
    let create = ToolCommand::new([
        "create".to_string(),
        "oidc-config".to_string(),
        "--managed=false".to_string(),
        format!("--prefix={prefix}"),
        "--mode=auto".to_string(),
        "--yes".to_string(),
    ]);
    execute_checked(tool, &create, auth, region).await?;

    let list = ToolCommand::new([
        "list".to_string(),
        "oidc-config".to_string(),
        format!("--region={region}"),
        "--output=json".to_string(),
    ]);
    let output = execute_checked(tool, &list, auth, region).await?;
    let id = select_oidc_config_id(&output.stdout, prefix)?;
    info!(prefix = %prefix, oidc_config_id = %id, "Created OIDC config");
    Ok(id)
}

/// Delete the OIDC config `id`; the tool refuses while a cluster still uses it
pub async fn delete_oidc_config<T: ClusterTool>(
    tool: &T,
    id: &str,
    auth: &AuthContext,
    region: &str,
) -> anyhow::Result<()> {
    let delete = ToolCommand::new([
        "delete".to_string(),
        "oidc-config".to_string(),
        format!("--oidc-config-id={id}"),
        "--mode=auto".to_string(),
        "--yes".to_string(),
    ]);
    execute_checked(tool, &delete, auth, region).await?;
    info!(oidc_config_id = %id, "Deleted OIDC config");
    Ok(())
}

impl ClusterTool for RosaCli {
    async fn execute(
        &self,
        command: &ToolCommand,
        auth: &AuthContext,
        region: &str,
    ) -> anyhow::Result<ToolOutput> {
        let ocm_config = self.sessions.ensure_login(auth).await?;
        let spec = CommandSpec::new(&self.binary)
            .args(command.args().iter().cloned())
            .env("AWS_REGION", region)
            .env(OCM_CONFIG_ENV, ocm_config.display().to_string());
        run_command(&spec, &self.config).await
    }
}

fn parse_versions(json: &str) -> anyhow::Result<Vec<String>> {
    let entries: Vec<VersionEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(|e| e.raw_id).collect())
}

/// Pick the OIDC config whose secret name is `prefix` followed by a `-` suffix
fn select_oidc_config_id(json: &str, prefix: &str) -> anyhow::Result<String> {
    let entries: Vec<OidcConfigEntry> =
        serde_json::from_str(json).context("Failed to parse OIDC config list")?;
    let owned = format!("{prefix}-");
    entries
        .into_iter()
        .find(|entry| {
            let secret_name = entry.secret_arn.rsplit(':').next().unwrap_or_default();
            secret_name.starts_with(&owned)
        })
        .map(|entry| entry.id)
        .with_context(|| format!("No OIDC config found with prefix {prefix}"))
}
