//! Cluster objects through the `ocm` CLI
//!
//! The clusters_mgmt API is reached with `ocm get <path>`, which handles
//! token refresh using the session file from [`SessionStore`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, warn};

use super::oc::OcWorkloadClient;
use super::session::{OCM_CONFIG_ENV, SessionStore};
use super::{AuthContext, ClusterApi, ClusterHandle};
use crate::process::{CommandConfig, CommandSpec, run_command};
use crate::wait::TimeoutWatcher;

const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";

/// Cluster states the API reports as unrecoverable
const FAILED_STATES: &[&str] = &["error", "uninstalling"];

#[derive(Debug, Clone)]
pub struct OcmClusterApi {
    ocm_binary: PathBuf,
    oc_binary: PathBuf,
    sessions: SessionStore,
    poll_interval: Duration,
}

/// A cluster object in the clusters_mgmt API
#[derive(Debug, Clone)]
pub struct OcmCluster {
    id: String,
    name: String,
    ocm_binary: PathBuf,
    ocm_config: PathBuf,
    poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ClusterRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct ClusterList {
    #[serde(default)]
    items: Vec<ClusterRecord>,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    kubeconfig: String,
}

impl OcmClusterApi {
    pub fn new(
        ocm_binary: impl Into<PathBuf>,
        oc_binary: impl Into<PathBuf>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            ocm_binary: ocm_binary.into(),
            oc_binary: oc_binary.into(),
            sessions,
            poll_interval: Duration::from_secs(10),
        }
    }
}

async fn ocm_get(binary: &Path, ocm_config: &Path, args: &[String]) -> anyhow::Result<String> {
    let spec = CommandSpec::new(binary)
        .arg("get")
        .args(args.iter().cloned())
        .env(OCM_CONFIG_ENV, ocm_config.display().to_string());
    let output = run_command(&spec, &CommandConfig::for_query())
        .await?
        .into_success("ocm get")?;
    Ok(output.stdout)
}

async fn search_by_name(
    binary: &Path,
    ocm_config: &Path,
    name: &str,
) -> anyhow::Result<Vec<ClusterRecord>> {
    let args = vec![
        CLUSTERS_PATH.to_string(),
        "--parameter".to_string(),
        format!("search=name='{name}'"),
    ];
    let json = ocm_get(binary, ocm_config, &args).await?;
    parse_cluster_list(&json)
}

pub(crate) fn parse_cluster_list(json: &str) -> anyhow::Result<Vec<ClusterRecord>> {
    let list: ClusterList = serde_json::from_str(json).context("Failed to parse cluster list")?;
    Ok(list.items)
}

pub(crate) fn parse_kubeconfig(json: &str) -> anyhow::Result<Vec<u8>> {
    let credentials: Credentials =
        serde_json::from_str(json).context("Failed to parse cluster credentials")?;
    Ok(credentials.kubeconfig.into_bytes())
}

impl ClusterApi for OcmClusterApi {
    type Handle = OcmCluster;
    type Workload = OcWorkloadClient;

    async fn find(&self, name: &str, auth: &AuthContext) -> anyhow::Result<Option<OcmCluster>> {
        let ocm_config = self.sessions.ensure_login(auth).await?;
        let found = search_by_name(&self.ocm_binary, &ocm_config, name)
            .await?
            .into_iter()
            .find(|record| record.name == name);

        Ok(found.map(|record| {
            debug!(cluster = %name, id = %record.id, state = %record.state, "Found cluster object");
            OcmCluster {
                id: record.id,
                name: record.name,
                ocm_binary: self.ocm_binary.clone(),
                ocm_config,
                poll_interval: self.poll_interval,
            }
        }))
    }

    async fn workload_client(&self, kubeconfig: &Path) -> anyhow::Result<OcWorkloadClient> {
        if !kubeconfig.exists() {
            anyhow::bail!("Kubeconfig {} does not exist", kubeconfig.display());
        }
        Ok(OcWorkloadClient::new(&self.oc_binary, kubeconfig))
    }
}

impl OcmCluster {
    async fn state(&self) -> anyhow::Result<String> {
        let json = ocm_get(
            &self.ocm_binary,
            &self.ocm_config,
            &[format!("{CLUSTERS_PATH}/{}", self.id)],
        )
        .await?;
        let record: ClusterRecord =
            serde_json::from_str(&json).context("Failed to parse cluster object")?;
        Ok(record.state)
    }
}

impl ClusterHandle for OcmCluster {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let watcher = TimeoutWatcher::new(timeout).with_poll_interval(self.poll_interval);
        let what = format!("cluster {} ready", self.name);
        watcher
            .wait_for(&what, None, || async {
                let state = self.state().await?;
                debug!(cluster = %self.name, state = %state, "Cluster state");
                if FAILED_STATES.contains(&state.as_str()) {
                    anyhow::bail!("cluster {} entered state {state}", self.name);
                }
                Ok(state == "ready")
            })
            .await?;
        Ok(())
    }

    async fn wait_deleted(&self, timeout: Duration) -> anyhow::Result<()> {
        let watcher = TimeoutWatcher::new(timeout).with_poll_interval(self.poll_interval);
        let what = format!("cluster {} deleted", self.name);
        watcher
            .wait_for(&what, None, || async {
                let records = search_by_name(&self.ocm_binary, &self.ocm_config, &self.name).await;
                match records {
                    Ok(records) => Ok(!records.iter().any(|r| r.id == self.id)),
                    Err(e) => {
                        // The API briefly errors while the object is being removed
                        warn!(cluster = %self.name, error = %e, "Cluster lookup failed, retrying");
                        Ok(false)
                    }
                }
            })
            .await?;
        Ok(())
    }

    async fn credentials(&self) -> anyhow::Result<Vec<u8>> {
        let json = ocm_get(
            &self.ocm_binary,
            &self.ocm_config,
            &[format!("{CLUSTERS_PATH}/{}/credentials", self.id)],
        )
        .await?;
        parse_kubeconfig(&json)
    }
}
