//! Network prerequisites for hosted-control-plane clusters
//!
//! An [`InfrastructureStack`] wraps an idempotent apply/destroy engine.
//! The one invariant that matters: a failed apply never leaves a partially
//! applied stack behind. When the cleanup destroy itself fails the stack stays
//! claimed in [`StackRegistry`] as [`StackState::Unknown`] so a later destroy
//! retries it.

pub mod terraform;
pub mod zones;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use forge_common::defaults::STACK_DIR_NAME;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::error::LifecycleError;

pub use terraform::TerraformEngine;
pub use zones::availability_zones;

/// Input variables handed to the provisioning engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackVariables {
    pub aws_region: String,
    pub az_ids: Vec<String>,
    pub cluster_name: String,
}

/// Outputs reported by the engine after a successful apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackOutputs(pub BTreeMap<String, serde_json::Value>);

impl StackOutputs {
    /// Subnet ids as the comma-separated form the creation tool expects
    pub fn subnet_ids(&self) -> Option<String> {
        match self.0.get("subnet_ids")? {
            serde_json::Value::Array(ids) => {
                let ids: Vec<&str> = ids.iter().filter_map(serde_json::Value::as_str).collect();
                (!ids.is_empty()).then(|| ids.join(","))
            }
            serde_json::Value::String(ids) if !ids.is_empty() => Some(ids.clone()),
            _ => None,
        }
    }
}

/// Declarative provisioning engine treated as an idempotent black box.
#[allow(async_fn_in_trait)]
pub trait ProvisioningEngine {
    /// Prepare `working_dir` for apply/destroy with `vars`
    async fn init(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()>;

    /// Create or converge the stack
    async fn apply(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<StackOutputs>;

    /// Remove everything the stack manages; safe against partial applies
    async fn destroy(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()>;
}

/// Where a stack is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StackState {
    NotApplied,
    Applied,
    Destroyed,
    /// Attached to a stack left by an earlier process; may or may not exist
    Unknown,
}

/// Process-wide record of live stacks, at most one per cluster name.
#[derive(Debug, Clone, Default)]
pub struct StackRegistry {
    live: Arc<Mutex<HashSet<String>>>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the live slot for `cluster`; false if already taken
    pub fn claim(&self, cluster: &str) -> bool {
        self.live.lock().unwrap().insert(cluster.to_string())
    }

    pub fn release(&self, cluster: &str) {
        self.live.lock().unwrap().remove(cluster);
    }

    pub fn is_live(&self, cluster: &str) -> bool {
        self.live.lock().unwrap().contains(cluster)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

/// Network prerequisite resources for one cluster
#[derive(Debug)]
pub struct InfrastructureStack {
    cluster_name: String,
    working_dir: PathBuf,
    variables: StackVariables,
    state: StackState,
    outputs: StackOutputs,
    registry: StackRegistry,
}

impl InfrastructureStack {
    /// A fresh stack for a cluster about to be created.
    ///
    /// The region is validated here, before any engine call.
    pub fn new(
        cluster_name: &str,
        region: &str,
        install_dir: &Path,
        registry: StackRegistry,
    ) -> Result<Self, LifecycleError> {
        Self::with_state(cluster_name, region, install_dir, registry, StackState::NotApplied)
    }

    /// A handle on a stack an earlier run may have applied (destroy path)
    pub fn attach(
        cluster_name: &str,
        region: &str,
        install_dir: &Path,
        registry: StackRegistry,
    ) -> Result<Self, LifecycleError> {
        Self::with_state(cluster_name, region, install_dir, registry, StackState::Unknown)
    }

    fn with_state(
        cluster_name: &str,
        region: &str,
        install_dir: &Path,
        registry: StackRegistry,
        state: StackState,
    ) -> Result<Self, LifecycleError> {
        let az_ids = availability_zones(region)?.to_vec();
        Ok(Self {
            cluster_name: cluster_name.to_string(),
            working_dir: install_dir.join(STACK_DIR_NAME),
            variables: StackVariables {
                aws_region: region.to_string(),
                az_ids,
                cluster_name: cluster_name.to_string(),
            },
            state,
            outputs: StackOutputs::default(),
            registry,
        })
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn variables(&self) -> &StackVariables {
        &self.variables
    }

    pub fn outputs(&self) -> &StackOutputs {
        &self.outputs
    }

    /// Check if the stack may hold live resources
    pub fn may_hold_resources(&self) -> bool {
        matches!(self.state, StackState::Applied | StackState::Unknown)
    }

    /// Copy the manifest template into the working directory
    pub fn install_manifest(&self, template: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.working_dir).with_context(|| {
            format!("Failed to create stack directory {}", self.working_dir.display())
        })?;
        let file_name = template
            .file_name()
            .with_context(|| format!("Manifest path {} has no file name", template.display()))?;
        let target = self.working_dir.join(file_name);
        std::fs::copy(template, &target).with_context(|| {
            format!("Failed to copy manifest {} to {}", template.display(), target.display())
        })?;
        debug!(manifest = %target.display(), "Installed stack manifest");
        Ok(())
    }

    /// Apply the stack; on any engine failure destroy what was created and
    /// return the original failure.
    #[instrument(skip_all, fields(cluster = %self.cluster_name))]
    pub async fn apply<E: ProvisioningEngine>(
        &mut self,
        engine: &E,
    ) -> Result<&StackOutputs, LifecycleError> {
        if self.state == StackState::Applied {
            debug!("Stack already applied");
            return Ok(&self.outputs);
        }

        std::fs::create_dir_all(&self.working_dir)
            .with_context(|| format!("Failed to create {}", self.working_dir.display()))
            .map_err(|source| self.provisioning_failed(source))?;

        if !self.registry.claim(&self.cluster_name) {
            return Err(self.provisioning_failed(anyhow::anyhow!(
                "a live stack already exists for this cluster"
            )));
        }

        if let Err(e) = engine.init(&self.working_dir, &self.variables).await {
            error!(error = ?e, "Stack init failed");
            self.registry.release(&self.cluster_name);
            return Err(self.provisioning_failed(e));
        }

        info!(zones = ?self.variables.az_ids, "Applying infrastructure stack");
        match engine.apply(&self.working_dir, &self.variables).await {
            Ok(outputs) => {
                self.outputs = outputs;
                self.state = StackState::Applied;
                info!("Infrastructure stack applied");
                Ok(&self.outputs)
            }
            Err(e) => {
                error!(error = ?e, "Stack apply failed, destroying partial stack");
                if let Err(destroy_err) = engine.destroy(&self.working_dir, &self.variables).await {
                    error!(
                        error = ?destroy_err,
                        live_stacks = self.registry.live_count(),
                        "Destroying partial stack failed, stack left for rollback"
                    );
                    self.state = StackState::Unknown;
                    return Err(self.provisioning_failed(e.context(format!(
                        "partial stack destroy also failed: {destroy_err:#}"
                    ))));
                }
                self.state = StackState::Destroyed;
                self.registry.release(&self.cluster_name);
                Err(self.provisioning_failed(e))
            }
        }
    }

    /// Destroy the stack. A never-applied or already-destroyed stack is a no-op.
    #[instrument(skip_all, fields(cluster = %self.cluster_name))]
    pub async fn destroy<E: ProvisioningEngine>(&mut self, engine: &E) -> Result<(), LifecycleError> {
        if !self.may_hold_resources() {
            debug!(state = %self.state, "Nothing to destroy");
            return Ok(());
        }
        match self.state {
            StackState::Unknown => {
                engine
                    .init(&self.working_dir, &self.variables)
                    .await
                    .map_err(|e| self.destroy_failed(&e))?;
            }
            _ => {}
        }

        info!("Destroying infrastructure stack");
        engine
            .destroy(&self.working_dir, &self.variables)
            .await
            .map_err(|e| self.destroy_failed(&e))?;

        self.state = StackState::Destroyed;
        self.registry.release(&self.cluster_name);
        info!(live_stacks = self.registry.live_count(), "Infrastructure stack destroyed");
        Ok(())
    }

    fn provisioning_failed(&self, source: anyhow::Error) -> LifecycleError {
        LifecycleError::Provisioning {
            cluster: self.cluster_name.clone(),
            source,
        }
    }

    fn destroy_failed(&self, e: &anyhow::Error) -> LifecycleError {
        LifecycleError::Deletion {
            cluster: self.cluster_name.clone(),
            message: format!("infrastructure stack destroy failed: {e:#}"),
        }
    }
}
