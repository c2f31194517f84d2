//! Configuration types for the coordinator

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use forge_common::OcmEnvironment;

use crate::descriptor::{ClusterDescriptor, DescriptorContext, RawDescriptor};
use crate::error::LifecycleError;
use crate::orchestrator::{Action, RunOptions};
use crate::remote::AuthContext;

/// OCM credentials
#[derive(Clone, Default)]
pub struct OcmConfig {
    /// Offline token used for every login
    pub token: Option<String>,
    /// Environment for descriptors that don't set `ocm-env`
    pub environment: OcmEnvironment,
}

impl std::fmt::Debug for OcmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcmConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("environment", &self.environment)
            .finish()
    }
}

/// Filesystem inputs and outputs
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Base directory for per-cluster install data
    pub install_data_dir: PathBuf,
    /// Provisioning manifest template copied into each stack directory
    pub vpc_manifest: Option<PathBuf>,
    /// JSON version catalog; queried from the creation tool when absent
    pub versions_file: Option<PathBuf>,
    /// GCP service account installed for GCP clusters
    pub gcp_service_account_file: Option<PathBuf>,
    /// Records written by earlier creates (destroy only)
    pub cluster_data_files: Vec<PathBuf>,
}

/// External tool binaries
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub rosa: PathBuf,
    pub ocm: PathBuf,
    pub oc: PathBuf,
    pub terraform: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rosa: PathBuf::from("rosa"),
            ocm: PathBuf::from("ocm"),
            oc: PathBuf::from("oc"),
            terraform: PathBuf::from("terraform"),
        }
    }
}

/// Runtime behavior flags
#[derive(Debug, Clone, Default)]
pub struct RuntimeFlags {
    /// Drive clusters concurrently
    pub parallel: bool,
    /// Validate and print commands without invoking mutating tools
    pub dry_run: bool,
}

/// Configuration for a create or destroy run
///
/// Composed of focused sub-configs, built from CLI arguments.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub ocm: OcmConfig,
    pub paths: PathsConfig,
    pub tools: ToolsConfig,
    pub flags: RuntimeFlags,
    /// Raw descriptors from `--cluster` and `--clusters-file`
    pub clusters: Vec<RawDescriptor>,
}

impl RunConfig {
    pub fn descriptor_context(&self, action: Action) -> DescriptorContext {
        DescriptorContext {
            install_base: self.paths.install_data_dir.clone(),
            auth: AuthContext::new(
                self.ocm.token.clone().unwrap_or_default(),
                self.ocm.environment,
            ),
            require_version: action == Action::Create,
        }
    }

    /// Normalize every descriptor for `action`, including recorded ones on destroy.
    pub fn descriptors(&self, action: Action) -> anyhow::Result<Vec<ClusterDescriptor>> {
        let ctx = self.descriptor_context(action);
        let mut descriptors = self
            .clusters
            .iter()
            .map(|raw| ClusterDescriptor::from_raw(raw, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        if action == Action::Destroy {
            for path in &self.paths.cluster_data_files {
                descriptors.push(ClusterDescriptor::load(path, &ctx)?);
            }
        }

        if descriptors.is_empty() {
            return Err(LifecycleError::Input(
                "No clusters given; use --cluster or --clusters-file".to_string(),
            )
            .into());
        }

        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(LifecycleError::Input(format!(
                    "Cluster name '{}' is given more than once",
                    descriptor.name
                ))
                .into());
            }
        }
        Ok(descriptors)
    }

    /// Token required for anything that talks to OCM
    pub fn require_token(&self) -> anyhow::Result<&str> {
        self.ocm
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("An OCM token is required (--ocm-token or OCM_TOKEN)")
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            parallel: self.flags.parallel,
            gcp_service_account: self.paths.gcp_service_account_file.clone(),
            credential_target: None,
        }
    }
}

/// Keys whose values are dotted version strings. YAML reads an unquoted
/// `4.10` as the float 4.1, so these must be quoted.
const VERSION_KEYS: &[&str] = &["version"];

/// Load a YAML list of cluster descriptors; scalar values are stringified
pub fn load_clusters_file(path: &Path) -> anyhow::Result<Vec<RawDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read clusters file {}", path.display()))?;
    let entries: Vec<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse clusters file {}", path.display()))?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .into_iter()
                .map(|(key, value)| {
                    if value.is_number() && VERSION_KEYS.contains(&key.as_str()) {
                        return Err(anyhow::Error::new(LifecycleError::Input(format!(
                            "cluster #{index}: '{key}' must be quoted (e.g. {key}: '4.10'); \
                             an unquoted number drops trailing zeros"
                        ))));
                    }
                    let value = scalar_to_string(&value).with_context(|| {
                        format!("Cluster #{index}: '{key}' must be a scalar value")
                    })?;
                    Ok((key, value))
                })
                .collect()
        })
        .collect()
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_cluster_arg;

    fn config(clusters: Vec<RawDescriptor>) -> RunConfig {
        RunConfig {
            ocm: OcmConfig {
                token: Some("token".to_string()),
                environment: OcmEnvironment::Stage,
            },
            paths: PathsConfig {
                install_data_dir: PathBuf::from("/data"),
                vpc_manifest: None,
                versions_file: None,
                gcp_service_account_file: None,
                cluster_data_files: Vec::new(),
            },
            tools: ToolsConfig::default(),
            flags: RuntimeFlags::default(),
            clusters,
        }
    }

    #[test]
    fn test_load_clusters_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.yaml");
        std::fs::write(
            &path,
            "- name: c1\n  platform: hypershift\n  region: us-east-2\n  version: '4.14'\n  replicas: 3\n\
             - name: c2\n  platform: rosa\n  region: us-east-1\n  version: '4.15'\n  multi-az: true\n",
        )
        .unwrap();

        let clusters = load_clusters_file(&path).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0]["version"], "4.14");
        assert_eq!(clusters[0]["replicas"], "3");
        assert_eq!(clusters[1]["multi-az"], "true");
    }

    #[test]
    fn test_unquoted_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.yaml");

        for version in ["4.10", "4.20", "4.14"] {
            std::fs::write(&path, format!("- name: c1\n  region: us-east-1\n  version: {version}\n"))
                .unwrap();
            let err = load_clusters_file(&path).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<LifecycleError>(), Some(LifecycleError::Input(_))),
                "{version}: {err:#}"
            );
            assert!(err.to_string().contains("must be quoted"));
        }

        std::fs::write(&path, "- name: c1\n  region: us-east-1\n  version: '4.10'\n").unwrap();
        let clusters = load_clusters_file(&path).unwrap();
        assert_eq!(clusters[0]["version"], "4.10");
    }

    #[test]
    fn test_clusters_file_rejects_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.yaml");
        std::fs::write(&path, "- name: c1\n  tags: [a, b]\n").unwrap();
        assert!(load_clusters_file(&path).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let raw = parse_cluster_arg("name=c1;platform=rosa;region=us-east-1;version=4.14").unwrap();
        let cfg = config(vec![raw.clone(), raw]);
        assert!(cfg.descriptors(Action::Create).is_err());
    }

    #[test]
    fn test_no_clusters_rejected() {
        assert!(config(Vec::new()).descriptors(Action::Create).is_err());
    }

    #[test]
    fn test_destroy_does_not_require_version() {
        let raw = parse_cluster_arg("name=c1;platform=rosa;region=us-east-1").unwrap();
        let cfg = config(vec![raw]);
        assert!(cfg.descriptors(Action::Create).is_err());
        assert_eq!(cfg.descriptors(Action::Destroy).unwrap().len(), 1);
    }

    #[test]
    fn test_require_token() {
        let mut cfg = config(Vec::new());
        assert_eq!(cfg.require_token().unwrap(), "token");
        cfg.ocm.token = Some(String::new());
        assert!(cfg.require_token().is_err());
    }

    #[test]
    fn test_ocm_config_debug_redacts_token() {
        let debug = format!("{:?}", config(Vec::new()).ocm);
        assert!(!debug.contains("\"token\""));
        assert!(debug.contains("redacted"));
    }
}
