//! Normalized per-cluster descriptors
//!
//! Raw descriptors are string maps (from `--cluster "k=v;..."`, a clusters
//! file, or a `cluster_data.yaml` record). [`ClusterDescriptor::from_raw`]
//! validates them and applies the platform invariants once, up front.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use forge_common::defaults::{
    CLUSTER_DATA_FILENAME, DEFAULT_CLUSTER_TIMEOUT, DEFAULT_MACHINE_CIDR, DEFAULT_STREAM,
    EXTERNAL_DNS_TAG,
};
use forge_common::{
    CloudProvider, OcmEnvironment, Platform, format_time_string, parse_time_string,
};
use tracing::debug;

use crate::error::LifecycleError;
use crate::infra::availability_zones;
use crate::remote::AuthContext;
use crate::versions::ResolvedVersion;

/// Raw descriptor as supplied by the user
pub type RawDescriptor = BTreeMap<String, String>;

/// Keys consumed into typed fields; everything else is a platform extra
const TYPED_KEYS: &[&str] = &[
    "name",
    "cluster-name",
    "platform",
    "cloud",
    "region",
    "version",
    "channel-group",
    "stream",
    "timeout",
    "ocm-env",
    "ocm-token",
    "install-dir",
    "oidc-config-id",
];

const HOSTED_CP_KEY: &str = "hosted-cp";

/// Upper bound for an `expiration-time` given in hours (ten years)
const MAX_EXPIRATION_HOURS: f64 = 24.0 * 365.0 * 10.0;

/// Inputs shared by every descriptor in a run
#[derive(Debug, Clone)]
pub struct DescriptorContext {
    pub install_base: PathBuf,
    pub auth: AuthContext,
    /// Create runs need a version; destroy runs do not
    pub require_version: bool,
}

/// One cluster, normalized and enriched as the lifecycle progresses
#[derive(Debug, Clone)]
pub struct ClusterDescriptor {
    pub name: String,
    pub platform: Platform,
    pub cloud: CloudProvider,
    pub region: String,
    /// Requested version as given (`4.14`, `4.14.3`)
    pub version: Option<String>,
    /// Channel group / release stream
    pub stream: String,
    pub timeout: Duration,
    pub install_dir: PathBuf,
    pub auth: AuthContext,
    /// Set once the version is resolved
    pub artifact: Option<ResolvedVersion>,
    pub oidc_config_id: Option<String>,
    /// Platform extras (`machine-cidr`, `tags`, `replicas`, `subnet-ids`, ...)
    pub parameters: BTreeMap<String, String>,
}

impl ClusterDescriptor {
    /// Validate a raw descriptor and apply the platform invariants.
    pub fn from_raw(raw: &RawDescriptor, ctx: &DescriptorContext) -> Result<Self, LifecycleError> {
        let get = |key: &str| raw.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| LifecycleError::Input(format!("Cluster descriptor is missing '{key}'")))
        };

        let name = get("name")
            .or_else(|| get("cluster-name"))
            .ok_or_else(|| LifecycleError::Input("Cluster descriptor is missing 'name'".to_string()))?
            .to_string();

        let platform: Platform = required("platform")?
            .parse()
            .map_err(|_| invalid(&name, "platform", raw.get("platform")))?;
        let cloud: CloudProvider = get("cloud")
            .map(str::parse::<CloudProvider>)
            .transpose()
            .map_err(|_| invalid(&name, "cloud", raw.get("cloud")))?
            .unwrap_or_default();
        let region = required("region")?.to_string();

        let version = get("version").map(str::to_string);
        if ctx.require_version && version.is_none() {
            return Err(LifecycleError::Input(format!(
                "{name}: cluster descriptor is missing 'version'"
            )));
        }

        let stream = get("channel-group")
            .or_else(|| get("stream"))
            .unwrap_or(DEFAULT_STREAM)
            .to_string();

        let timeout = parse_time_string(get("timeout").unwrap_or(DEFAULT_CLUSTER_TIMEOUT))
            .map_err(|e| LifecycleError::Input(format!("{name}: {e}")))?;

        let environment: OcmEnvironment = match get("ocm-env") {
            Some(env) => env.parse().map_err(|_| invalid(&name, "ocm-env", raw.get("ocm-env")))?,
            None => ctx.auth.environment,
        };
        let token = get("ocm-token").map_or_else(|| ctx.auth.token.clone(), str::to_string);

        let install_dir = get("install-dir").map_or_else(
            || ctx.install_base.join(platform.to_string()).join(&name),
            PathBuf::from,
        );

        let mut parameters: BTreeMap<String, String> = raw
            .iter()
            .filter(|(key, _)| !TYPED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .collect();

        match platform {
            Platform::HostedControlPlane => {
                availability_zones(&region)
                    .map_err(|e| LifecycleError::Input(format!("{name}: {e}")))?;
                apply_hosted_cp_extras(&mut parameters);
            }
            Platform::Standard => {
                if parameters.contains_key(HOSTED_CP_KEY) {
                    return Err(LifecycleError::Input(format!(
                        "{name}: '{HOSTED_CP_KEY}' is only valid for the hypershift platform"
                    )));
                }
            }
        }

        if let Some(expiration) = parameters.get_mut("expiration-time") {
            *expiration = expiration_timestamp(expiration, Utc::now())
                .map_err(|e| LifecycleError::Input(format!("{name}: {e}")))?;
        }

        let descriptor = Self {
            name,
            platform,
            cloud,
            region,
            version,
            stream,
            timeout,
            install_dir,
            auth: AuthContext::new(token, environment),
            artifact: None,
            oidc_config_id: get("oidc-config-id").map(str::to_string),
            parameters,
        };
        debug!(cluster = %descriptor.name, platform = %descriptor.platform, "Normalized descriptor");
        Ok(descriptor)
    }

    /// Version passed to the creation tool: the resolved one if known
    pub fn effective_version(&self) -> Option<&str> {
        self.artifact
            .as_ref()
            .map(|a| a.version.as_str())
            .or(self.version.as_deref())
    }

    /// Every descriptor field as flag-style key/values. The token is never included.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.parameters.clone();
        fields.insert("name".to_string(), self.name.clone());
        fields.insert("cluster-name".to_string(), self.name.clone());
        fields.insert("platform".to_string(), self.platform.to_string());
        fields.insert("region".to_string(), self.region.clone());
        fields.insert("channel-group".to_string(), self.stream.clone());
        fields.insert("timeout".to_string(), format_time_string(self.timeout));
        fields.insert("ocm-env".to_string(), self.auth.environment.to_string());
        fields.insert("install-dir".to_string(), self.install_dir.display().to_string());
        if let Some(version) = self.effective_version() {
            fields.insert("version".to_string(), version.to_string());
        }
        if let Some(id) = &self.oidc_config_id {
            fields.insert("oidc-config-id".to_string(), id.clone());
        }
        fields
    }

    pub fn auth_dir(&self) -> PathBuf {
        self.install_dir.join("auth")
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        self.auth_dir().join("kubeconfig")
    }

    pub fn record_path(&self) -> PathBuf {
        self.install_dir.join(CLUSTER_DATA_FILENAME)
    }

    /// Create `<install-dir>/auth`
    pub fn prepare_install_dir(&self) -> anyhow::Result<()> {
        let auth_dir = self.auth_dir();
        std::fs::create_dir_all(&auth_dir)
            .with_context(|| format!("Failed to create {}", auth_dir.display()))
    }

    /// Write the descriptor record to `<install-dir>/cluster_data.yaml`
    pub fn persist(&self) -> anyhow::Result<PathBuf> {
        let path = self.record_path();
        let mut record = self.fields();
        record.insert("cloud".to_string(), self.cloud.to_string());
        let content = serde_yaml::to_string(&record).context("Failed to serialize cluster data")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Rebuild a descriptor from a record written by [`persist`](Self::persist)
    pub fn load(path: &Path, ctx: &DescriptorContext) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: RawDescriptor = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self::from_raw(&raw, ctx)?)
    }
}

fn invalid(cluster: &str, key: &str, value: Option<&String>) -> LifecycleError {
    LifecycleError::Input(format!(
        "{cluster}: invalid {key} '{}'",
        value.map(String::as_str).unwrap_or_default()
    ))
}

fn apply_hosted_cp_extras(parameters: &mut BTreeMap<String, String>) {
    parameters.insert(HOSTED_CP_KEY.to_string(), "true".to_string());
    parameters
        .entry("machine-cidr".to_string())
        .or_insert_with(|| DEFAULT_MACHINE_CIDR.to_string());

    let tags = parameters.entry("tags".to_string()).or_default();
    if !tags.split(',').any(|tag| tag.trim() == EXTERNAL_DNS_TAG) {
        if !tags.is_empty() {
            tags.push(',');
        }
        tags.push_str(EXTERNAL_DNS_TAG);
    }
}

/// Hours from `now` as an RFC 3339 UTC timestamp; an existing timestamp is kept
fn expiration_timestamp(value: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
    if let Ok(hours) = value.parse::<f64>() {
        anyhow::ensure!(
            hours.is_finite() && hours > 0.0 && hours <= MAX_EXPIRATION_HOURS,
            "expiration-time must be a positive number of hours up to {MAX_EXPIRATION_HOURS}"
        );
        let expires = chrono::Duration::try_seconds((hours * 3600.0).round() as i64)
            .and_then(|offset| now.checked_add_signed(offset))
            .with_context(|| format!("expiration-time {hours}h is out of range"))?;
        return Ok(expires.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|_| value.to_string())
        .with_context(|| format!("expiration-time '{value}' is neither hours nor a timestamp"))
}

/// Parse `"name=c1;platform=hypershift;region=us-east-2"` into a raw descriptor
pub fn parse_cluster_arg(arg: &str) -> Result<RawDescriptor, LifecycleError> {
    arg.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    LifecycleError::Input(format!("Invalid cluster entry '{entry}', expected key=value"))
                })
        })
        .collect()
}
