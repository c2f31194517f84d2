//! Cluster platform, cloud provider and OCM environment
//!
//! Parsed from descriptor strings with `strum`; the aliases accept the names
//! used by existing cluster descriptor files.

use serde::{Deserialize, Serialize};

/// Cluster variant
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Control plane runs externally managed; the owner provisions network prerequisites
    #[strum(to_string = "hypershift", serialize = "hosted-cp")]
    HostedControlPlane,
    /// Installer-provisioned control plane and workers
    #[strum(to_string = "rosa", serialize = "standard")]
    Standard,
}

impl Platform {
    /// Whether the platform needs an infrastructure stack before creation
    pub fn needs_infrastructure(self) -> bool {
        matches!(self, Self::HostedControlPlane)
    }
}

/// Cloud the cluster runs on
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Aws,
    Gcp,
}

/// OCM environment the cluster is registered in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OcmEnvironment {
    Production,
    #[default]
    Stage,
}

impl OcmEnvironment {
    /// API URL passed to OCM tooling; `None` selects the tool's production default
    pub fn api_url(self) -> Option<String> {
        match self {
            Self::Production => None,
            Self::Stage => Some(format!("https://api.{self}.openshift.com")),
        }
    }
}
