//! Resources created during a cluster lifecycle and their rollback order
//!
//! Provides a consistent teardown order for rollback and explicit destroy.
//! Resources must be removed in dependency order to avoid failures.

/// Types of remote resources a create can leave behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceKind {
    /// Cluster object registered by the creation tool
    Cluster,
    /// Network prerequisites applied by the provisioning engine
    InfrastructureStack,
    /// Unmanaged OIDC config created for a hosted control plane
    OidcConfig,
}

impl ResourceKind {
    /// Get teardown priority (lower number = torn down first)
    ///
    /// - 0: Delete the cluster object (its machines live in the stack's subnets)
    /// - 1: Destroy the infrastructure stack
    /// - 2: Delete the OIDC config, which the tool refuses while a cluster uses it
    pub fn teardown_priority(self) -> u8 {
        match self {
            ResourceKind::Cluster => 0,
            ResourceKind::InfrastructureStack => 1,
            ResourceKind::OidcConfig => 2,
        }
    }
}
