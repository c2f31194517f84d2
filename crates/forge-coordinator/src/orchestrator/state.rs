//! Lifecycle states of a single cluster operation
//!
//! States are never persisted; each run starts from `Pending` (create) or
//! `DestroyRequested` (destroy).

/// State of one cluster across a create or destroy run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleState {
    /// Nothing resolved or created yet
    #[default]
    Pending,
    /// Requested version resolved to a concrete artifact
    VersionResolved,
    /// Network prerequisites exist (or are not needed for the platform)
    InfrastructureReady,
    /// The creation tool accepted the cluster
    CreationRequested,
    /// Cluster is ready and verified (success terminal)
    Ready,
    /// Undoing whatever a failed create left behind
    RollingBack,
    /// Explicit teardown in progress
    DestroyRequested,
    /// Everything torn down (failure or teardown terminal)
    Destroyed,
}

impl LifecycleState {
    /// Check if the state ends a lifecycle operation
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Destroyed)
    }

    /// Next state on the create path, `None` once `Ready`
    pub fn next_create_state(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::VersionResolved),
            Self::VersionResolved => Some(Self::InfrastructureReady),
            Self::InfrastructureReady => Some(Self::CreationRequested),
            Self::CreationRequested => Some(Self::Ready),
            _ => None,
        }
    }
}
