//! Lifecycle error taxonomy
//!
//! Typed errors for the orchestrator. Collaborators report `anyhow` errors;
//! they are classified into these variants at the controller boundary.

use std::time::Duration;

use thiserror::Error;

use crate::orchestrator::state::LifecycleState;

/// Errors raised while driving a cluster lifecycle
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed descriptor input (region, version, platform extras)
    #[error("Invalid input: {0}")]
    Input(String),

    /// No catalog entry contains the requested version
    #[error("Cluster version {version} not found for stream {stream}")]
    VersionNotFound { version: String, stream: String },

    /// The provisioning engine failed; the partial stack was torn down if possible
    #[error("Provisioning infrastructure for {cluster} failed")]
    Provisioning {
        cluster: String,
        #[source]
        source: anyhow::Error,
    },

    /// The creation tool failed or the cluster never became usable
    #[error("Creating cluster {cluster} failed: {message}")]
    Creation { cluster: String, message: String },

    /// The deletion tool failed
    #[error("Deleting cluster {cluster} failed: {message}")]
    Deletion { cluster: String, message: String },

    /// A bounded wait ran out of time
    #[error("Timeout waiting for {what} after {budget:?}")]
    Timeout { what: String, budget: Duration },

    /// A wait was interrupted by the caller
    #[error("Wait for {what} cancelled")]
    Cancelled { what: String },

    /// A single leftover-cleanup command failed (reported, never escalated)
    #[error("Cleanup command '{command}' failed: {message}")]
    Cleanup { command: String, message: String },

    /// A remote query failed outright while waiting
    #[error("Remote check for {what} failed")]
    Remote {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    /// A create failed and rollback ran; `cause` is the original failure
    #[error("Cluster {cluster} rolled back after failure in state {state}")]
    RolledBack {
        cluster: String,
        state: LifecycleState,
        #[source]
        cause: Box<LifecycleError>,
        rollback_failures: Vec<String>,
    },
}

impl LifecycleError {
    /// Classify a collaborator error raised while waiting on `what`.
    ///
    /// A tokio `Elapsed` or a nested `Timeout` anywhere in the chain is a
    /// timeout; anything else is a remote failure.
    pub fn remote(what: impl Into<String>, budget: Duration, error: anyhow::Error) -> Self {
        let what = what.into();
        let timed_out = error.chain().any(|cause| {
            cause.downcast_ref::<tokio::time::error::Elapsed>().is_some()
                || matches!(cause.downcast_ref::<LifecycleError>(), Some(Self::Timeout { .. }))
        });
        if timed_out {
            return Self::Timeout { what, budget };
        }
        Self::Remote {
            what,
            source: error,
        }
    }

    /// The first lifecycle error anywhere in `error`'s chain
    pub fn find_in(error: &anyhow::Error) -> Option<&LifecycleError> {
        error.chain().find_map(|cause| cause.downcast_ref::<LifecycleError>())
    }

    /// The failure that started the run's rollback, or `self`
    pub fn root_cause(&self) -> &LifecycleError {
        match self {
            Self::RolledBack { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Check if this is a timeout (directly or as the cause of a rollback)
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }

    /// Check if this error aborts the lifecycle operation
    ///
    /// Cleanup failures are contained and reported; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cleanup { .. })
    }

    /// Check if this failure, raised on the create path, requires rollback
    ///
    /// Input and catalog errors happen before anything remote exists.
    pub fn triggers_rollback(&self) -> bool {
        !matches!(
            self,
            Self::Input(_) | Self::VersionNotFound { .. } | Self::Cleanup { .. } | Self::RolledBack { .. }
        )
    }

    /// Check if retrying the whole operation later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Timeout { .. } | Self::Remote { .. } | Self::Cancelled { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.root_cause() {
            Self::VersionNotFound { .. } => {
                Some("Check the channel group / stream, or request a shorter x.y version.")
            }
            Self::Timeout { .. } => Some("Increase the cluster 'timeout' in the descriptor."),
            Self::Input(_) => Some("Fix the --cluster descriptor and retry."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classifies_elapsed_as_timeout() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let _guard = rt.enter();
        let elapsed = rt
            .block_on(tokio::time::timeout(
                Duration::from_millis(1),
                std::future::pending::<()>(),
            ))
            .unwrap_err();

        let err = anyhow::Error::new(elapsed).context("waiting for ready");
        let classified = LifecycleError::remote("cluster ready", Duration::from_secs(60), err);
        assert!(matches!(classified, LifecycleError::Timeout { .. }));
    }

    #[test]
    fn test_remote_classifies_nested_timeout() {
        let inner = LifecycleError::Timeout {
            what: "cluster state ready".to_string(),
            budget: Duration::from_secs(60),
        };
        let err = anyhow::Error::new(inner).context("ocm poll");
        let classified = LifecycleError::remote("cluster ready", Duration::from_secs(60), err);
        assert!(classified.is_timeout());
    }

    #[test]
    fn test_remote_keeps_other_errors() {
        let err = anyhow::anyhow!("connection refused");
        let classified = LifecycleError::remote("cluster ready", Duration::from_secs(60), err);
        assert!(matches!(classified, LifecycleError::Remote { .. }));
        assert!(!classified.is_timeout());
    }

    #[test]
    fn test_root_cause_unwraps_rollback() {
        let err = LifecycleError::RolledBack {
            cluster: "c1".to_string(),
            state: LifecycleState::CreationRequested,
            cause: Box::new(LifecycleError::Timeout {
                what: "cluster c1 ready".to_string(),
                budget: Duration::from_secs(1800),
            }),
            rollback_failures: Vec::new(),
        };
        assert!(err.is_timeout());
        assert!(matches!(err.root_cause(), LifecycleError::Timeout { .. }));
        assert!(err.to_string().contains("creation-requested"));
    }

    #[test]
    fn test_cleanup_is_not_fatal() {
        let err = LifecycleError::Cleanup {
            command: "delete oidc-provider --cluster=c1".to_string(),
            message: "exit status 1".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(LifecycleError::Input("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_rollback_classification() {
        assert!(!LifecycleError::Input("bad region".to_string()).triggers_rollback());
        assert!(
            !LifecycleError::VersionNotFound {
                version: "4.99".to_string(),
                stream: "stable".to_string(),
            }
            .triggers_rollback()
        );
        let timeout = LifecycleError::Timeout {
            what: "cluster ready".to_string(),
            budget: Duration::from_secs(60),
        };
        assert!(timeout.triggers_rollback());
        assert!(timeout.is_retryable());
        assert!(
            LifecycleError::Creation {
                cluster: "c".to_string(),
                message: "quota".to_string()
            }
            .triggers_rollback()
        );
        assert!(!LifecycleError::Input("x".to_string()).is_retryable());
    }

    #[test]
    fn test_find_in_context_chain() {
        let err = anyhow::Error::new(LifecycleError::Input("region 'moon' unknown".to_string()))
            .context("Failed to load cluster descriptors");
        let found = LifecycleError::find_in(&err).unwrap();
        assert!(matches!(found, LifecycleError::Input(_)));
        assert_eq!(found.suggestion(), Some("Fix the --cluster descriptor and retry."));

        assert!(LifecycleError::find_in(&anyhow::anyhow!("2 cluster(s) failed")).is_none());
    }

    #[test]
    fn test_suggestions() {
        let err = LifecycleError::VersionNotFound {
            version: "4.99".to_string(),
            stream: "stable".to_string(),
        };
        assert!(err.suggestion().is_some());
        assert!(
            LifecycleError::Deletion {
                cluster: "c".to_string(),
                message: "m".to_string()
            }
            .suggestion()
            .is_none()
        );
    }
}
