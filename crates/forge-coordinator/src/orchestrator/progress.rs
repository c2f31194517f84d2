//! Progress reporting for lifecycle operations
//!
//! The controller reports every state transition and cleanup outcome
//! through [`LifecycleReporter`], so the same logic can drive logs or a
//! recording reporter in tests.

use forge_common::ResourceKind;
use tracing::{info, warn};

use super::state::LifecycleState;
use crate::error::LifecycleError;
use crate::leftovers::CleanupReport;

/// Trait for reporting lifecycle progress
pub trait LifecycleReporter: Send + Sync {
    /// Report a state change for `cluster`
    fn report_transition(&self, cluster: &str, from: LifecycleState, to: LifecycleState);

    /// Report the outcome of leftover-resource cleanup
    fn report_cleanup(&self, cluster: &str, report: &CleanupReport);

    /// Report one rollback step
    fn report_rollback_step(
        &self,
        cluster: &str,
        resource: ResourceKind,
        result: Result<(), &LifecycleError>,
    );
}

/// Progress reporter that logs through `tracing`
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for LogReporter {
    fn report_transition(&self, cluster: &str, from: LifecycleState, to: LifecycleState) {
        info!(
            cluster = %cluster,
            from = %from,
            to = %to,
            terminal = to.is_terminal(),
            "State transition"
        );
    }

    fn report_cleanup(&self, cluster: &str, report: &CleanupReport) {
        if report.is_empty() {
            return;
        }
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(()) => info!(cluster = %cluster, command = %outcome.command, "Leftover removed"),
                Err(e) => warn!(cluster = %cluster, command = %outcome.command, error = %e, "Leftover not removed"),
            }
        }
        info!(
            cluster = %cluster,
            succeeded = report.succeeded(),
            total = report.len(),
            "Leftover cleanup finished"
        );
    }

    fn report_rollback_step(
        &self,
        cluster: &str,
        resource: ResourceKind,
        result: Result<(), &LifecycleError>,
    ) {
        match result {
            Ok(()) => info!(cluster = %cluster, resource = %resource, "Rolled back"),
            Err(e) => warn!(cluster = %cluster, resource = %resource, error = %e, "Rollback step failed"),
        }
    }
}
