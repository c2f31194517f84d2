//! Default configuration values shared across cluster-forge components

use std::time::Duration;

/// Default per-cluster lifecycle timeout when a descriptor does not set one
pub const DEFAULT_CLUSTER_TIMEOUT: &str = "30m";

/// Upper bound for the cluster object to appear after the creation tool returns
pub const CLUSTER_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Fixed bound for the post-ready verification job, independent of the descriptor timeout
pub const VERIFICATION_JOB_TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// Interval between polls of an eventually-consistent remote condition
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Readiness-verification job awaited after a cluster reports ready
pub const VERIFICATION_JOB_NAME: &str = "osd-cluster-ready";

/// Namespace of the readiness-verification job
pub const VERIFICATION_JOB_NAMESPACE: &str = "openshift-monitoring";

/// Default channel group / release stream
pub const DEFAULT_STREAM: &str = "stable";

/// Machine CIDR given to hosted-control-plane clusters that don't set one
pub const DEFAULT_MACHINE_CIDR: &str = "10.0.0.0/16";

/// Tag every hosted-control-plane cluster carries
pub const EXTERNAL_DNS_TAG: &str = "dns:external";

/// Base directory for per-cluster install data
pub const DEFAULT_INSTALL_DATA_DIR: &str = "/openshift-cli-installer/clusters-install-data";

/// Name of the descriptor record written into a cluster's install directory
pub const CLUSTER_DATA_FILENAME: &str = "cluster_data.yaml";

/// Directory under the install directory holding the provisioning engine state
pub const STACK_DIR_NAME: &str = "terraform";
