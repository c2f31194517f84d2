//! forge-coordinator - managed OpenShift cluster lifecycle orchestration
//!
//! This crate drives clusters through create and destroy, provisioning the
//! network stack hosted-control-plane clusters need and rolling back
//! everything it created when a step fails.

pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod infra;
pub mod leftovers;
pub mod orchestrator;
pub mod process;
pub mod remote;
pub mod versions;
pub mod wait;
