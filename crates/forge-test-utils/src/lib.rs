//! Shared test utilities for cluster-forge
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`fixtures`]: Captured tool output and version catalogs
//! - [`names`]: Unique cluster names for tests that touch the filesystem

pub mod fixtures;
pub mod names;

// Re-export commonly used items
pub use fixtures::{CHANNEL_GROUP_CATALOG, DELETE_OUTPUT_WITH_LEFTOVERS, RELEASE_IMAGE_CATALOG};
pub use names::unique_cluster_name;
