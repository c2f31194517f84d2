//! forge-common - Shared types and utilities
//!
//! This crate provides the types shared by the coordinator and its test
//! helpers, without any process or cloud dependencies.
//!
//! ## Modules
//!
//! - [`defaults`]: Default timeouts, paths and job names
//! - [`duration`]: Time-string parsing (`"30m"`, `"1h"`, `"3600"`)
//! - [`platform`]: Cluster platform, cloud provider and OCM environment enums
//! - [`resource_kind`]: Resources created during a lifecycle and their rollback order

pub mod defaults;
pub mod duration;
pub mod platform;
pub mod resource_kind;

// Re-export commonly used types
pub use duration::{TimeStringError, format_time_string, parse_time_string};
pub use platform::{CloudProvider, OcmEnvironment, Platform};
pub use resource_kind::ResourceKind;
