//! Creation/deletion tool command construction

use std::collections::BTreeMap;

use crate::descriptor::ClusterDescriptor;
use crate::remote::ToolCommand;

/// Descriptor fields that never become creation flags
pub const EXCLUDED_FIELDS: &[&str] = &[
    "name",
    "platform",
    "ocm-env",
    "ocm-token",
    "install-dir",
    "timeout",
];

/// Boolean field rendered as a bare flag
const HOSTED_CP_FIELD: &str = "hosted-cp";

/// `create cluster --sts` plus one `--key=value` per non-excluded field.
///
/// `hosted-cp` renders as a bare `--hosted-cp` when true and is dropped
/// otherwise.
pub fn creation_flags(fields: &BTreeMap<String, String>) -> ToolCommand {
    let mut command = ToolCommand::new(["create", "cluster", "--sts"]);
    for (key, value) in fields {
        if EXCLUDED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if key == HOSTED_CP_FIELD {
            if value.eq_ignore_ascii_case("true") {
                command.push(format!("--{HOSTED_CP_FIELD}"));
            }
            continue;
        }
        command.push(format!("--{key}={value}"));
    }
    command
}

pub fn creation_command(descriptor: &ClusterDescriptor) -> ToolCommand {
    creation_flags(&descriptor.fields())
}

pub fn deletion_command(descriptor: &ClusterDescriptor) -> ToolCommand {
    ToolCommand::new([
        "delete".to_string(),
        "cluster".to_string(),
        format!("--cluster={}", descriptor.name),
        "--yes".to_string(),
    ])
}
