//! Captured tool output and catalog data

/// `rosa delete cluster` output listing two leftover cleanup commands
pub const DELETE_OUTPUT_WITH_LEFTOVERS: &str = "\
I: Cluster 'c1' will start uninstalling now
I: Your cluster 'c1' will be deleted but the following objects may remain
I: Operator IAM Roles: - arn:aws:iam::123456789012:role/c1-openshift-ingress-operator-cloud-credentials
I: OIDC Provider : https://oidc.example.com/abc123
INFO: Once the cluster is uninstalled use the following commands to remove the above aws resources
	rosa delete operator-roles -c 2a5f7b1c9d3e --mode auto
	rosa delete oidc-provider -c 2a5f7b1c9d3e --mode auto
INFO: To watch your cluster uninstallation logs, run 'rosa logs uninstall -c c1 --watch'
";

/// `rosa delete cluster` output without a leftover block
pub const DELETE_OUTPUT_CLEAN: &str = "\
I: Cluster 'c1' will start uninstalling now
INFO: To watch your cluster uninstallation logs, run 'rosa logs uninstall -c c1 --watch'
";

/// Managed catalog keyed by channel group
pub const CHANNEL_GROUP_CATALOG: &str = r#"{
  "kind": "channel-groups",
  "sources": {
    "stable": ["4.13.9", "4.13.12", "4.14.1", "4.14.7", "4.15.0"],
    "candidate": ["4.15.0-rc.3", "4.15.0-ec.2"],
    "nightly": ["4.16.0-0.nightly-2024-01-10-000000"]
  }
}"#;

/// Registry-style catalog of release image tags
pub const RELEASE_IMAGE_CATALOG: &str = r#"{
  "kind": "release-images",
  "sources": {
    "quay.io/openshift-release-dev/ocp-release": ["4.13.9-x86_64", "4.13.12-x86_64", "4.14.1-x86_64"],
    "registry.ci.openshift.org/ocp/release": ["4.14.0-0.nightly-2024-01-10-000000", "4.14.0-0.ci-2024-01-10-000000"]
  }
}"#;
