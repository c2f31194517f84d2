//! Version resolution against an available-versions catalog
//!
//! A catalog maps artifact locations (a channel group, or a release-image
//! repository) to the version strings they carry. Resolution turns a
//! requested `x.y` or `x.y.z` into one concrete version plus its location.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LifecycleError;

const ARCH_SUFFIX: &str = "-x86_64";

/// How catalog sources are keyed and how stream names appear in versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogKind {
    /// Sources are channel groups (`stable`, `candidate`, `nightly`)
    #[default]
    ChannelGroups,
    /// Sources are release-image repositories; streams are encoded in the tag
    ReleaseImages,
}

/// Available versions, grouped by artifact location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCatalog {
    #[serde(default)]
    pub kind: CatalogKind,
    pub sources: BTreeMap<String, Vec<String>>,
}

/// A requested version pinned to a concrete version and artifact location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub version: String,
    pub location: String,
}

impl VersionCatalog {
    pub fn new(kind: CatalogKind) -> Self {
        Self {
            kind,
            sources: BTreeMap::new(),
        }
    }

    /// Add (or replace) the versions carried by `location`
    pub fn with_source(
        mut self,
        location: impl Into<String>,
        versions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.sources.insert(
            location.into(),
            versions.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Load a catalog from a JSON file
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read versions file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse versions file {}", path.display()))
    }

    /// Resolve `requested` within `stream` to a single concrete version.
    ///
    /// # Errors
    /// * `Input` - The request has fewer than two components
    /// * `VersionNotFound` - No source carries a matching version
    pub fn resolve(&self, requested: &str, stream: &str) -> Result<ResolvedVersion, LifecycleError> {
        let components = requested.split('.').count();
        if components < 2 || requested.split('.').any(str::is_empty) {
            return Err(LifecycleError::Input(format!(
                "Version must be at least x.y (4.14), got {requested}"
            )));
        }

        let not_found = || LifecycleError::VersionNotFound {
            version: requested.to_string(),
            stream: stream.to_string(),
        };

        let pattern = format!(
            r"^{}(\.\d+)?(-)?(\d+\.)?{}",
            regex::escape(requested),
            self.stream_pattern(stream)
        );
        let matcher = Regex::new(&pattern)
            .map_err(|e| LifecycleError::Input(format!("Invalid version request {requested}: {e}")))?;

        let candidates: Vec<&str> = self
            .searched_sources(stream)
            .flat_map(|(_, versions)| versions.iter().map(String::as_str))
            .filter(|v| continues_at_boundary(v, requested) && matcher.is_match(v))
            .collect();

        debug!(
            requested = %requested,
            stream = %stream,
            candidates = candidates.len(),
            "Filtered version candidates"
        );

        let version = if components >= 3 {
            candidates.into_iter().max_by_key(|v| sort_key(v))
        } else {
            candidates
                .into_iter()
                .filter(|v| parse_semver(v).is_some())
                .max_by_key(|v| sort_key(v))
        }
        .ok_or_else(not_found)?
        .to_string();

        let location = self
            .sources
            .iter()
            .rev()
            .find(|(_, versions)| versions.iter().any(|v| *v == version))
            .map(|(location, _)| location.clone())
            .ok_or_else(not_found)?;

        info!(requested = %requested, version = %version, location = %location, "Resolved version");
        Ok(ResolvedVersion { version, location })
    }

    /// Channel-group catalogs only search the source named after the stream
    fn searched_sources<'a>(
        &'a self,
        stream: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<String>)> + 'a {
        self.sources
            .iter()
            .filter(move |(source, _)| self.kind == CatalogKind::ReleaseImages || *source == stream)
    }

    fn stream_pattern(&self, stream: &str) -> String {
        match self.kind {
            CatalogKind::ChannelGroups if stream == "nightly" => "nightly".to_string(),
            CatalogKind::ChannelGroups => String::new(),
            CatalogKind::ReleaseImages => match stream {
                "stable" => "x86_64".to_string(),
                "nightly" | "ci" => regex::escape(stream),
                other => format!(r"{}\.\d+{}", regex::escape(other), regex::escape(ARCH_SUFFIX)),
            },
        }
    }
}

/// `4.1` continues into `4.1.3` or `4.1-rc`, never into `4.14.0`
fn continues_at_boundary(candidate: &str, requested: &str) -> bool {
    candidate
        .strip_prefix(requested)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('-'))
}

fn parse_semver(version: &str) -> Option<semver::Version> {
    let stripped = version.strip_suffix(ARCH_SUFFIX).unwrap_or(version);
    semver::Version::parse(stripped).ok()
}

/// Highest semver first; unparseable versions sort below every parseable one
fn sort_key(version: &str) -> (Option<semver::Version>, String) {
    (parse_semver(version), version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_catalog() -> VersionCatalog {
        VersionCatalog::new(CatalogKind::ChannelGroups)
            .with_source("stable", ["4.13.4", "4.13.6", "4.14.1", "4.14.10", "4.14.9"])
            .with_source("candidate", ["4.13.9", "4.14.11", "4.15.0-rc.2"])
            .with_source(
                "nightly",
                [
                    "4.13.0-0.nightly-2023-08-14-101010",
                    "4.13.0-0.nightly-2023-08-15-023315",
                ],
            )
    }

    fn image_catalog() -> VersionCatalog {
        VersionCatalog::new(CatalogKind::ReleaseImages)
            .with_source(
                "quay.io/openshift-release-dev/ocp-release",
                [
                    "4.13.8-x86_64",
                    "4.13.9-x86_64",
                    "4.13.0-ec.4-x86_64",
                    "4.13.0-rc.8-x86_64",
                ],
            )
            .with_source(
                "registry.ci.openshift.org/ocp/release",
                [
                    "4.13.0-0.nightly-2023-08-15-023315",
                    "4.13.0-0.ci-2023-08-14-170508",
                ],
            )
    }

    #[test]
    fn test_channel_group_latest_for_minor() {
        let resolved = channel_catalog().resolve("4.14", "stable").unwrap();
        assert_eq!(resolved.version, "4.14.10");
        assert_eq!(resolved.location, "stable");
    }

    #[test]
    fn test_channel_group_only_searches_its_stream() {
        let resolved = channel_catalog().resolve("4.13", "candidate").unwrap();
        assert_eq!(resolved.version, "4.13.9");
    }

    #[test]
    fn test_channel_group_nightly() {
        let resolved = channel_catalog().resolve("4.13", "nightly").unwrap();
        assert_eq!(resolved.version, "4.13.0-0.nightly-2023-08-15-023315");
    }

    #[test]
    fn test_full_version_must_exist() {
        let catalog = channel_catalog();
        assert_eq!(catalog.resolve("4.13.6", "stable").unwrap().version, "4.13.6");
        assert!(matches!(
            catalog.resolve("4.13.40", "stable"),
            Err(LifecycleError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_minor_does_not_match_longer_minor() {
        let catalog = VersionCatalog::new(CatalogKind::ChannelGroups)
            .with_source("stable", ["4.14.0", "4.14.2"]);
        assert!(matches!(
            catalog.resolve("4.1", "stable"),
            Err(LifecycleError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_short_request_is_input_error() {
        assert!(matches!(
            channel_catalog().resolve("4", "stable"),
            Err(LifecycleError::Input(_))
        ));
    }

    #[test]
    fn test_unknown_versions_not_found() {
        let catalog = channel_catalog();
        for requested in ["100.5", "100.5.1"] {
            assert!(matches!(
                catalog.resolve(requested, "stable"),
                Err(LifecycleError::VersionNotFound { .. })
            ));
        }
        assert!(matches!(
            catalog.resolve("4.13", "fast"),
            Err(LifecycleError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_release_images_per_stream() {
        let catalog = image_catalog();

        let stable = catalog.resolve("4.13", "stable").unwrap();
        assert_eq!(stable.version, "4.13.9-x86_64");
        assert_eq!(stable.location, "quay.io/openshift-release-dev/ocp-release");

        let nightly = catalog.resolve("4.13", "nightly").unwrap();
        assert_eq!(nightly.version, "4.13.0-0.nightly-2023-08-15-023315");
        assert_eq!(nightly.location, "registry.ci.openshift.org/ocp/release");

        assert_eq!(catalog.resolve("4.13", "ec").unwrap().version, "4.13.0-ec.4-x86_64");
        assert_eq!(catalog.resolve("4.13", "rc").unwrap().version, "4.13.0-rc.8-x86_64");
        assert_eq!(
            catalog.resolve("4.13", "ci").unwrap().version,
            "4.13.0-0.ci-2023-08-14-170508"
        );
        assert_eq!(
            catalog.resolve("4.13.9", "stable").unwrap().version,
            "4.13.9-x86_64"
        );
    }

    #[test]
    fn test_tie_break_picks_greatest_location() {
        let catalog = VersionCatalog::new(CatalogKind::ReleaseImages)
            .with_source("quay.io/a/release", ["4.14.2-x86_64"])
            .with_source("quay.io/b/release", ["4.14.2-x86_64"]);
        let resolved = catalog.resolve("4.14", "stable").unwrap();
        assert_eq!(resolved.location, "quay.io/b/release");
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(
            &path,
            r#"{"kind": "release-images", "sources": {"quay.io/x": ["4.14.1-x86_64"]}}"#,
        )
        .unwrap();

        let catalog = VersionCatalog::load_json(&path).unwrap();
        assert_eq!(catalog.kind, CatalogKind::ReleaseImages);
        assert_eq!(catalog.resolve("4.14", "stable").unwrap().version, "4.14.1-x86_64");
    }
}
