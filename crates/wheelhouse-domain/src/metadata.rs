use std::str::FromStr;

use pep440_rs::{Operator, Version, VersionSpecifiers};
use pep508_rs::{Requirement as PepRequirement, VersionOrUrl};
use serde::Serialize;

use crate::names::{normalize_package_name, strip_local_version};
use crate::requirements::dependency_name;

/// Packages whose ROCm builds must be pinned exactly by downstream wheels.
pub const CRITICAL_PACKAGES: [&str; 4] = ["torch", "triton", "torchvision", "amdsmi"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("METADATA is missing the `{0}` field")]
    MissingField(&'static str),
}

/// The parts of a core metadata file (`*.dist-info/METADATA`) the pipeline
/// cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WheelMetadata {
    pub name: String,
    pub version: String,
    pub requires_dist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalDependency {
    pub name: String,
    pub requirement: String,
    pub pinned_version: Option<String>,
}

impl CriticalDependency {
    pub fn is_pinned(&self) -> bool {
        self.pinned_version.is_some()
    }
}

impl WheelMetadata {
    /// Parses the RFC 822 style header block. The body (long description)
    /// starts after the first blank line and is ignored.
    pub fn parse(contents: &str) -> Result<Self, MetadataError> {
        let mut name = None;
        let mut version = None;
        let mut requires_dist = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("Name:") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("Version:") {
                version = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("Requires-Dist:") {
                requires_dist.push(value.trim().to_string());
            }
        }
        Ok(Self {
            name: name.ok_or(MetadataError::MissingField("Name"))?,
            version: version.ok_or(MetadataError::MissingField("Version"))?,
            requires_dist,
        })
    }

    /// Requirements on any of `packages`, in declaration order.
    pub fn critical_dependencies(&self, packages: &[&str]) -> Vec<CriticalDependency> {
        let wanted: Vec<String> = packages
            .iter()
            .map(|name| normalize_package_name(name))
            .collect();
        self.requires_dist
            .iter()
            .filter_map(|requirement| {
                let name = dependency_name(requirement);
                if !wanted.contains(&name) {
                    return None;
                }
                let pinned_version = exact_pin_version(requirement).map(|(_, version)| version);
                Some(CriticalDependency {
                    name,
                    requirement: requirement.clone(),
                    pinned_version,
                })
            })
            .collect()
    }

    /// Requirements outside `packages` that carry a range constraint.
    pub fn loose_dependencies(&self, packages: &[&str]) -> Vec<&str> {
        let wanted: Vec<String> = packages
            .iter()
            .map(|name| normalize_package_name(name))
            .collect();
        self.requires_dist
            .iter()
            .filter(|requirement| !wanted.contains(&dependency_name(requirement)))
            .filter(|requirement| {
                let constraint = requirement.split(';').next().unwrap_or(requirement);
                constraint.contains('>') || constraint.contains('<')
            })
            .map(String::as_str)
            .collect()
    }

    pub fn declares_exact_pin(&self, package: &str, version: &str) -> bool {
        declares_exact_pin(&self.requires_dist, package, version)
    }
}

/// Returns `(normalized name, version)` when `spec` is a single `==`/`===`
/// requirement. Markers are allowed; URLs and ranges are not pins.
pub fn exact_pin_version(spec: &str) -> Option<(String, String)> {
    let trimmed = spec.trim();
    let requirement = PepRequirement::from_str(trimmed).ok()?;
    let version_spec = match requirement.version_or_url.as_ref() {
        Some(VersionOrUrl::VersionSpecifier(specifiers)) => specifiers.to_string(),
        Some(VersionOrUrl::Url(_)) | None => return None,
    };
    let parsed = VersionSpecifiers::from_str(&version_spec).ok()?;
    let mut iter = parsed.iter();
    let first = iter.next()?;
    if iter.next().is_some() || !matches!(first.operator(), Operator::Equal | Operator::ExactEqual)
    {
        return None;
    }
    let name = dependency_name(trimmed);
    if name.is_empty() {
        return None;
    }
    Some((name, first.version().to_string()))
}

/// True when one of `requirements` pins `package` to exactly `version`.
///
/// Versions compare as PEP 440 versions when both parse, so `2.9.0` matches
/// `2.9`; otherwise the strings must be identical. A side without a local
/// segment matches any local build of the same release, as `==` does.
pub fn declares_exact_pin(requirements: &[String], package: &str, version: &str) -> bool {
    let wanted = normalize_package_name(package);
    requirements.iter().any(|requirement| {
        exact_pin_version(requirement)
            .is_some_and(|(name, pinned)| name == wanted && versions_match(&pinned, version))
    })
}

fn versions_match(left: &str, right: &str) -> bool {
    if same_version(left, right) {
        return true;
    }
    let (left_public, right_public) = (strip_local_version(left), strip_local_version(right));
    let one_side_public = left_public.len() == left.len() || right_public.len() == right.len();
    one_side_public && same_version(left_public, right_public)
}

fn same_version(left: &str, right: &str) -> bool {
    match (Version::from_str(left), Version::from_str(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}
