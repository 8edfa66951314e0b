use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::names::{normalize_package_name, strip_local_version};

const WHEEL_SUFFIX: &str = ".whl";

/// Errors raised while splitting a wheel filename into its PEP 427 fields.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WheelNameError {
    #[error("not a wheel file: {0}")]
    NotAWheel(String),
    #[error("invalid wheel filename {filename}: expected 5 or 6 '-' separated fields, found {found}")]
    FieldCount { filename: String, found: usize },
    #[error("invalid wheel filename {0}: empty distribution or version")]
    EmptyField(String),
}

/// The fields encoded in a wheel filename:
/// `{distribution}-{version}(-{build tag})?-{python tag}-{abi tag}-{platform tag}.whl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WheelFilename {
    pub distribution: String,
    pub version: String,
    pub build_tag: Option<String>,
    pub python_tag: String,
    pub abi_tag: String,
    pub platform_tag: String,
}

/// Splits a wheel filename positionally on `-`.
///
/// The distribution name is the first field and the version the second, which
/// matches how the upstream build tooling names its artifacts.
pub fn parse_wheel_filename(filename: &str) -> Result<WheelFilename, WheelNameError> {
    let stem = filename
        .strip_suffix(WHEEL_SUFFIX)
        .ok_or_else(|| WheelNameError::NotAWheel(filename.to_string()))?;
    let parts: Vec<&str> = stem.split('-').collect();
    let (build_tag, tags) = match parts.len() {
        5 => (None, &parts[2..]),
        6 => (Some(parts[2].to_string()), &parts[3..]),
        found => {
            return Err(WheelNameError::FieldCount {
                filename: filename.to_string(),
                found,
            })
        }
    };
    if parts[0].is_empty() || parts[1].is_empty() {
        return Err(WheelNameError::EmptyField(filename.to_string()));
    }
    Ok(WheelFilename {
        distribution: parts[0].to_string(),
        version: parts[1].to_string(),
        build_tag,
        python_tag: tags[0].to_string(),
        abi_tag: tags[1].to_string(),
        platform_tag: tags[2].to_string(),
    })
}

pub fn is_wheel_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(WHEEL_SUFFIX))
}

impl WheelFilename {
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_package_name(&self.distribution)
    }

    #[must_use]
    pub fn has_local_version(&self) -> bool {
        self.version.contains('+')
    }

    /// Returns the same filename with `version` swapped in.
    #[must_use]
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..self.clone()
        }
    }

    /// Drops the `+local` segment, if any.
    #[must_use]
    pub fn without_local_version(&self) -> Self {
        self.with_version(strip_local_version(&self.version))
    }
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.distribution, self.version)?;
        if let Some(build) = &self.build_tag {
            write!(f, "-{build}")?;
        }
        write!(
            f,
            "-{}-{}-{}{WHEEL_SUFFIX}",
            self.python_tag, self.abi_tag, self.platform_tag
        )
    }
}
