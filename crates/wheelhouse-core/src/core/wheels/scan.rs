use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use walkdir::WalkDir;
use wheelhouse_domain::{is_wheel_file, parse_wheel_filename, WheelFilename};

/// A wheel file on disk together with its parsed filename.
#[derive(Debug, Clone)]
pub(crate) struct WheelEntry {
    pub(crate) path: PathBuf,
    pub(crate) filename: String,
    pub(crate) parsed: WheelFilename,
}

impl WheelEntry {
    fn from_path(path: PathBuf) -> Option<Self> {
        let filename = path.file_name()?.to_str()?.to_string();
        match parse_wheel_filename(&filename) {
            Ok(parsed) => Some(Self {
                path,
                filename,
                parsed,
            }),
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unparseable wheel");
                None
            }
        }
    }

    pub(crate) fn normalized_name(&self) -> String {
        self.parsed.normalized_name()
    }

    pub(crate) fn version(&self) -> &str {
        &self.parsed.version
    }

    /// `/`-separated path below `root`; the object key under `packages/`
    /// once the directory is synced to a bucket.
    pub(crate) fn relative_key(&self, root: &Path) -> String {
        let relative = self.path.strip_prefix(root).unwrap_or(&self.path);
        relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub(crate) fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|meta| meta.len()).unwrap_or(0)
    }
}

/// Lists the wheels directly inside `dir`, sorted by filename.
pub(crate) fn list_wheels(dir: &Path) -> Result<Vec<WheelEntry>> {
    let mut wheels = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("reading {}", dir.display()))?
            .path();
        if !is_wheel_file(&path) {
            continue;
        }
        if let Some(wheel) = WheelEntry::from_path(path) {
            wheels.push(wheel);
        }
    }
    wheels.sort_by(|left, right| left.filename.cmp(&right.filename));
    Ok(wheels)
}

/// Lists every wheel below `root`, sorted by path.
pub(crate) fn collect_wheels_recursive(root: &Path) -> Result<Vec<WheelEntry>> {
    let mut wheels = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && is_wheel_file(path) {
            if let Some(wheel) = WheelEntry::from_path(path.to_path_buf()) {
                wheels.push(wheel);
            }
        }
    }
    wheels.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(wheels)
}

/// Wheels in `wheels` whose distribution normalizes to `package`.
pub(crate) fn wheels_named<'a>(wheels: &'a [WheelEntry], package: &str) -> Vec<&'a WheelEntry> {
    let wanted = wheelhouse_domain::normalize_package_name(package);
    wheels
        .iter()
        .filter(|wheel| wheel.normalized_name() == wanted)
        .collect()
}

/// The custom wheel for `package` among the base wheels: the first match in
/// filename order when several exist.
pub(crate) fn find_base_wheel<'a>(
    base_wheels: &'a [WheelEntry],
    package: &str,
) -> Option<&'a WheelEntry> {
    let matches = wheels_named(base_wheels, package);
    if matches.len() > 1 {
        warn!(
            package,
            chosen = %matches[0].filename,
            count = matches.len(),
            "several base wheels match; using the first"
        );
    }
    matches.first().copied()
}
