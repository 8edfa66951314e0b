use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use toml_edit::{Array, DocumentMut, Item, Value as TomlValue};
use tracing::{debug, info, warn};
use wheelhouse_domain::split_requirement;

use crate::diagnostics::reasons;
use crate::fs::ensure_directory;
use crate::outcome::{ExecutionOutcome, UserError};
use crate::wheels::scan::list_wheels;
use crate::CommandContext;

/// Packages whose custom builds get pinned into the project's dependencies.
const CUSTOM_PACKAGES: [&str; 5] = ["torch", "triton", "triton-kernels", "torchvision", "amdsmi"];

#[derive(Debug, Clone)]
pub struct PinRequest {
    pub install_dir: PathBuf,
    pub pyproject: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PinnedEntry {
    table: String,
    before: String,
    after: String,
}

/// Rewrites the project's dependencies on the custom-built wheels to exact
/// `==` pins, keeping extras and markers.
///
/// # Errors
/// Returns an error when the install directory or pyproject is missing, when
/// the install directory holds none of the custom wheels, or when the
/// pyproject cannot be parsed or written.
pub fn pin_dependencies(_ctx: &CommandContext, request: &PinRequest) -> Result<ExecutionOutcome> {
    ensure_directory(&request.install_dir, "install")?;
    let versions = custom_wheel_versions(&request.install_dir)?;
    if versions.is_empty() {
        return Err(UserError::new(
            format!(
                "no custom wheels found in {}",
                request.install_dir.display()
            ),
            json!({
                "reason": reasons::NO_CUSTOM_WHEELS,
                "install_dir": request.install_dir.display().to_string(),
                "expected": CUSTOM_PACKAGES,
                "hint": "Point the command at the directory holding the freshly built torch/triton wheels.",
            }),
        )
        .into());
    }
    if !request.pyproject.is_file() {
        return Err(UserError::new(
            format!("pyproject not found: {}", request.pyproject.display()),
            json!({
                "reason": reasons::MISSING_INPUT,
                "path": request.pyproject.display().to_string(),
            }),
        )
        .into());
    }

    let contents = fs::read_to_string(&request.pyproject)
        .with_context(|| format!("reading {}", request.pyproject.display()))?;
    let mut doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("parsing {}", request.pyproject.display()))?;
    let pinned = pin_document(&mut doc, &versions);

    let backup = backup_path(&request.pyproject);
    fs::write(&backup, &contents).with_context(|| format!("writing {}", backup.display()))?;
    if !pinned.is_empty() {
        fs::write(&request.pyproject, doc.to_string())
            .with_context(|| format!("writing {}", request.pyproject.display()))?;
    }

    let mut lines: Vec<String> = versions
        .iter()
        .map(|(name, version)| format!("found {name}=={version}"))
        .collect();
    if pinned.is_empty() {
        warn!(
            pyproject = %request.pyproject.display(),
            "no dependencies matched the custom wheels; nothing was modified"
        );
        lines.push("no dependencies were modified".to_string());
    } else {
        info!(count = pinned.len(), "pinned custom wheel dependencies");
        lines.push("modified dependencies:".to_string());
        lines.extend(
            pinned
                .iter()
                .map(|entry| format!("  {} -> {}", entry.before, entry.after)),
        );
    }
    lines.push(format!("backup saved: {}", backup.display()));

    Ok(ExecutionOutcome::success(
        lines.join("\n"),
        json!({
            "pyproject": request.pyproject.display().to_string(),
            "backup": backup.display().to_string(),
            "versions": versions,
            "pinned": pinned,
            "modified": !pinned.is_empty(),
        }),
    ))
}

fn custom_wheel_versions(install_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut versions = BTreeMap::new();
    for wheel in list_wheels(install_dir)? {
        let name = wheel.normalized_name();
        if !CUSTOM_PACKAGES.contains(&name.as_str()) {
            continue;
        }
        debug!(wheel = %wheel.filename, version = wheel.version(), "custom wheel");
        if let Some(previous) = versions.insert(name.clone(), wheel.version().to_string()) {
            warn!(
                package = %name,
                previous = %previous,
                using = wheel.version(),
                "several custom wheels for one package; pinning the last by filename"
            );
        }
    }
    Ok(versions)
}

fn pin_document(doc: &mut DocumentMut, versions: &BTreeMap<String, String>) -> Vec<PinnedEntry> {
    let Some(project) = doc.get_mut("project").and_then(Item::as_table_mut) else {
        return Vec::new();
    };
    let mut pinned = Vec::new();
    if let Some(array) = project.get_mut("dependencies").and_then(Item::as_array_mut) {
        pin_array(array, versions, "dependencies", &mut pinned);
    }
    if let Some(groups) = project
        .get_mut("optional-dependencies")
        .and_then(Item::as_table_like_mut)
    {
        for (group, item) in groups.iter_mut() {
            if let Some(array) = item.as_array_mut() {
                let table = format!("optional-dependencies.{}", group.get());
                pin_array(array, versions, &table, &mut pinned);
            }
        }
    }
    pinned
}

fn pin_array(
    array: &mut Array,
    versions: &BTreeMap<String, String>,
    table: &str,
    pinned: &mut Vec<PinnedEntry>,
) {
    for value in array.iter_mut() {
        let Some(spec) = value.as_str() else {
            continue;
        };
        let Some(after) = exact_pin(spec, versions) else {
            continue;
        };
        if after == spec.trim() {
            continue;
        }
        pinned.push(PinnedEntry {
            table: table.to_string(),
            before: spec.to_string(),
            after: after.clone(),
        });
        let decor = value.decor().clone();
        *value = TomlValue::from(after);
        *value.decor_mut() = decor;
    }
}

fn exact_pin(spec: &str, versions: &BTreeMap<String, String>) -> Option<String> {
    let parts = split_requirement(spec);
    let version = versions.get(&parts.name)?;
    let mut pinned = parts.name.clone();
    if !parts.extras.is_empty() {
        pinned.push('[');
        pinned.push_str(&parts.extras.join(","));
        pinned.push(']');
    }
    pinned.push_str(" == ");
    pinned.push_str(version);
    if let Some(marker) = &parts.marker {
        pinned.push_str(" ; ");
        pinned.push_str(marker);
    }
    Some(pinned)
}

fn backup_path(pyproject: &Path) -> PathBuf {
    let mut name = OsString::from(pyproject.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, GlobalOptions};
    use crate::effects::SystemEffects;
    use crate::wheels::scan::test_support::touch;

    const PYPROJECT: &str = r#"[project]
name = "vllm"
dependencies = [
    "numpy",
    # custom builds
    "torch >= 2.9.0",
    "triton_kernels>=1.0 ; platform_system == 'Linux'",
]

[project.optional-dependencies]
vision = ["torchvision[extras] >= 0.20", "pillow"]
"#;

    fn run(install_dir: &Path, pyproject: &Path) -> Result<ExecutionOutcome> {
        let global = GlobalOptions::default();
        let ctx = CommandContext::for_tests(
            &global,
            &[],
            Config::default(),
            Arc::new(SystemEffects::new()),
        );
        pin_dependencies(
            &ctx,
            &PinRequest {
                install_dir: install_dir.to_path_buf(),
                pyproject: pyproject.to_path_buf(),
            },
        )
    }

    #[test]
    fn rewrites_loose_constraints_and_keeps_backup() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let install = temp.path().join("install");
        fs::create_dir(&install)?;
        touch(&install, "torch-2.9.0a0+git1c57644-cp312-cp312-linux_x86_64.whl");
        touch(&install, "triton_kernels-1.0.0+rocm-py3-none-any.whl");
        touch(&install, "torchvision-0.24.0a0+git98f8b37-cp312-cp312-linux_x86_64.whl");
        touch(&install, "numpy-2.1.0-cp312-cp312-linux_x86_64.whl");
        let pyproject = temp.path().join("pyproject.toml");
        fs::write(&pyproject, PYPROJECT)?;

        let outcome = run(&install, &pyproject)?;

        let rewritten = fs::read_to_string(&pyproject)?;
        assert!(rewritten.contains("\"torch == 2.9.0a0+git1c57644\""));
        assert!(rewritten
            .contains("\"triton-kernels == 1.0.0+rocm ; platform_system == 'Linux'\""));
        assert!(rewritten.contains("\"torchvision[extras] == 0.24.0a0+git98f8b37\""));
        assert!(rewritten.contains("# custom builds"));
        assert!(rewritten.contains("\"numpy\""));
        assert_eq!(
            fs::read_to_string(temp.path().join("pyproject.toml.bak"))?,
            PYPROJECT
        );
        assert_eq!(outcome.details["pinned"].as_array().map(Vec::len), Some(3));
        assert_eq!(outcome.details["versions"]["torch"], "2.9.0a0+git1c57644");
        Ok(())
    }

    #[test]
    fn already_pinned_entries_are_not_reported() -> Result<()> {
        let temp = tempfile::tempdir()?;
        touch(temp.path(), "torch-2.9.0-cp312-cp312-linux_x86_64.whl");
        let pyproject = temp.path().join("pyproject.toml");
        fs::write(
            &pyproject,
            "[project]\nname = \"vllm\"\ndependencies = [\"torch == 2.9.0\"]\n",
        )?;

        let outcome = run(temp.path(), &pyproject)?;

        assert_eq!(outcome.details["modified"], false);
        assert!(outcome.message.contains("no dependencies were modified"));
        assert!(temp.path().join("pyproject.toml.bak").exists());
        Ok(())
    }

    #[test]
    fn empty_install_dir_is_a_user_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        touch(temp.path(), "numpy-2.1.0-cp312-cp312-linux_x86_64.whl");
        let pyproject = temp.path().join("pyproject.toml");
        fs::write(&pyproject, PYPROJECT)?;

        let err = run(temp.path(), &pyproject).expect_err("no custom wheels");
        let user = err.downcast_ref::<UserError>().expect("user error");
        assert_eq!(user.details()["reason"], reasons::NO_CUSTOM_WHEELS);
        assert_eq!(fs::read_to_string(&pyproject)?, PYPROJECT);
        Ok(())
    }

    #[test]
    fn missing_pyproject_is_a_user_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        touch(temp.path(), "torch-2.9.0-cp312-cp312-linux_x86_64.whl");

        let err = run(temp.path(), &temp.path().join("pyproject.toml")).expect_err("missing");
        let user = err.downcast_ref::<UserError>().expect("user error");
        assert_eq!(user.details()["reason"], reasons::MISSING_INPUT);
        Ok(())
    }
}
