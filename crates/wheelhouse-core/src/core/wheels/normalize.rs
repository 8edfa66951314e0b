use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::scan::{collect_wheels_recursive, list_wheels, WheelEntry};
use crate::diagnostics::reasons;
use crate::fs::ensure_directory;
use crate::outcome::ExecutionOutcome;
use crate::CommandContext;

#[derive(Debug, Clone, Default)]
pub struct NormalizeRequest {
    pub directory: PathBuf,
    pub dry_run: bool,
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub(crate) struct NormalizeStats {
    pub(crate) total: usize,
    pub(crate) normalized: usize,
    pub(crate) unchanged: usize,
    pub(crate) errors: usize,
}

#[derive(Debug, Clone, Serialize)]
struct RenameRecord {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn normalize_group(
    wheels: &[&WheelEntry],
    dry_run: bool,
    records: &mut Vec<RenameRecord>,
) -> NormalizeStats {
    let mut stats = NormalizeStats {
        total: wheels.len(),
        ..NormalizeStats::default()
    };
    for wheel in wheels {
        if !wheel.parsed.has_local_version() {
            stats.unchanged += 1;
            debug!(wheel = %wheel.filename, "already normalized");
            continue;
        }
        let target_name = wheel.parsed.without_local_version().to_string();
        let target = wheel.path.with_file_name(&target_name);
        let mut record = RenameRecord {
            from: wheel.filename.clone(),
            to: target_name,
            error: None,
        };
        if dry_run {
            info!(from = %record.from, to = %record.to, "would rename");
            stats.normalized += 1;
        } else if target.exists() {
            warn!(from = %record.from, to = %record.to, "target already exists");
            record.error = Some("target already exists".to_string());
            stats.errors += 1;
        } else {
            match fs::rename(&wheel.path, &target) {
                Ok(()) => {
                    info!(from = %record.from, to = %record.to, "renamed");
                    stats.normalized += 1;
                }
                Err(err) => {
                    warn!(from = %record.from, %err, "rename failed");
                    record.error = Some(err.to_string());
                    stats.errors += 1;
                }
            }
        }
        records.push(record);
    }
    stats
}

fn group_by_directory(wheels: &[WheelEntry]) -> BTreeMap<&Path, Vec<&WheelEntry>> {
    let mut groups: BTreeMap<&Path, Vec<&WheelEntry>> = BTreeMap::new();
    for wheel in wheels {
        let parent = wheel.path.parent().unwrap_or_else(|| Path::new("."));
        groups.entry(parent).or_default().push(wheel);
    }
    groups
}

/// Renames wheels to drop the `+local` version segment.
///
/// A rename whose target already exists is counted as an error and skipped;
/// every other file is still processed.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn normalize_wheels(
    _ctx: &CommandContext,
    request: &NormalizeRequest,
) -> Result<ExecutionOutcome> {
    ensure_directory(&request.directory, "wheels")?;
    let wheels = if request.recursive {
        collect_wheels_recursive(&request.directory)?
    } else {
        list_wheels(&request.directory)?
    };

    let mut records = Vec::new();
    let mut stats = NormalizeStats::default();
    let groups = group_by_directory(&wheels);
    for (directory, group) in &groups {
        debug!(directory = %directory.display(), wheels = group.len(), "normalizing");
        let group_stats = normalize_group(group, request.dry_run, &mut records);
        stats.total += group_stats.total;
        stats.normalized += group_stats.normalized;
        stats.unchanged += group_stats.unchanged;
        stats.errors += group_stats.errors;
    }

    let details = json!({
        "directory": request.directory.display().to_string(),
        "directories": groups.len(),
        "dry_run": request.dry_run,
        "stats": stats,
        "renames": records,
    });
    let summary = format!(
        "{} wheel(s): {} normalized, {} already normalized, {} error(s)",
        stats.total, stats.normalized, stats.unchanged, stats.errors
    );

    if stats.errors > 0 {
        let mut details = details;
        details["reason"] = json!(reasons::RENAME_CONFLICTS);
        details["hint"] = json!("Remove or move the conflicting wheels, then rerun.");
        return Ok(ExecutionOutcome::user_error(
            format!("completed with {} error(s); {summary}", stats.errors),
            details,
        ));
    }
    let message = if stats.total == 0 {
        format!("no wheel files found in {}", request.directory.display())
    } else if request.dry_run {
        format!("[dry-run] {summary}")
    } else {
        summary
    };
    Ok(ExecutionOutcome::success(message, details))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, GlobalOptions};
    use crate::effects::SystemEffects;
    use crate::outcome::CommandStatus;
    use crate::wheels::scan::test_support::{names, touch};

    fn run(request: &NormalizeRequest) -> Result<ExecutionOutcome> {
        let global = GlobalOptions::default();
        let ctx = CommandContext::for_tests(
            &global,
            &[],
            Config::default(),
            Arc::new(SystemEffects::new()),
        );
        normalize_wheels(&ctx, request)
    }

    #[test]
    fn strips_local_versions() -> Result<()> {
        let temp = tempfile::tempdir()?;
        touch(temp.path(), "torch-2.9.0+git1c57644-cp312-cp312-linux_x86_64.whl");
        touch(temp.path(), "triton-3.4.0-cp312-cp312-linux_x86_64.whl");

        let outcome = run(&NormalizeRequest {
            directory: temp.path().to_path_buf(),
            ..NormalizeRequest::default()
        })?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(
            names(temp.path()),
            vec![
                "torch-2.9.0-cp312-cp312-linux_x86_64.whl",
                "triton-3.4.0-cp312-cp312-linux_x86_64.whl"
            ]
        );
        assert_eq!(outcome.details["stats"]["normalized"], 1);
        assert_eq!(outcome.details["stats"]["unchanged"], 1);
        Ok(())
    }

    #[test]
    fn refuses_to_overwrite_existing_target() -> Result<()> {
        let temp = tempfile::tempdir()?;
        touch(temp.path(), "torch-2.9.0+git1c57644-cp312-cp312-linux_x86_64.whl");
        touch(temp.path(), "torch-2.9.0-cp312-cp312-linux_x86_64.whl");
        touch(temp.path(), "amdsmi-7.0.0+rocm-py3-none-any.whl");

        let outcome = run(&NormalizeRequest {
            directory: temp.path().to_path_buf(),
            ..NormalizeRequest::default()
        })?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["stats"]["errors"], 1);
        assert_eq!(outcome.details["stats"]["normalized"], 1);
        let remaining = names(temp.path());
        assert!(remaining.contains(&"torch-2.9.0+git1c57644-cp312-cp312-linux_x86_64.whl".to_string()));
        assert!(remaining.contains(&"amdsmi-7.0.0-py3-none-any.whl".to_string()));
        assert_eq!(
            fs::read(temp.path().join("torch-2.9.0-cp312-cp312-linux_x86_64.whl"))?,
            b"torch-2.9.0-cp312-cp312-linux_x86_64.whl"
        );
        Ok(())
    }

    #[test]
    fn dry_run_and_recursive() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let nested = temp.path().join("rocm");
        fs::create_dir_all(&nested)?;
        touch(&nested, "torch-2.9.0+git1c57644-cp312-cp312-linux_x86_64.whl");
        touch(temp.path(), "triton-3.4.0+rocm7-cp312-cp312-linux_x86_64.whl");

        let flat = run(&NormalizeRequest {
            directory: temp.path().to_path_buf(),
            dry_run: true,
            recursive: false,
        })?;
        assert_eq!(flat.details["stats"]["total"], 1);

        let deep = run(&NormalizeRequest {
            directory: temp.path().to_path_buf(),
            dry_run: true,
            recursive: true,
        })?;
        assert_eq!(deep.details["stats"]["normalized"], 2);
        assert_eq!(deep.details["directories"], 2);
        assert!(deep.message.starts_with("[dry-run]"));
        assert_eq!(
            names(&nested),
            vec!["torch-2.9.0+git1c57644-cp312-cp312-linux_x86_64.whl"]
        );
        Ok(())
    }
}
