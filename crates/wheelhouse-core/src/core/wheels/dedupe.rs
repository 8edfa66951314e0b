use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::disambiguate::{plan_disambiguation, select_probe, DisambiguationPlan};
use super::scan::{find_base_wheel, list_wheels, wheels_named, WheelEntry};
use crate::config::{AmbiguityPolicy, MissingBasePolicy, EXTENDED_TRACKED_PACKAGES};
use crate::diagnostics::reasons;
use crate::fs::ensure_directory;
use crate::outcome::{ExecutionOutcome, UserError};
use crate::CommandContext;

#[derive(Debug, Clone, Default)]
pub struct DedupeRequest {
    pub base_dir: PathBuf,
    pub all_dir: PathBuf,
    /// Overrides the configured tracked list when set.
    pub packages: Option<Vec<String>>,
    pub extended: bool,
    pub missing_base: Option<MissingBasePolicy>,
    pub dry_run: bool,
    /// Also run vLLM disambiguation once per-package cleanup is planned.
    pub disambiguate: bool,
    pub ambiguity: AmbiguityPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PackageStatus {
    Cleaned,
    CustomMissing,
    SkippedNoBase,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PackagePlan {
    pub(crate) package: String,
    pub(crate) custom_wheel: Option<String>,
    pub(crate) custom_version: Option<String>,
    pub(crate) kept: Vec<String>,
    pub(crate) deleted: Vec<String>,
    pub(crate) custom_found: bool,
    pub(crate) status: PackageStatus,
    #[serde(skip)]
    delete_paths: Vec<PathBuf>,
}

impl PackagePlan {
    fn summary_line(&self) -> String {
        match (self.status, &self.custom_version) {
            (PackageStatus::SkippedNoBase, _) | (_, None) => {
                format!("{}: no custom wheel in base directory, left untouched", self.package)
            }
            (PackageStatus::Cleaned, Some(version)) => format!(
                "{}: kept {} ({version}), removed {}",
                self.package,
                self.kept.len(),
                self.deleted.len()
            ),
            (PackageStatus::CustomMissing, Some(version)) => format!(
                "{}: custom {version} wheel not found in combined directory, removed {}",
                self.package,
                self.deleted.len()
            ),
        }
    }
}

/// Computes the per-package keep/delete set. Nothing is removed here; under
/// the strict policy a tracked package without a base wheel fails the whole
/// plan.
pub(crate) fn plan_package_cleanup(
    base_wheels: &[WheelEntry],
    all_wheels: &[WheelEntry],
    tracked: &[String],
    policy: MissingBasePolicy,
    base_dir: &Path,
) -> Result<Vec<PackagePlan>> {
    let mut plans = Vec::with_capacity(tracked.len());
    for package in tracked {
        let Some(base) = find_base_wheel(base_wheels, package) else {
            if policy == MissingBasePolicy::Strict {
                return Err(UserError::new(
                    format!("no custom wheel for `{package}` in {}", base_dir.display()),
                    json!({
                        "reason": reasons::MISSING_BASE_WHEEL,
                        "package": package,
                        "base_dir": base_dir.display().to_string(),
                        "hint": "Add the custom wheel, drop the package from the tracked list, or rerun with --missing-base lenient.",
                    }),
                )
                .into());
            }
            warn!(package = %package, "no custom wheel in base directory; leaving its wheels untouched");
            plans.push(PackagePlan {
                package: package.clone(),
                custom_wheel: None,
                custom_version: None,
                kept: Vec::new(),
                deleted: Vec::new(),
                custom_found: false,
                status: PackageStatus::SkippedNoBase,
                delete_paths: Vec::new(),
            });
            continue;
        };

        let custom_version = base.version();
        let (kept, deleted): (Vec<&WheelEntry>, Vec<&WheelEntry>) = wheels_named(all_wheels, package)
            .into_iter()
            .partition(|wheel| wheel.version() == custom_version);
        let custom_found = kept.iter().any(|wheel| wheel.filename == base.filename);
        if !custom_found {
            warn!(
                package = %package,
                expected = %base.filename,
                "custom wheel not found among the kept wheels"
            );
        }
        plans.push(PackagePlan {
            package: package.clone(),
            custom_wheel: Some(base.filename.clone()),
            custom_version: Some(custom_version.to_string()),
            kept: kept.iter().map(|wheel| wheel.filename.clone()).collect(),
            deleted: deleted.iter().map(|wheel| wheel.filename.clone()).collect(),
            custom_found,
            status: if custom_found {
                PackageStatus::Cleaned
            } else {
                PackageStatus::CustomMissing
            },
            delete_paths: deleted.iter().map(|wheel| wheel.path.clone()).collect(),
        });
    }
    Ok(plans)
}

fn remove_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>, dry_run: bool) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        if dry_run {
            info!(path = %path.display(), "would remove");
        } else {
            fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
            debug!(path = %path.display(), "removed");
        }
        removed += 1;
    }
    Ok(removed)
}

/// Prunes the combined wheel directory to the custom build of every tracked
/// package, optionally followed by vLLM disambiguation.
///
/// # Errors
/// Returns an error if a directory cannot be read or a wheel cannot be removed.
pub fn dedupe_wheels(ctx: &CommandContext, request: &DedupeRequest) -> Result<ExecutionOutcome> {
    ensure_directory(&request.base_dir, "base wheels")?;
    ensure_directory(&request.all_dir, "all wheels")?;

    let tracked: Vec<String> = match (&request.packages, request.extended) {
        (Some(packages), _) => packages.clone(),
        (None, true) => EXTENDED_TRACKED_PACKAGES
            .iter()
            .map(ToString::to_string)
            .collect(),
        (None, false) => ctx.config().dedupe().tracked.clone(),
    };
    let policy = request
        .missing_base
        .unwrap_or(ctx.config().dedupe().missing_base);

    let base_wheels = list_wheels(&request.base_dir)?;
    let all_wheels = list_wheels(&request.all_dir)?;
    info!(
        tracked = %tracked.join(","),
        missing_base = %policy,
        base = base_wheels.len(),
        combined = all_wheels.len(),
        "planning cleanup"
    );

    let plans = plan_package_cleanup(
        &base_wheels,
        &all_wheels,
        &tracked,
        policy,
        &request.base_dir,
    )?;
    let disambiguation: Option<DisambiguationPlan> = if request.disambiguate {
        let settings = ctx.config().disambiguate();
        let probe = select_probe(ctx, None)?;
        Some(plan_disambiguation(
            &base_wheels,
            &all_wheels,
            &settings.package,
            &settings.pins,
            probe.as_ref(),
            request.ambiguity,
        )?)
    } else {
        None
    };

    let mut deleted_count =
        remove_paths(plans.iter().flat_map(|plan| &plan.delete_paths), request.dry_run)?;
    if let Some(plan) = &disambiguation {
        deleted_count += remove_paths(&plan.delete, request.dry_run)?;
    }
    let remaining_count = all_wheels.len().saturating_sub(deleted_count);

    let verb = if request.dry_run { "would remove" } else { "removed" };
    let mut lines = vec![format!(
        "{verb} {deleted_count} wheel(s); {remaining_count} remain in {}",
        request.all_dir.display()
    )];
    lines.extend(plans.iter().map(|plan| format!("  {}", plan.summary_line())));
    if let Some(plan) = &disambiguation {
        lines.push(format!("  {}", plan.summary_line()));
    }
    let prefix = if request.dry_run { "[dry-run] " } else { "" };

    Ok(ExecutionOutcome::success(
        format!("{prefix}{}", lines.join("\n")),
        json!({
            "packages": plans,
            "disambiguation": disambiguation.as_ref().map(DisambiguationPlan::to_json),
            "deleted_count": deleted_count,
            "remaining_count": remaining_count,
            "missing_base": policy,
            "dry_run": request.dry_run,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, GlobalOptions};
    use crate::effects::SystemEffects;
    use crate::wheels::scan::test_support::{names, touch, write_wheel_with_metadata};

    const TAGS: &str = "cp312-cp312-linux_x86_64.whl";

    fn wheel(name: &str, version: &str) -> String {
        format!("{name}-{version}-{TAGS}")
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        base: PathBuf,
        all: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("base");
        let all = temp.path().join("all");
        fs::create_dir_all(&base).expect("base");
        fs::create_dir_all(&all).expect("all");
        for (name, version) in [("torch", "2.9.0+git1c57644"), ("triton", "3.4.0")] {
            touch(&base, &wheel(name, version));
        }
        for (name, version) in [
            ("torch", "2.9.0+git1c57644"),
            ("torch", "2.8.0"),
            ("triton", "3.4.0"),
            ("triton", "3.3.1"),
            ("triton_kernels", "1.0.0"),
            ("numpy", "2.1.0"),
        ] {
            touch(&all, &wheel(name, version));
        }
        Fixture {
            _temp: temp,
            base,
            all,
        }
    }

    fn request(fixture: &Fixture) -> DedupeRequest {
        DedupeRequest {
            base_dir: fixture.base.clone(),
            all_dir: fixture.all.clone(),
            packages: Some(vec!["torch".into(), "triton".into()]),
            ..DedupeRequest::default()
        }
    }

    fn run(request: &DedupeRequest) -> Result<ExecutionOutcome> {
        let global = GlobalOptions::default();
        let ctx = CommandContext::for_tests(
            &global,
            &[],
            Config::default(),
            Arc::new(SystemEffects::new()),
        );
        dedupe_wheels(&ctx, request)
    }

    #[test]
    fn keeps_one_wheel_per_tracked_package() -> Result<()> {
        let fixture = fixture();
        let outcome = run(&request(&fixture))?;

        assert_eq!(
            names(&fixture.all),
            vec![
                wheel("numpy", "2.1.0"),
                wheel("torch", "2.9.0+git1c57644"),
                wheel("triton", "3.4.0"),
                wheel("triton_kernels", "1.0.0"),
            ]
        );
        assert_eq!(outcome.details["deleted_count"], 2);
        assert_eq!(outcome.details["remaining_count"], 4);
        assert_eq!(outcome.details["packages"][0]["custom_found"], true);
        Ok(())
    }

    #[test]
    fn second_run_is_idempotent() -> Result<()> {
        let fixture = fixture();
        let first = run(&request(&fixture))?;
        let second = run(&request(&fixture))?;
        assert_eq!(second.details["deleted_count"], 0);
        assert_eq!(
            second.details["remaining_count"],
            first.details["remaining_count"]
        );
        Ok(())
    }

    #[test]
    fn strict_policy_fails_before_deleting_anything() -> Result<()> {
        let fixture = fixture();
        touch(&fixture.all, &wheel("amdsmi", "7.0.0"));
        let mut request = request(&fixture);
        request.packages = Some(vec!["torch".into(), "amdsmi".into(), "triton".into()]);

        let err = run(&request).expect_err("strict");
        let user = err.downcast_ref::<UserError>().expect("user error");
        assert_eq!(user.details()["reason"], reasons::MISSING_BASE_WHEEL);
        assert_eq!(user.details()["package"], "amdsmi");
        assert_eq!(names(&fixture.all).len(), 7);
        Ok(())
    }

    #[test]
    fn lenient_policy_leaves_unreferenced_packages_alone() -> Result<()> {
        let fixture = fixture();
        touch(&fixture.all, &wheel("amdsmi", "7.0.0"));
        touch(&fixture.all, &wheel("amdsmi", "6.4.0"));
        let mut request = request(&fixture);
        request.packages = Some(vec!["torch".into(), "amdsmi".into()]);
        request.missing_base = Some(MissingBasePolicy::Lenient);

        let outcome = run(&request)?;
        let remaining = names(&fixture.all);
        assert!(remaining.contains(&wheel("amdsmi", "7.0.0")));
        assert!(remaining.contains(&wheel("amdsmi", "6.4.0")));
        assert!(!remaining.contains(&wheel("torch", "2.8.0")));
        assert_eq!(outcome.details["packages"][1]["status"], "skipped_no_base");
        Ok(())
    }

    #[test]
    fn reports_missing_custom_wheel_without_halting() -> Result<()> {
        let fixture = fixture();
        fs::remove_file(fixture.all.join(wheel("triton", "3.4.0")))?;
        let outcome = run(&request(&fixture))?;
        assert_eq!(outcome.details["packages"][1]["custom_found"], false);
        assert_eq!(outcome.details["packages"][1]["status"], "custom_missing");
        assert!(!names(&fixture.all).contains(&wheel("triton", "3.3.1")));
        Ok(())
    }

    #[test]
    fn dry_run_deletes_nothing() -> Result<()> {
        let fixture = fixture();
        let mut request = request(&fixture);
        request.dry_run = true;
        let outcome = run(&request)?;
        assert_eq!(outcome.details["deleted_count"], 2);
        assert_eq!(names(&fixture.all).len(), 6);
        assert!(outcome.message.starts_with("[dry-run]"));
        Ok(())
    }

    #[test]
    fn disambiguation_runs_after_package_cleanup() -> Result<()> {
        let fixture = fixture();
        let good = wheel("vllm", "1.0");
        let bad = wheel("vllm", "0.9");
        write_wheel_with_metadata(
            &fixture.all,
            &good,
            "Name: vllm\nVersion: 1.0\nRequires-Dist: torch==2.9.0+git1c57644\nRequires-Dist: triton==3.4.0\n",
        );
        write_wheel_with_metadata(
            &fixture.all,
            &bad,
            "Name: vllm\nVersion: 0.9\nRequires-Dist: torch==2.8.0\nRequires-Dist: triton==3.3.1\n",
        );
        let mut request = request(&fixture);
        request.disambiguate = true;

        let outcome = run(&request)?;
        let remaining = names(&fixture.all);
        assert!(remaining.contains(&good));
        assert!(!remaining.contains(&bad));
        assert_eq!(outcome.details["disambiguation"]["status"], "verified");
        assert_eq!(outcome.details["deleted_count"], 3);
        Ok(())
    }

    #[test]
    fn missing_directories_are_user_errors() {
        let request = DedupeRequest {
            base_dir: PathBuf::from("/definitely/missing/base"),
            all_dir: PathBuf::from("/definitely/missing/all"),
            ..DedupeRequest::default()
        };
        let err = run(&request).expect_err("missing dir");
        assert!(err.downcast_ref::<UserError>().is_some());
    }
}
