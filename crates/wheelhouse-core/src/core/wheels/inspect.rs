use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use wheelhouse_domain::{CriticalDependency, CRITICAL_PACKAGES};

use super::probe::read_wheel_metadata;
use crate::outcome::ExecutionOutcome;
use crate::CommandContext;

const LOOSE_PREVIEW: usize = 10;

#[derive(Debug, Clone)]
pub struct InspectRequest {
    pub wheel: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Diagnosis {
    AllPinned,
    SomeUnpinned,
    NoCriticalDependencies,
}

impl Diagnosis {
    fn classify(critical: &[CriticalDependency]) -> Self {
        if critical.is_empty() {
            Self::NoCriticalDependencies
        } else if critical.iter().all(CriticalDependency::is_pinned) {
            Self::AllPinned
        } else {
            Self::SomeUnpinned
        }
    }

    fn explain(self) -> &'static [&'static str] {
        match self {
            Self::AllPinned => &[
                "✓ All critical ROCm packages are pinned to exact versions",
                "If pip still installs other versions, check that the index holds only the custom wheels",
                "and that transitive dependencies do not pull in stock builds.",
            ],
            Self::SomeUnpinned => &[
                "✗ Some critical packages are NOT pinned to exact versions",
                "Check that the install directory held the custom wheels during the build",
                "and that `wheelhouse pin` rewrote the project's dependencies.",
            ],
            Self::NoCriticalDependencies => &[
                "✗ Critical ROCm packages NOT FOUND in dependencies",
                "The wheel declares no torch/triton dependency at all; check that it was built for ROCm.",
            ],
        }
    }
}

/// Reports whether a wheel pins the critical ROCm packages exactly.
///
/// # Errors
/// Returns an error when the wheel is missing, is not a zip archive, or has no
/// usable `METADATA`.
pub fn inspect_wheel(_ctx: &CommandContext, request: &InspectRequest) -> Result<ExecutionOutcome> {
    let metadata = read_wheel_metadata(&request.wheel)?;
    let critical = metadata.critical_dependencies(&CRITICAL_PACKAGES);
    let loose = metadata.loose_dependencies(&CRITICAL_PACKAGES);
    let diagnosis = Diagnosis::classify(&critical);
    info!(
        wheel = %request.wheel.display(),
        dependencies = metadata.requires_dist.len(),
        critical = critical.len(),
        "inspected metadata"
    );

    let wheel_name = request
        .wheel
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut lines = vec![
        format!("Analyzing wheel: {wheel_name}"),
        format!("Package: {}", metadata.name),
        format!("Version: {}", metadata.version),
        format!("Total dependencies: {}", metadata.requires_dist.len()),
        String::new(),
        "Critical ROCm dependencies (should be pinned to exact versions):".to_string(),
    ];
    if critical.is_empty() {
        lines.push("  none found".to_string());
    }
    for dep in &critical {
        if dep.is_pinned() {
            lines.push(format!("  ✓ {}", dep.requirement));
        } else {
            lines.push(format!("  ✗ {}  <-- NOT PINNED!", dep.requirement));
        }
    }
    lines.push(String::new());
    lines.push("Other dependencies with loose constraints:".to_string());
    for dep in loose.iter().take(LOOSE_PREVIEW) {
        lines.push(format!("  {dep}"));
    }
    if loose.len() > LOOSE_PREVIEW {
        lines.push(format!("  ... and {} more", loose.len() - LOOSE_PREVIEW));
    }
    lines.push(String::new());
    lines.push("Diagnosis:".to_string());
    lines.extend(diagnosis.explain().iter().map(|line| format!("  {line}")));

    Ok(ExecutionOutcome::success(
        lines.join("\n"),
        json!({
            "wheel": request.wheel.display().to_string(),
            "name": metadata.name,
            "version": metadata.version,
            "dependency_count": metadata.requires_dist.len(),
            "critical": critical,
            "loose": loose.iter().take(LOOSE_PREVIEW).collect::<Vec<_>>(),
            "loose_total": loose.len(),
            "diagnosis": diagnosis,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, GlobalOptions};
    use crate::effects::SystemEffects;
    use crate::outcome::UserError;
    use crate::wheels::scan::test_support::write_wheel_with_metadata;

    fn run(wheel: PathBuf) -> Result<ExecutionOutcome> {
        let global = GlobalOptions::default();
        let ctx = CommandContext::for_tests(
            &global,
            &[],
            Config::default(),
            Arc::new(SystemEffects::new()),
        );
        inspect_wheel(&ctx, &InspectRequest { wheel })
    }

    #[test]
    fn reports_pinned_and_loose_dependencies() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut metadata = String::from(
            "Name: vllm\nVersion: 0.11.0\nRequires-Dist: torch==2.9.0\nRequires-Dist: triton>=3.0\n",
        );
        for index in 0..12 {
            metadata.push_str(&format!("Requires-Dist: dep{index}>=1.0\n"));
        }
        let wheel = write_wheel_with_metadata(
            temp.path(),
            "vllm-0.11.0-cp312-cp312-linux_x86_64.whl",
            &metadata,
        );

        let outcome = run(wheel)?;
        assert_eq!(outcome.details["dependency_count"], 14);
        assert_eq!(outcome.details["diagnosis"], "some_unpinned");
        assert_eq!(outcome.details["loose_total"], 12);
        assert!(outcome.message.contains("✓ torch==2.9.0"));
        assert!(outcome.message.contains("✗ triton>=3.0  <-- NOT PINNED!"));
        assert!(outcome.message.contains("... and 2 more"));
        Ok(())
    }

    #[test]
    fn no_critical_dependencies_is_diagnosed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let wheel = write_wheel_with_metadata(
            temp.path(),
            "vllm-0.11.0-cp312-cp312-linux_x86_64.whl",
            "Name: vllm\nVersion: 0.11.0\nRequires-Dist: numpy\n",
        );
        let outcome = run(wheel)?;
        assert_eq!(outcome.details["diagnosis"], "no_critical_dependencies");
        Ok(())
    }

    #[test]
    fn missing_wheel_is_a_user_error() {
        let err = run(PathBuf::from("/definitely/missing.whl")).expect_err("missing");
        assert!(err.downcast_ref::<UserError>().is_some());
    }
}
