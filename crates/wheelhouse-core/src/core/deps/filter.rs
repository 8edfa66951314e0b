use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use wheelhouse_domain::normalize_package_name;

use crate::diagnostics::reasons;
use crate::effects::Invocation;
use crate::outcome::{ExecutionOutcome, UserError};
use crate::CommandContext;

/// Packages preinstalled by the distribution image; PyPI has no usable wheels.
const SYSTEM_PACKAGES: [&str; 6] = [
    "dbus-python",
    "pygobject",
    "pycairo",
    "distro",
    "secretstorage",
    "jeepney",
];

const PIP_SHOW_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct FilterRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub check_location: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ExclusionReason {
    Blacklisted,
    SystemLocation,
}

#[derive(Debug, Clone, Serialize)]
struct Excluded {
    line: String,
    reason: ExclusionReason,
}

/// Drops system packages from a dependency listing and writes the rest.
///
/// # Errors
/// Returns an error when the input cannot be read or the output written.
pub fn filter_system_packages(
    ctx: &CommandContext,
    request: &FilterRequest,
) -> Result<ExecutionOutcome> {
    if !request.input.is_file() {
        return Err(UserError::new(
            format!("input file not found: {}", request.input.display()),
            json!({
                "reason": reasons::MISSING_INPUT,
                "path": request.input.display().to_string(),
            }),
        )
        .into());
    }
    let contents = fs::read_to_string(&request.input)
        .with_context(|| format!("reading {}", request.input.display()))?;

    let mut total = 0usize;
    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    for line in contents.lines() {
        total += 1;
        let Some(name) = leading_name(line) else {
            continue;
        };
        let name = normalize_package_name(name);
        let reason = if SYSTEM_PACKAGES.contains(&name.as_str()) {
            Some(ExclusionReason::Blacklisted)
        } else if request.check_location && installed_in_system_location(ctx, &name) {
            Some(ExclusionReason::SystemLocation)
        } else {
            None
        };
        match reason {
            Some(reason) => {
                info!(package = %name, ?reason, "excluding system package");
                excluded.push(Excluded {
                    line: line.trim().to_string(),
                    reason,
                });
            }
            None => kept.push(line),
        }
    }

    let mut rendered = kept.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    fs::write(&request.output, rendered)
        .with_context(|| format!("writing {}", request.output.display()))?;

    let mut lines = vec![
        "Filtering summary:".to_string(),
        format!("  Total dependencies: {total}"),
        format!("  Excluded: {}", excluded.len()),
    ];
    lines.extend(excluded.iter().map(|entry| format!("    - {}", entry.line)));
    lines.push(format!("  Remaining: {}", kept.len()));
    lines.push(format!(
        "Filtered dependencies written to: {}",
        request.output.display()
    ));

    Ok(ExecutionOutcome::success(
        lines.join("\n"),
        json!({
            "input": request.input.display().to_string(),
            "output": request.output.display().to_string(),
            "total": total,
            "excluded": excluded,
            "remaining": kept.len(),
        }),
    ))
}

/// The project name a listing line starts with; indented or decorated lines
/// carry none.
fn leading_name(line: &str) -> Option<&str> {
    let end = line
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
        .unwrap_or(line.len());
    (end > 0).then(|| &line[..end])
}

fn installed_in_system_location(ctx: &CommandContext, package: &str) -> bool {
    let invocation = Invocation::new(ctx.config().tools().python.clone())
        .args(["-m", "pip", "show", package])
        .timeout(Some(PIP_SHOW_TIMEOUT));
    match ctx.runner().run(&invocation) {
        Ok(output) => output.stdout.contains("/dist-packages"),
        Err(err) => {
            debug!(package, %err, "pip show failed; keeping package");
            false
        }
    }
}
