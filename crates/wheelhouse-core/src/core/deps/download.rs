use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use pep440_rs::{Version, VersionSpecifiers};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use wheelhouse_domain::{read_requirements_file, split_requirement, RequirementParts};

use crate::diagnostics::reasons;
use crate::effects::Invocation;
use crate::outcome::{ExecutionOutcome, UserError};
use crate::progress::ProgressReporter;
use crate::wheels::scan::list_wheels;
use crate::CommandContext;

/// Built from source alongside the wheelhouse; never fetched from PyPI.
const SOURCE_BUILT: [&str; 6] = ["torch", "torchvision", "torchaudio", "triton", "amdsmi", "vllm"];

/// Runtime packages (direct and transitive) the index must carry.
const CRITICAL_RUNTIME_PACKAGES: [&str; 14] = [
    "regex",
    "numpy",
    "transformers",
    "tokenizers",
    "protobuf",
    "pydantic",
    "aiohttp",
    "requests",
    "tqdm",
    "fastapi",
    "typing-extensions",
    "packaging",
    "pyyaml",
    "anyio",
];

pub const DEFAULT_MAX_VERSIONS: usize = 3;

/// Per-download cap when `WHEELHOUSE_COMMAND_TIMEOUT` is unset.
const PIP_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub requirements: PathBuf,
    pub output_dir: PathBuf,
    pub max_versions: usize,
}

#[derive(Debug, Clone, Serialize)]
struct RequirementReport {
    requirement: String,
    name: String,
    matching: usize,
    attempted: Vec<String>,
    failed: Vec<String>,
    skipped: bool,
}

/// Downloads wheels for every requirement, sampling several versions when a
/// range allows more than one.
///
/// # Errors
/// Returns an error when the requirements file is missing or unreadable, or
/// when a critical runtime package is absent from the output directory after
/// all downloads ran.
pub fn download_dependencies(
    ctx: &CommandContext,
    request: &DownloadRequest,
) -> Result<ExecutionOutcome> {
    if !request.requirements.is_file() {
        return Err(UserError::new(
            format!(
                "requirements file not found: {}",
                request.requirements.display()
            ),
            json!({
                "reason": reasons::MISSING_INPUT,
                "path": request.requirements.display().to_string(),
            }),
        )
        .into());
    }
    let requirements = read_requirements_file(&request.requirements)?;
    info!(
        count = requirements.len(),
        path = %request.requirements.display(),
        "parsed requirements"
    );
    fs::create_dir_all(&request.output_dir)
        .with_context(|| format!("creating {}", request.output_dir.display()))?;

    let progress = ProgressReporter::bar("downloading dependency wheels", requirements.len());
    let mut reports = Vec::with_capacity(requirements.len());
    for requirement in &requirements {
        progress.set_label(format!("downloading {requirement}"));
        reports.push(process_requirement(ctx, request, requirement));
        progress.increment();
    }
    let downloaded = downloaded_packages(request)?;
    progress.finish(format!("{} wheels in output directory", downloaded.wheels));

    let missing: Vec<&str> = CRITICAL_RUNTIME_PACKAGES
        .iter()
        .copied()
        .filter(|name| !downloaded.names.contains(*name))
        .collect();
    if !missing.is_empty() {
        return Err(UserError::new(
            format!("missing critical packages: {}", missing.join(", ")),
            json!({
                "reason": reasons::MISSING_CRITICAL_PACKAGES,
                "missing": missing,
                "downloaded": downloaded.names,
                "hint": "Check the download warnings above; these packages are required at runtime.",
            }),
        )
        .into());
    }

    let failed: usize = reports.iter().map(|report| report.failed.len()).sum();
    let message = format!(
        "downloaded {} wheels to {} ({} requirements, {} failed downloads)",
        downloaded.wheels,
        request.output_dir.display(),
        requirements.len(),
        failed
    );
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "output_dir": request.output_dir.display().to_string(),
            "wheels": downloaded.wheels,
            "requirements": reports,
            "failed": failed,
        }),
    ))
}

fn process_requirement(
    ctx: &CommandContext,
    request: &DownloadRequest,
    requirement: &str,
) -> RequirementReport {
    let parts = split_requirement(requirement);
    let mut report = RequirementReport {
        requirement: requirement.to_string(),
        name: parts.name.clone(),
        matching: 0,
        attempted: Vec::new(),
        failed: Vec::new(),
        skipped: false,
    };
    if SOURCE_BUILT.contains(&parts.name.as_str()) {
        info!(package = %parts.name, "skipping (built from source)");
        report.skipped = true;
        return report;
    }
    if let Some(marker) = &parts.marker {
        debug!(package = %parts.name, %marker, "requirement carries a marker");
    }

    let specifiers = if parts.specifier.is_empty() {
        None
    } else {
        match VersionSpecifiers::from_str(&parts.specifier) {
            Ok(specifiers) => Some(specifiers),
            Err(err) => {
                warn!(%requirement, %err, "unparseable specifier; skipping requirement");
                report.skipped = true;
                return report;
            }
        }
    };
    let matching = matching_versions(ctx, &parts.name, specifiers.as_ref());
    report.matching = matching.len();
    let selected = match specifiers {
        Some(_) => select_versions(&matching, request.max_versions),
        None => matching.into_iter().take(1).collect(),
    };

    let specs: Vec<String> = if selected.is_empty() {
        info!(package = %parts.name, "no matching versions found; downloading latest");
        vec![package_spec(&parts, None)]
    } else {
        info!(
            package = %parts.name,
            matching = report.matching,
            selected = selected.len(),
            "downloading sampled versions"
        );
        selected
            .iter()
            .map(|version| package_spec(&parts, Some(version)))
            .collect()
    };
    for spec in specs {
        if !pip_download(ctx, request, &spec) {
            report.failed.push(spec.clone());
        }
        report.attempted.push(spec);
    }
    report
}

/// Released versions matching `specifiers`, newest first. Lookup failures
/// degrade to an empty list.
fn matching_versions(
    ctx: &CommandContext,
    package: &str,
    specifiers: Option<&VersionSpecifiers>,
) -> Vec<String> {
    let releases = match ctx.pypi().release_versions(package) {
        Ok(releases) => releases,
        Err(err) => {
            warn!(%package, %err, "could not fetch versions");
            return Vec::new();
        }
    };
    let mut matching: Vec<(Version, String)> = releases
        .into_iter()
        .filter_map(|raw| Version::from_str(&raw).ok().map(|version| (version, raw)))
        .filter(|(version, _)| specifiers.map_or(true, |spec| spec.contains(version)))
        .collect();
    matching.sort_by(|left, right| right.0.cmp(&left.0));
    matching.into_iter().map(|(_, raw)| raw).collect()
}

/// Picks the newest version, evenly spaced middle versions, and the oldest.
fn select_versions(versions: &[String], max_versions: usize) -> Vec<String> {
    let max_versions = max_versions.max(1);
    if versions.len() <= max_versions {
        return versions.to_vec();
    }
    let mut selected = vec![versions[0].clone()];
    if max_versions == 1 {
        return selected;
    }
    let step = versions.len() / (max_versions - 1);
    for index in 1..max_versions - 1 {
        let idx = (index * step).min(versions.len() - 1);
        selected.push(versions[idx].clone());
    }
    let oldest = &versions[versions.len() - 1];
    if !selected.contains(oldest) {
        selected.push(oldest.clone());
    }
    selected
}

fn package_spec(parts: &RequirementParts, version: Option<&str>) -> String {
    let mut spec = parts.name.clone();
    if !parts.extras.is_empty() {
        spec.push('[');
        spec.push_str(&parts.extras.join(","));
        spec.push(']');
    }
    if let Some(version) = version {
        spec.push_str("==");
        spec.push_str(version);
    }
    spec
}

fn pip_download(ctx: &CommandContext, request: &DownloadRequest, spec: &str) -> bool {
    let invocation = Invocation::new(ctx.config().tools().python.clone())
        .args(["-m", "pip", "download", "--prefer-binary", "--dest"])
        .arg(request.output_dir.display().to_string())
        .arg(spec)
        .timeout(ctx.command_timeout().or(Some(PIP_DOWNLOAD_TIMEOUT)))
        .streaming(!ctx.global.quiet);
    debug!(command = %invocation.display(), "running pip download");
    match ctx.runner().run(&invocation) {
        Ok(output) if output.success() => true,
        Ok(output) => {
            warn!(%spec, code = output.code, stderr = %output.stderr.trim(), "download failed");
            false
        }
        Err(err) => {
            warn!(%spec, %err, "download failed");
            false
        }
    }
}

struct Downloaded {
    wheels: usize,
    names: BTreeSet<String>,
}

fn downloaded_packages(request: &DownloadRequest) -> Result<Downloaded> {
    let wheels = list_wheels(&request.output_dir)?;
    Ok(Downloaded {
        wheels: wheels.len(),
        names: wheels.iter().map(|wheel| wheel.normalized_name()).collect(),
    })
}
