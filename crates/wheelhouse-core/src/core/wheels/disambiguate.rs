use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::probe::{CommandMetadataProbe, MetadataProbe, ZipMetadataProbe};
use super::scan::{find_base_wheel, list_wheels, wheels_named, WheelEntry};
use crate::config::AmbiguityPolicy;
use crate::diagnostics::reasons;
use crate::fs::ensure_directory;
use crate::CommandContext;
use crate::outcome::{ExecutionOutcome, UserError};

#[derive(Debug, Clone, Default)]
pub struct DisambiguateRequest {
    pub base_dir: PathBuf,
    pub all_dir: PathBuf,
    pub package: Option<String>,
    pub pins: Option<Vec<String>>,
    pub metadata_command: Option<Vec<String>>,
    pub ambiguity: AmbiguityPolicy,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DisambiguationStatus {
    NoCandidates,
    SingleCandidate,
    Verified,
    KeptFirst,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CandidateReport {
    pub(crate) filename: String,
    pub(crate) verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) probe_error: Option<String>,
}

/// The keep/delete decision for one package, computed before anything is removed.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DisambiguationPlan {
    pub(crate) package: String,
    pub(crate) expected: Vec<(String, String)>,
    pub(crate) status: DisambiguationStatus,
    pub(crate) candidates: Vec<CandidateReport>,
    pub(crate) kept: Option<String>,
    #[serde(skip)]
    pub(crate) delete: Vec<PathBuf>,
}

impl DisambiguationPlan {
    pub(crate) fn deleted_names(&self) -> Vec<String> {
        self.delete
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    pub(crate) fn summary_line(&self) -> String {
        match (self.status, &self.kept) {
            (DisambiguationStatus::NoCandidates, _) => {
                format!("{}: no wheels to disambiguate", self.package)
            }
            (DisambiguationStatus::SingleCandidate, Some(kept)) => {
                let verified = self.candidates.first().is_some_and(|c| c.verified);
                let note = if verified { "verified" } else { "NOT verified" };
                format!("{}: single wheel {kept} kept ({note})", self.package)
            }
            (_, Some(kept)) => format!(
                "{}: kept {kept}, removed {}",
                self.package,
                self.delete.len()
            ),
            (_, None) => format!("{}: nothing kept", self.package),
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        json!({
            "package": self.package,
            "status": self.status,
            "expected": self
                .expected
                .iter()
                .map(|(name, version)| json!({ "package": name, "version": version }))
                .collect::<Vec<_>>(),
            "candidates": self.candidates,
            "kept": self.kept,
            "deleted": self.deleted_names(),
        })
    }
}

/// Decides which `package` wheel in `all_wheels` declares exact pins on the
/// base versions of `pins`.
///
/// Nothing is deleted here. Missing pin references and candidate sets that
/// cannot be narrowed to one verified wheel are [`UserError`]s unless the
/// policy allows keeping the first candidate.
pub(crate) fn plan_disambiguation(
    base_wheels: &[WheelEntry],
    all_wheels: &[WheelEntry],
    package: &str,
    pins: &[String],
    probe: &dyn MetadataProbe,
    policy: AmbiguityPolicy,
) -> Result<DisambiguationPlan> {
    let candidates = wheels_named(all_wheels, package);
    if candidates.is_empty() {
        warn!(package, "no wheels found to disambiguate");
        let expected = pins
            .iter()
            .filter_map(|pin| {
                find_base_wheel(base_wheels, pin).map(|base| (pin.clone(), base.version().to_string()))
            })
            .collect();
        return Ok(DisambiguationPlan {
            package: package.to_string(),
            expected,
            status: DisambiguationStatus::NoCandidates,
            candidates: Vec::new(),
            kept: None,
            delete: Vec::new(),
        });
    }

    let mut expected = Vec::with_capacity(pins.len());
    for pin in pins {
        let base = find_base_wheel(base_wheels, pin).ok_or_else(|| {
            UserError::new(
                format!("no base wheel for `{pin}`; cannot tell which {package} wheel is ours"),
                json!({
                    "reason": reasons::MISSING_PIN_REFERENCE,
                    "package": pin,
                    "hint": format!("Place the custom {pin} wheel in the base wheels directory."),
                }),
            )
        })?;
        expected.push((pin.clone(), base.version().to_string()));
    }

    let reports: Vec<CandidateReport> = candidates
        .iter()
        .map(|candidate| verify_candidate(candidate, &expected, probe))
        .collect();

    if let [only] = candidates.as_slice() {
        if !reports[0].verified {
            warn!(
                package,
                wheel = %only.filename,
                "the only wheel does not declare the expected pins; keeping it"
            );
        }
        return Ok(DisambiguationPlan {
            package: package.to_string(),
            expected,
            status: DisambiguationStatus::SingleCandidate,
            candidates: reports,
            kept: Some(only.filename.clone()),
            delete: Vec::new(),
        });
    }

    let verified: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, report)| report.verified)
        .map(|(index, _)| index)
        .collect();

    let (keep_index, status) = match (verified.as_slice(), policy) {
        ([index], _) => (*index, DisambiguationStatus::Verified),
        (_, AmbiguityPolicy::KeepFirst) => {
            let index = verified.first().copied().unwrap_or(0);
            warn!(
                package,
                wheel = %candidates[index].filename,
                verified = verified.len(),
                "could not single out one verified wheel; keeping the first"
            );
            (index, DisambiguationStatus::KeptFirst)
        }
        ([], AmbiguityPolicy::Fail) => {
            return Err(ambiguity_error(
                format!("none of the {} {package} wheels pins the base versions", candidates.len()),
                reasons::NO_PINNED_CANDIDATE,
                package,
                &expected,
                &reports,
            ));
        }
        (_, AmbiguityPolicy::Fail) => {
            return Err(ambiguity_error(
                format!(
                    "{} of the {package} wheels pin the base versions; refusing to guess",
                    verified.len()
                ),
                reasons::AMBIGUOUS_CANDIDATES,
                package,
                &expected,
                &reports,
            ));
        }
    };

    let delete = candidates
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != keep_index)
        .map(|(_, candidate)| candidate.path.clone())
        .collect();
    Ok(DisambiguationPlan {
        package: package.to_string(),
        expected,
        status,
        candidates: reports,
        kept: Some(candidates[keep_index].filename.clone()),
        delete,
    })
}

fn verify_candidate(
    candidate: &WheelEntry,
    expected: &[(String, String)],
    probe: &dyn MetadataProbe,
) -> CandidateReport {
    match probe.probe(&candidate.path) {
        Ok(report) => {
            let verified = expected
                .iter()
                .all(|(name, version)| report.pins(name, version));
            debug!(wheel = %candidate.filename, verified, "probed");
            CandidateReport {
                filename: candidate.filename.clone(),
                verified,
                probe_error: None,
            }
        }
        Err(err) => {
            warn!(wheel = %candidate.filename, error = %format!("{err:#}"), "metadata probe failed");
            CandidateReport {
                filename: candidate.filename.clone(),
                verified: false,
                probe_error: Some(format!("{err:#}")),
            }
        }
    }
}

fn ambiguity_error(
    message: String,
    reason: &str,
    package: &str,
    expected: &[(String, String)],
    reports: &[CandidateReport],
) -> anyhow::Error {
    UserError::new(
        message,
        json!({
            "reason": reason,
            "package": package,
            "expected": expected
                .iter()
                .map(|(name, version)| format!("{name}=={version}"))
                .collect::<Vec<_>>(),
            "candidates": reports,
            "hint": "Inspect the candidates with `wheelhouse inspect`, or rerun with --keep-first to keep the first in filename order.",
        }),
    )
    .into()
}

/// Removes the planned deletions; returns how many files were removed.
pub(crate) fn apply_plan(plan: &DisambiguationPlan, dry_run: bool) -> Result<usize> {
    for path in &plan.delete {
        if dry_run {
            info!(path = %path.display(), "would remove");
            continue;
        }
        fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        debug!(path = %path.display(), "removed");
    }
    Ok(plan.delete.len())
}

/// Builds the probe the context is configured for.
pub(crate) fn select_probe<'a>(
    ctx: &'a CommandContext,
    command_override: Option<&[String]>,
) -> Result<Box<dyn MetadataProbe + 'a>> {
    let command = command_override
        .map(<[String]>::to_vec)
        .or_else(|| ctx.config().disambiguate().metadata_command.clone());
    Ok(match command {
        Some(command) => Box::new(CommandMetadataProbe::new(
            ctx.runner(),
            command,
            ctx.command_timeout(),
        )?),
        None => Box::new(ZipMetadataProbe),
    })
}

/// Keeps the one wheel of the disambiguated package (vLLM by default) that
/// pins the custom torch/triton builds, removing the others.
///
/// # Errors
/// Returns an error if the directories cannot be read or a wheel cannot be removed.
pub fn disambiguate_wheels(
    ctx: &CommandContext,
    request: &DisambiguateRequest,
) -> Result<ExecutionOutcome> {
    ensure_directory(&request.base_dir, "base wheels")?;
    ensure_directory(&request.all_dir, "all wheels")?;
    let settings = ctx.config().disambiguate();
    let package = request
        .package
        .clone()
        .unwrap_or_else(|| settings.package.clone());
    let pins = request.pins.clone().unwrap_or_else(|| settings.pins.clone());

    let base_wheels = list_wheels(&request.base_dir)?;
    let all_wheels = list_wheels(&request.all_dir)?;
    let probe = select_probe(ctx, request.metadata_command.as_deref())?;
    info!(package = %package, candidates = wheels_named(&all_wheels, &package).len(), "disambiguating");
    let plan = plan_disambiguation(
        &base_wheels,
        &all_wheels,
        &package,
        &pins,
        probe.as_ref(),
        request.ambiguity,
    )?;
    let removed = apply_plan(&plan, request.dry_run)?;

    let mut details = plan.to_json();
    details["dry_run"] = json!(request.dry_run);
    details["deleted_count"] = json!(removed);
    let prefix = if request.dry_run { "[dry-run] " } else { "" };
    Ok(ExecutionOutcome::success(
        format!("{prefix}{}", plan.summary_line()),
        details,
    ))
}
