use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexSet;

use crate::names::normalize_package_name;

/// Extracts the normalized project name from a requirement string, ignoring
/// extras, specifiers and markers.
pub fn dependency_name(spec: &str) -> String {
    let trimmed = strip_wrapping_quotes(spec.trim());
    let mut end = trimmed.len();
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_ascii_whitespace() || matches!(ch, '<' | '>' | '=' | '!' | '~' | ';' | '@' | '(')
        {
            end = idx;
            break;
        }
    }
    let head = &trimmed[..end];
    let base = head.split('[').next().unwrap_or(head);
    normalize_package_name(base)
}

/// A requirement string split into its textual parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementParts {
    pub name: String,
    pub extras: Vec<String>,
    pub specifier: String,
    pub marker: Option<String>,
}

/// Splits `name[extra,...] <specifier> ; <marker>` without validating the
/// specifier grammar; callers parse `specifier` as PEP 440 when they need to.
pub fn split_requirement(spec: &str) -> RequirementParts {
    let trimmed = strip_wrapping_quotes(spec.trim());
    let (body, marker) = match trimmed.split_once(';') {
        Some((body, marker)) => (body.trim(), Some(marker.trim().to_string())),
        None => (trimmed, None),
    };
    let name_end = body
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
        .unwrap_or(body.len());
    let raw_name = &body[..name_end];
    let mut rest = body[name_end..].trim_start();
    let mut extras = Vec::new();
    if let Some(after) = rest.strip_prefix('[') {
        if let Some((inner, tail)) = after.split_once(']') {
            extras = inner
                .split(',')
                .map(str::trim)
                .filter(|extra| !extra.is_empty())
                .map(ToString::to_string)
                .collect();
            rest = tail.trim_start();
        }
    }
    let specifier = rest
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
        .to_string();
    RequirementParts {
        name: normalize_package_name(raw_name),
        extras,
        specifier,
        marker: marker.filter(|value| !value.is_empty()),
    }
}

/// Drops a trailing `# comment`. Requirement lines carry no quoted `#`.
pub fn strip_inline_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(head, _)| head).trim()
}

/// Returns the requirement carried by one requirements-file line, if any.
pub fn parse_requirement_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let requirement = strip_inline_comment(trimmed);
    if requirement.is_empty() {
        None
    } else {
        Some(requirement)
    }
}

/// Reads a requirements file, following `-r <file>` includes relative to the
/// including file. Duplicate requirement lines are kept once, in first-seen
/// order.
pub fn read_requirements_file(path: &Path) -> Result<Vec<String>> {
    let mut seen_files = HashSet::new();
    let mut requirements = IndexSet::new();
    collect_requirements(path, &mut seen_files, &mut requirements)?;
    Ok(requirements.into_iter().collect())
}

fn collect_requirements(
    path: &Path,
    seen_files: &mut HashSet<PathBuf>,
    requirements: &mut IndexSet<String>,
) -> Result<()> {
    let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen_files.insert(key) {
        return Ok(());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(include) = trimmed
            .strip_prefix("-r ")
            .or_else(|| trimmed.strip_prefix("--requirement "))
        {
            let included = path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(strip_inline_comment(include));
            collect_requirements(&included, seen_files, requirements)?;
            continue;
        }
        if trimmed.starts_with('-') {
            continue;
        }
        if let Some(requirement) = parse_requirement_line(trimmed) {
            requirements.insert(requirement.to_string());
        }
    }
    Ok(())
}

fn strip_wrapping_quotes(input: &str) -> &str {
    if input.len() >= 2 {
        let bytes = input.as_bytes();
        let first = bytes[0];
        let last = bytes[input.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &input[1..input.len() - 1];
        }
    }
    input
}
