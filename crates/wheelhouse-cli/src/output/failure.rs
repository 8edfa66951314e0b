use serde_json::Value;
use wheelhouse_core::{diag_commands, CommandGroup, CommandInfo};

use super::hint_from_details;

pub(super) fn error_code(info: CommandInfo) -> &'static str {
    match info.group {
        CommandGroup::Dedupe => diag_commands::DEDUPE,
        CommandGroup::Disambiguate => diag_commands::DISAMBIGUATE,
        CommandGroup::Inspect => diag_commands::INSPECT,
        CommandGroup::Normalize => diag_commands::NORMALIZE,
        CommandGroup::Pin => diag_commands::PIN,
        CommandGroup::Filter => diag_commands::FILTER,
        CommandGroup::Download => diag_commands::DOWNLOAD,
        CommandGroup::Index => diag_commands::INDEX,
        CommandGroup::Upload => diag_commands::UPLOAD,
    }
}

pub(super) fn collect_why_bullets(details: &Value, fallback: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    if let Some(reason) = details.get("reason").and_then(Value::as_str) {
        add_bullet(
            &mut bullets,
            reason_display(reason).unwrap_or(reason).to_string(),
        );
    }
    for key in ["missing", "candidates"] {
        if let Some(items) = details.get(key).and_then(Value::as_array) {
            let names: Vec<&str> = items
                .iter()
                .filter_map(|item| item.as_str().or_else(|| item.get("filename")?.as_str()))
                .collect();
            if !names.is_empty() {
                add_bullet(&mut bullets, format!("{key}: {}", names.join(", ")));
            }
        }
    }
    let issues = details.get("issues").and_then(Value::as_array);
    for message in issues.into_iter().flatten().filter_map(Value::as_str) {
        add_bullet(&mut bullets, message);
    }
    if bullets.is_empty() {
        bullets.push(fallback.to_string());
    }
    bullets
}

pub(super) fn collect_fix_bullets(details: &Value) -> Vec<String> {
    let mut fixes = Vec::new();
    if let Some(hint) = hint_from_details(details) {
        add_bullet(&mut fixes, hint);
    }
    if fixes.is_empty() {
        fixes.push("Re-run with --help for usage or inspect the output above.".to_string());
    }
    fixes
}

/// Appends `text` unless it is blank or already listed.
fn add_bullet(bullets: &mut Vec<String>, text: impl Into<String>) {
    let text = text.into();
    if !text.trim().is_empty() && !bullets.contains(&text) {
        bullets.push(text);
    }
}

fn reason_display(code: &str) -> Option<&'static str> {
    match code {
        "missing_directory" => Some("A required directory does not exist."),
        "missing_base_wheel" => Some("A tracked package has no custom wheel in the base directory."),
        "missing_pin_reference" => Some("A pin target has no custom wheel to compare against."),
        "no_pinned_candidate" => Some("No candidate wheel pins the custom builds exactly."),
        "ambiguous_candidates" => Some("More than one candidate wheel pins the custom builds."),
        "rename_conflicts" => Some("Some renames would overwrite existing wheels."),
        "missing_credentials" => Some("AWS credentials are not set in the environment."),
        "aws_cli_missing" => Some("The AWS CLI could not be found."),
        "bucket_inaccessible" => Some("The bucket could not be listed with these credentials."),
        "missing_critical_packages" => Some("Runtime packages are missing from the download."),
        "internal_error" => Some("An unexpected error stopped the command."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn why_bullets_map_reasons_and_list_missing_items() {
        let details = json!({
            "reason": "missing_credentials",
            "missing": ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"],
        });
        let bullets = collect_why_bullets(&details, "fallback");
        assert_eq!(bullets[0], "AWS credentials are not set in the environment.");
        assert_eq!(
            bullets[1],
            "missing: AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY"
        );
    }

    #[test]
    fn why_bullets_collapse_duplicate_issues() {
        let details = json!({
            "reason": "internal_error",
            "issues": ["running aws", "running aws", "connection reset"],
        });
        let bullets = collect_why_bullets(&details, "fallback");
        assert_eq!(bullets.len(), 3);
    }

    #[test]
    fn fix_bullets_fall_back_to_usage_hint() {
        assert_eq!(
            collect_fix_bullets(&json!({})),
            vec!["Re-run with --help for usage or inspect the output above."]
        );
        assert_eq!(collect_fix_bullets(&json!({"hint": "Do it."})), vec!["Do it."]);
    }
}
