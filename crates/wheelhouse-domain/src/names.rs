/// Normalizes a project name per PEP 503: runs of `-`, `_` and `.` collapse
/// to a single `-` and the result is lowercased.
pub fn normalize_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for ch in name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(ch.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

pub fn same_package(left: &str, right: &str) -> bool {
    normalize_package_name(left) == normalize_package_name(right)
}

/// `2.9.0+git1c57644` -> `2.9.0`
pub fn strip_local_version(version: &str) -> &str {
    version.split_once('+').map_or(version, |(base, _)| base)
}

/// Maps a wheel python tag to a `requires-python` specifier.
///
/// `cp312` -> `>=3.12`, `py39` -> `>=3.9`, `py3` -> `>=3.0`. Compound or
/// unrecognized tags yield `None`.
pub fn requires_python_from_tag(python_tag: &str) -> Option<String> {
    if let Some(digits) = python_tag.strip_prefix("cp") {
        if digits.len() >= 2 && digits.chars().all(|ch| ch.is_ascii_digit()) {
            let (major, minor) = digits.split_at(1);
            return Some(format!(">={major}.{minor}"));
        }
        return None;
    }
    let digits = python_tag.strip_prefix("py")?;
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    if digits.len() == 1 {
        Some(format!(">={digits}.0"))
    } else {
        let (major, minor) = digits.split_at(1);
        Some(format!(">={major}.{minor}"))
    }
}

pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
