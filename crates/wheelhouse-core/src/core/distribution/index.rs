use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, info, warn};
use url::Url;
use wheelhouse_domain::{html_escape, requires_python_from_tag};

use crate::wheels::scan::{collect_wheels_recursive, WheelEntry};
use crate::diagnostics::reasons;
use crate::fs::{compute_sha256, ensure_directory};
use crate::outcome::{ExecutionOutcome, UserError};
use crate::progress::ProgressReporter;
use crate::CommandContext;

/// Build facts shown on the landing page.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub rocm_version: String,
    pub python_version: String,
    pub gpu_arch: String,
    pub vllm_version: String,
    /// Defaults to the current UTC time.
    pub build_date: Option<String>,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            rocm_version: "N/A".to_string(),
            python_version: "N/A".to_string(),
            gpu_arch: "N/A".to_string(),
            vllm_version: "latest".to_string(),
            build_date: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    pub wheels_dir: PathBuf,
    pub output_dir: PathBuf,
    pub base_url: String,
    pub no_hashes: bool,
    pub no_metadata: bool,
    pub build: BuildInfo,
}

fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let valid = Url::parse(trimmed)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some());
    match valid {
        Some(_) => Ok(trimmed.to_string()),
        None => Err(UserError::new(
            format!("invalid base URL `{raw}`"),
            json!({
                "reason": reasons::INVALID_URL,
                "url": raw,
                "hint": "Pass the public bucket URL, e.g. https://my-bucket.s3.amazonaws.com",
            }),
        )
        .into()),
    }
}

fn build_date() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "N/A".to_string())
}

fn package_page(
    name: &str,
    wheels: &[&WheelEntry],
    wheels_dir: &Path,
    base_url: &str,
    add_hashes: bool,
    add_metadata: bool,
    progress: &ProgressReporter,
) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>Links for {name}</title>\n</head>\n<body>\n  <h1>Links for {name}</h1>\n"
    );
    let mut ordered: Vec<&WheelEntry> = wheels.to_vec();
    ordered.sort_by(|left, right| right.filename.cmp(&left.filename));
    for wheel in ordered {
        let mut href = format!("{base_url}/packages/{}", wheel.relative_key(wheels_dir));
        if add_hashes {
            match compute_sha256(&wheel.path) {
                Ok(digest) => {
                    let _ = write!(href, "#sha256={digest}");
                }
                Err(err) => {
                    warn!(wheel = %wheel.filename, error = %format!("{err:#}"), "could not hash wheel");
                }
            }
            progress.increment();
        }
        let mut attributes = format!("href=\"{}\"", html_escape(&href));
        if add_metadata {
            if let Some(requires) = requires_python_from_tag(&wheel.parsed.python_tag) {
                let _ = write!(
                    attributes,
                    " data-requires-python=\"{}\"",
                    html_escape(&requires)
                );
            }
        }
        let _ = writeln!(
            html,
            "  <a {attributes}>{}</a><br/>",
            html_escape(&wheel.filename)
        );
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn root_page(packages: &[&str]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>Simple Index</title>\n</head>\n<body>\n  <h1>Simple Index</h1>\n",
    );
    for name in packages {
        let _ = writeln!(html, "  <a href=\"{name}/\">{name}</a><br/>");
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn landing_page(base_url: &str, build: &BuildInfo, build_date: &str, wheel_count: usize) -> String {
    let rocm = html_escape(&build.rocm_version);
    let python = html_escape(&build.python_version);
    let gpu = html_escape(&build.gpu_arch);
    let vllm = html_escape(&build.vllm_version);
    let date = html_escape(build_date);
    let url = html_escape(base_url);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>vLLM ROCm Package Index</title>
    <style>
        body {{ font-family: sans-serif; max-width: 900px; margin: 50px auto; padding: 20px; line-height: 1.6; }}
        pre {{ background: #f4f4f4; padding: 15px; border-left: 4px solid #2196F3; overflow-x: auto; }}
        .warning {{ background: #fff3cd; padding: 15px; border-left: 4px solid #ffc107; }}
    </style>
</head>
<body>
    <h1>vLLM ROCm Package Index</h1>
    <p>Custom ROCm builds of vLLM, PyTorch, Triton, TorchVision and amdsmi, plus their dependencies.</p>

    <h2>Installation</h2>
    <pre><code>pip install vllm --index-url {url}/simple/</code></pre>
    <pre><code>pip install torch triton torchvision vllm --index-url {url}/simple/</code></pre>

    <h2>Packages</h2>
    <p><a href="simple/">Browse all {wheel_count} wheels</a></p>

    <h2>Build information</h2>
    <ul>
        <li><strong>ROCm version:</strong> {rocm}</li>
        <li><strong>Python version:</strong> {python}</li>
        <li><strong>GPU architectures:</strong> {gpu}</li>
        <li><strong>vLLM version:</strong> {vllm}</li>
        <li><strong>Built:</strong> {date}</li>
    </ul>

    <div class="warning">
        These wheels target ROCm and do not work with CUDA GPUs.
    </div>
</body>
</html>
"#
    )
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "wrote");
    Ok(())
}

/// Writes a PEP 503 simple index for every wheel under the wheels directory,
/// plus a landing page.
///
/// # Errors
/// Returns an error when a page cannot be written.
pub fn generate_index(_ctx: &CommandContext, request: &IndexRequest) -> Result<ExecutionOutcome> {
    ensure_directory(&request.wheels_dir, "wheels")?;
    let base_url = validate_base_url(&request.base_url)?;

    let wheels = collect_wheels_recursive(&request.wheels_dir)?;
    if wheels.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            format!("no wheels found in {}", request.wheels_dir.display()),
            json!({
                "reason": reasons::NO_WHEELS,
                "path": request.wheels_dir.display().to_string(),
            }),
        ));
    }

    let mut packages: BTreeMap<String, Vec<&WheelEntry>> = BTreeMap::new();
    for wheel in &wheels {
        packages.entry(wheel.normalized_name()).or_default().push(wheel);
    }
    info!(wheels = wheels.len(), packages = packages.len(), "generating index");

    let simple_dir = request.output_dir.join("simple");
    let progress = if request.no_hashes {
        ProgressReporter::spinner("Generating index")
    } else {
        ProgressReporter::bar("Hashing wheels", wheels.len())
    };
    let mut summary = Vec::with_capacity(packages.len());
    for (name, entries) in &packages {
        let page = package_page(
            name,
            entries,
            &request.wheels_dir,
            &base_url,
            !request.no_hashes,
            !request.no_metadata,
            &progress,
        );
        write_file(&simple_dir.join(name).join("index.html"), &page)?;
        summary.push(json!({ "name": name, "wheels": entries.len() }));
    }
    let names: Vec<&str> = packages.keys().map(String::as_str).collect();
    write_file(&simple_dir.join("index.html"), &root_page(&names))?;

    let date = request.build.build_date.clone().unwrap_or_else(build_date);
    write_file(
        &request.output_dir.join("index.html"),
        &landing_page(&base_url, &request.build, &date, wheels.len()),
    )?;
    progress.finish(format!("Indexed {} package(s)", packages.len()));

    Ok(ExecutionOutcome::success(
        format!(
            "indexed {} wheel(s) in {} package(s) into {}",
            wheels.len(),
            packages.len(),
            request.output_dir.display()
        ),
        json!({
            "output_dir": request.output_dir.display().to_string(),
            "base_url": base_url,
            "wheel_count": wheels.len(),
            "package_count": packages.len(),
            "packages": summary,
            "hashes": !request.no_hashes,
            "metadata": !request.no_metadata,
            "build": {
                "rocm_version": request.build.rocm_version,
                "python_version": request.build.python_version,
                "gpu_arch": request.build.gpu_arch,
                "vllm_version": request.build.vllm_version,
                "build_date": date,
            },
        }),
    ))
}
