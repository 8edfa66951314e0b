use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use super::s3::{AwsCli, ObjectStore, SyncSpec, INDEX_CACHE_CONTROL, PACKAGES_CACHE_CONTROL};
use crate::diagnostics::reasons;
use crate::fs::{ensure_directory, format_bytes};
use crate::outcome::ExecutionOutcome;
use crate::progress::ProgressReporter;
use crate::wheels::scan::collect_wheels_recursive;
use crate::CommandContext;

const CREDENTIAL_VARS: [&str; 2] = ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub wheels_dir: PathBuf,
    pub index_dir: PathBuf,
    pub bucket: String,
    pub region: Option<String>,
    pub delete: bool,
    pub dry_run: bool,
}

fn bucket_name(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("s3://")
        .trim_end_matches('/')
}

/// Uploads the wheels and the generated index to the bucket with the AWS CLI.
///
/// Credentials are checked before any call is made.
///
/// # Errors
/// Returns an error when the AWS CLI fails to run or a sync exits nonzero.
pub fn upload_index(ctx: &CommandContext, request: &UploadRequest) -> Result<ExecutionOutcome> {
    ensure_directory(&request.wheels_dir, "wheels")?;
    ensure_directory(&request.index_dir, "index")?;

    let missing: Vec<&str> = CREDENTIAL_VARS
        .iter()
        .copied()
        .filter(|key| !ctx.env_is_set(key))
        .collect();
    if !missing.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            format!("AWS credentials are not set ({})", missing.join(", ")),
            json!({
                "reason": reasons::MISSING_CREDENTIALS,
                "missing": missing,
                "hint": "Export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY before uploading.",
            }),
        ));
    }

    let settings = ctx.config().upload();
    let Some(program) = ctx.runner().locate(&settings.aws_cli) else {
        return Ok(ExecutionOutcome::user_error(
            format!("AWS CLI `{}` not found", settings.aws_cli),
            json!({
                "reason": reasons::AWS_CLI_MISSING,
                "program": settings.aws_cli,
                "hint": "Install the AWS CLI or point WHEELHOUSE_AWS_CLI at it.",
            }),
        ));
    };
    let region = request
        .region
        .clone()
        .unwrap_or_else(|| settings.region.clone());
    let store = AwsCli::new(ctx.runner(), program, region.clone(), ctx.command_timeout());
    upload_with_store(&store, request, &region)
}

pub(crate) fn upload_with_store(
    store: &dyn ObjectStore,
    request: &UploadRequest,
    region: &str,
) -> Result<ExecutionOutcome> {
    let bucket = bucket_name(&request.bucket);
    info!(bucket, region, "checking bucket access");
    if bucket.is_empty() || !store.bucket_accessible(bucket)? {
        return Ok(ExecutionOutcome::user_error(
            format!("cannot access bucket `{bucket}` in {region}"),
            json!({
                "reason": reasons::BUCKET_INACCESSIBLE,
                "bucket": bucket,
                "region": region,
                "hint": "Check the bucket name, region, and that the credentials may list it.",
            }),
        ));
    }

    let wheels = collect_wheels_recursive(&request.wheels_dir)?;
    let total_bytes: u64 = wheels.iter().map(|wheel| wheel.size()).sum();
    info!(
        wheels = wheels.len(),
        size = %format_bytes(total_bytes),
        "uploading packages"
    );

    let packages = SyncSpec {
        source: &request.wheels_dir,
        destination: format!("s3://{bucket}/packages/"),
        cache_control: PACKAGES_CACHE_CONTROL,
        include: "*.whl",
        size_only: true,
        delete: request.delete,
        dry_run: request.dry_run,
    };
    let index = SyncSpec {
        source: &request.index_dir,
        destination: format!("s3://{bucket}/"),
        cache_control: INDEX_CACHE_CONTROL,
        include: "*.html",
        size_only: false,
        delete: false,
        dry_run: request.dry_run,
    };
    let progress = ProgressReporter::spinner(format!("Syncing packages to s3://{bucket}"));
    store.sync(&packages)?;
    info!("uploading index");
    progress.set_label(format!("Syncing index to s3://{bucket}"));
    store.sync(&index)?;
    progress.finish(format!("Synced to s3://{bucket}"));

    let mut verified = Vec::new();
    if !request.dry_run {
        let sample = wheels
            .first()
            .map(|wheel| wheel.relative_key(&request.wheels_dir));
        let mut checks = vec![format!("s3://{bucket}/simple/index.html")];
        if let Some(key) = sample {
            checks.insert(0, format!("s3://{bucket}/packages/{key}"));
        }
        for uri in checks {
            match store.object_exists(&uri) {
                Ok(true) => verified.push(uri),
                Ok(false) => warn!(%uri, "uploaded object not found"),
                Err(err) => warn!(%uri, error = %format!("{err:#}"), "could not verify object"),
            }
        }
    }

    let prefix = if request.dry_run { "[dry-run] " } else { "" };
    Ok(ExecutionOutcome::success(
        format!(
            "{prefix}uploaded {} wheel(s) ({}) and the index to s3://{bucket}",
            wheels.len(),
            format_bytes(total_bytes)
        ),
        json!({
            "bucket": bucket,
            "region": region,
            "wheel_count": wheels.len(),
            "total_bytes": total_bytes,
            "packages_url": format!("s3://{bucket}/packages/"),
            "index_url": format!("s3://{bucket}/simple/"),
            "verified": verified,
            "delete": request.delete,
            "dry_run": request.dry_run,
        }),
    ))
}
