use color_eyre::Result;
use serde_json::json;
use wheelhouse_core::progress::ProgressReporter;
use wheelhouse_core::reasons;
use wheelhouse_core::{
    AmbiguityPolicy, BuildInfo, CommandContext, CommandGroup, CommandInfo, DedupeRequest,
    DisambiguateRequest, DownloadRequest, ExecutionOutcome, FilterRequest, IndexRequest,
    InspectRequest, NormalizeRequest, PinRequest, UploadRequest, UserError,
};

use crate::{
    CommandGroupCli, DedupeArgs, DisambiguateArgs, DownloadArgs, FilterArgs, IndexArgs,
    NormalizeArgs, PinArgs, UploadArgs,
};

pub fn info_for(group: &CommandGroupCli) -> CommandInfo {
    match group {
        CommandGroupCli::Dedupe(_) => CommandInfo::new(CommandGroup::Dedupe, "dedupe"),
        CommandGroupCli::Disambiguate(_) => {
            CommandInfo::new(CommandGroup::Disambiguate, "disambiguate")
        }
        CommandGroupCli::Inspect(_) => CommandInfo::new(CommandGroup::Inspect, "inspect"),
        CommandGroupCli::Normalize(_) => CommandInfo::new(CommandGroup::Normalize, "normalize"),
        CommandGroupCli::Pin(_) => CommandInfo::new(CommandGroup::Pin, "pin"),
        CommandGroupCli::Filter(_) => CommandInfo::new(CommandGroup::Filter, "filter"),
        CommandGroupCli::Download(_) => CommandInfo::new(CommandGroup::Download, "download"),
        CommandGroupCli::Index(_) => CommandInfo::new(CommandGroup::Index, "index"),
        CommandGroupCli::Upload(_) => CommandInfo::new(CommandGroup::Upload, "upload"),
    }
}

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let info = info_for(group);
    match group {
        CommandGroupCli::Dedupe(args) => {
            let request = dedupe_request_from_args(args);
            core_call(info, || wheelhouse_core::dedupe_wheels(ctx, &request))
        }
        CommandGroupCli::Disambiguate(args) => {
            let request = disambiguate_request_from_args(args);
            core_call(info, || wheelhouse_core::disambiguate_wheels(ctx, &request))
        }
        CommandGroupCli::Inspect(args) => {
            let request = InspectRequest {
                wheel: args.wheel.clone(),
            };
            core_call(info, || wheelhouse_core::inspect_wheel(ctx, &request))
        }
        CommandGroupCli::Normalize(args) => {
            let request = normalize_request_from_args(args);
            core_call(info, || wheelhouse_core::normalize_wheels(ctx, &request))
        }
        CommandGroupCli::Pin(args) => {
            let request = pin_request_from_args(args);
            core_call(info, || wheelhouse_core::pin_dependencies(ctx, &request))
        }
        CommandGroupCli::Filter(args) => {
            let request = filter_request_from_args(args);
            core_call(info, || wheelhouse_core::filter_system_packages(ctx, &request))
        }
        CommandGroupCli::Download(args) => {
            let request = download_request_from_args(args);
            core_call(info, || wheelhouse_core::download_dependencies(ctx, &request))
        }
        CommandGroupCli::Index(args) => {
            let request = index_request_from_args(args);
            core_call(info, || wheelhouse_core::generate_index(ctx, &request))
        }
        CommandGroupCli::Upload(args) => {
            let request = upload_request_from_args(args);
            core_call(info, || wheelhouse_core::upload_index(ctx, &request))
        }
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    let _spinner = ProgressReporter::spinner(format!("Running {}", info.name));
    let outcome = match action() {
        Ok(result) => result,
        Err(err) => classify_error(&err),
    };
    Ok((info, outcome))
}

/// Maps an error to exit 1 when it is a [`UserError`], else to an internal failure.
pub fn classify_error(err: &anyhow::Error) -> ExecutionOutcome {
    if let Some(user) = err.downcast_ref::<UserError>() {
        return user.to_outcome();
    }
    let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "reason": reasons::INTERNAL_ERROR,
            "error": err.to_string(),
            "issues": issues,
            "hint": "Re-run with `-v` or `--trace` for more detail.",
        }),
    )
}

fn ambiguity(keep_first: bool) -> AmbiguityPolicy {
    if keep_first {
        AmbiguityPolicy::KeepFirst
    } else {
        AmbiguityPolicy::Fail
    }
}

fn dedupe_request_from_args(args: &DedupeArgs) -> DedupeRequest {
    DedupeRequest {
        base_dir: args.base_dir.clone(),
        all_dir: args.all_dir.clone(),
        packages: args.packages.clone(),
        extended: args.extended,
        missing_base: args.missing_base,
        dry_run: args.dry_run,
        disambiguate: args.disambiguate,
        ambiguity: ambiguity(args.keep_first),
    }
}

fn disambiguate_request_from_args(args: &DisambiguateArgs) -> DisambiguateRequest {
    DisambiguateRequest {
        base_dir: args.base_dir.clone(),
        all_dir: args.all_dir.clone(),
        package: args.package.clone(),
        pins: args.pins.clone(),
        metadata_command: args
            .metadata_command
            .as_deref()
            .map(|raw| raw.split_whitespace().map(ToString::to_string).collect())
            .filter(|parts: &Vec<String>| !parts.is_empty()),
        ambiguity: ambiguity(args.keep_first),
        dry_run: args.dry_run,
    }
}

fn normalize_request_from_args(args: &NormalizeArgs) -> NormalizeRequest {
    NormalizeRequest {
        directory: args.directory.clone(),
        dry_run: args.dry_run,
        recursive: args.recursive,
    }
}

fn pin_request_from_args(args: &PinArgs) -> PinRequest {
    PinRequest {
        install_dir: args.install_dir.clone(),
        pyproject: args.pyproject.clone(),
    }
}

fn filter_request_from_args(args: &FilterArgs) -> FilterRequest {
    FilterRequest {
        input: args.input.clone(),
        output: args.output.clone(),
        check_location: args.check_location,
    }
}

fn download_request_from_args(args: &DownloadArgs) -> DownloadRequest {
    DownloadRequest {
        requirements: args.requirements.clone(),
        output_dir: args.output_dir.clone(),
        max_versions: args.max_versions,
    }
}

fn index_request_from_args(args: &IndexArgs) -> IndexRequest {
    IndexRequest {
        wheels_dir: args.wheels_dir.clone(),
        output_dir: args.output_dir.clone(),
        base_url: args.base_url.clone(),
        no_hashes: args.no_hashes,
        no_metadata: args.no_metadata,
        build: BuildInfo {
            rocm_version: args.rocm_version.clone(),
            python_version: args.python_version.clone(),
            gpu_arch: args.gpu_arch.clone(),
            vllm_version: args.vllm_version.clone(),
            build_date: args.build_date.clone(),
        },
    }
}

fn upload_request_from_args(args: &UploadArgs) -> UploadRequest {
    UploadRequest {
        wheels_dir: args.wheels_dir.clone(),
        index_dir: args.index_dir.clone(),
        bucket: args.bucket.clone(),
        region: args.region.clone(),
        delete: args.delete,
        dry_run: args.dry_run,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn user_errors_keep_their_details() {
        let err = anyhow::Error::new(UserError::new(
            "bucket not reachable",
            json!({"reason": "bucket_inaccessible"}),
        ));
        let outcome = classify_error(&err);
        assert_eq!(outcome.status, wheelhouse_core::CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "bucket_inaccessible");
    }

    #[test]
    fn other_errors_become_failures_with_their_chain() {
        let err = anyhow::anyhow!("connection reset").context("running aws s3 sync");
        let outcome = classify_error(&err);
        assert_eq!(outcome.status, wheelhouse_core::CommandStatus::Failure);
        assert_eq!(outcome.details["reason"], "internal_error");
        assert_eq!(outcome.details["issues"][1], "connection reset");
    }

    #[test]
    fn metadata_command_splits_on_whitespace() {
        let args = DisambiguateArgs {
            base_dir: PathBuf::from("base"),
            all_dir: PathBuf::from("all"),
            package: None,
            pins: None,
            metadata_command: Some("python3  check_wheel_metadata.py".to_string()),
            keep_first: true,
            dry_run: false,
        };
        let request = disambiguate_request_from_args(&args);
        assert_eq!(
            request.metadata_command,
            Some(vec![
                "python3".to_string(),
                "check_wheel_metadata.py".to_string()
            ])
        );
        assert_eq!(request.ambiguity, AmbiguityPolicy::KeepFirst);
    }
}
