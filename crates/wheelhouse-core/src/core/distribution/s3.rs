use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::debug;

use crate::effects::{CommandRunner, Invocation};

pub(crate) const PACKAGES_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub(crate) const INDEX_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

/// One `s3 sync` of a local directory to a bucket prefix.
#[derive(Debug, Clone)]
pub(crate) struct SyncSpec<'a> {
    pub(crate) source: &'a Path,
    pub(crate) destination: String,
    pub(crate) cache_control: &'static str,
    pub(crate) include: &'static str,
    pub(crate) size_only: bool,
    pub(crate) delete: bool,
    pub(crate) dry_run: bool,
}

/// The object storage operations the upload stage needs.
pub(crate) trait ObjectStore {
    fn bucket_accessible(&self, bucket: &str) -> Result<bool>;
    fn sync(&self, spec: &SyncSpec<'_>) -> Result<()>;
    fn object_exists(&self, uri: &str) -> Result<bool>;
}

/// [`ObjectStore`] backed by the AWS CLI.
pub(crate) struct AwsCli<'a> {
    runner: &'a dyn CommandRunner,
    program: PathBuf,
    region: String,
    timeout: Option<Duration>,
}

impl<'a> AwsCli<'a> {
    pub(crate) fn new(
        runner: &'a dyn CommandRunner,
        program: PathBuf,
        region: String,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            program,
            region,
            timeout,
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(self.program.display().to_string()).timeout(self.timeout)
    }

    pub(crate) fn sync_args(&self, spec: &SyncSpec<'_>) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "sync".to_string(),
            spec.source.display().to_string(),
            spec.destination.clone(),
            "--region".to_string(),
            self.region.clone(),
        ];
        if spec.size_only {
            args.push("--size-only".to_string());
        }
        args.extend([
            "--cache-control".to_string(),
            spec.cache_control.to_string(),
            "--exclude".to_string(),
            "*".to_string(),
            "--include".to_string(),
            spec.include.to_string(),
        ]);
        if spec.delete {
            args.push("--delete".to_string());
        }
        if spec.dry_run {
            args.push("--dryrun".to_string());
        }
        args
    }
}

impl ObjectStore for AwsCli<'_> {
    fn bucket_accessible(&self, bucket: &str) -> Result<bool> {
        let invocation = self.invocation().args([
            "s3".to_string(),
            "ls".to_string(),
            format!("s3://{bucket}"),
            "--region".to_string(),
            self.region.clone(),
        ]);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            debug!(stderr = %output.stderr.trim(), "bucket listing failed");
        }
        Ok(output.success())
    }

    fn sync(&self, spec: &SyncSpec<'_>) -> Result<()> {
        let invocation = self.invocation().args(self.sync_args(spec)).streaming(true);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            bail!(
                "`{}` exited with {}: {}",
                invocation.display(),
                output.code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    fn object_exists(&self, uri: &str) -> Result<bool> {
        let invocation = self.invocation().args([
            "s3".to_string(),
            "ls".to_string(),
            uri.to_string(),
            "--region".to_string(),
            self.region.clone(),
        ]);
        Ok(self.runner.run(&invocation)?.success())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::RunOutput;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
        code: i32,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(invocation.clone());
            }
            Ok(RunOutput {
                code: self.code,
                stdout: String::new(),
                stderr: "AccessDenied".to_string(),
            })
        }

        fn locate(&self, _program: &str) -> Option<PathBuf> {
            None
        }
    }

    fn spec(source: &Path) -> SyncSpec<'_> {
        SyncSpec {
            source,
            destination: "s3://wheels/packages/".to_string(),
            cache_control: PACKAGES_CACHE_CONTROL,
            include: "*.whl",
            size_only: true,
            delete: false,
            dry_run: false,
        }
    }

    #[test]
    fn sync_arguments_carry_cache_and_filter_flags() {
        let runner = RecordingRunner::default();
        let cli = AwsCli::new(&runner, PathBuf::from("aws"), "us-east-1".into(), None);
        let mut spec = spec(Path::new("/wheels"));
        assert_eq!(
            cli.sync_args(&spec),
            vec![
                "s3",
                "sync",
                "/wheels",
                "s3://wheels/packages/",
                "--region",
                "us-east-1",
                "--size-only",
                "--cache-control",
                PACKAGES_CACHE_CONTROL,
                "--exclude",
                "*",
                "--include",
                "*.whl",
            ]
        );
        spec.size_only = false;
        spec.delete = true;
        spec.dry_run = true;
        let args = cli.sync_args(&spec);
        assert!(!args.contains(&"--size-only".to_string()));
        assert!(args.ends_with(&["--delete".to_string(), "--dryrun".to_string()]));
    }

    #[test]
    fn failed_sync_is_an_error_and_streams_output() {
        let runner = RecordingRunner {
            code: 1,
            ..RecordingRunner::default()
        };
        let cli = AwsCli::new(&runner, PathBuf::from("aws"), "us-east-1".into(), None);
        let err = cli.sync(&spec(Path::new("/wheels"))).expect_err("sync fails");
        assert!(err.to_string().contains("AccessDenied"));
        let calls = runner.calls.lock().expect("calls");
        assert!(calls[0].stream);
    }

    #[test]
    fn bucket_check_uses_ls() -> Result<()> {
        let runner = RecordingRunner::default();
        let cli = AwsCli::new(&runner, PathBuf::from("/usr/bin/aws"), "eu-west-1".into(), None);
        assert!(cli.bucket_accessible("wheels")?);
        let calls = runner.calls.lock().expect("calls");
        assert_eq!(calls[0].program, "/usr/bin/aws");
        assert_eq!(calls[0].args, vec!["s3", "ls", "s3://wheels", "--region", "eu-west-1"]);
        Ok(())
    }
}
