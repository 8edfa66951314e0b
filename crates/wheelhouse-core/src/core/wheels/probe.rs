use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use wheelhouse_domain::{exact_pin_version, WheelMetadata};

use crate::diagnostics::reasons;
use crate::effects::{CommandRunner, Invocation};
use crate::outcome::UserError;

/// Declared requirements of a wheel, as seen by a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub requirements: Vec<String>,
}

impl ProbeReport {
    /// True when some requirement pins `package` to exactly `version`.
    #[must_use]
    pub fn pins(&self, package: &str, version: &str) -> bool {
        wheelhouse_domain::declares_exact_pin(&self.requirements, package, version)
    }
}

/// Reads the dependency declarations of a wheel.
pub trait MetadataProbe {
    /// # Errors
    /// Returns an error when the wheel cannot be read or described.
    fn probe(&self, wheel: &Path) -> Result<ProbeReport>;
}

/// Reads `*.dist-info/METADATA` straight out of the archive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipMetadataProbe;

impl MetadataProbe for ZipMetadataProbe {
    fn probe(&self, wheel: &Path) -> Result<ProbeReport> {
        let metadata = read_wheel_metadata(wheel)?;
        Ok(ProbeReport {
            requirements: metadata.requires_dist,
        })
    }
}

/// Loads and parses the core metadata of a wheel archive.
///
/// # Errors
/// A missing wheel, an archive without `METADATA`, or metadata without
/// `Name`/`Version` is a [`UserError`]; unreadable archives are plain errors.
pub(crate) fn read_wheel_metadata(wheel: &Path) -> Result<WheelMetadata> {
    if !wheel.is_file() {
        return Err(UserError::new(
            format!("wheel not found: {}", wheel.display()),
            json!({
                "reason": reasons::MISSING_WHEEL,
                "path": wheel.display().to_string(),
            }),
        )
        .into());
    }
    let file = File::open(wheel).with_context(|| format!("opening {}", wheel.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", wheel.display()))?;
    let entry_name = archive
        .file_names()
        .filter(|name| {
            name.ends_with("/METADATA")
                && name
                    .split('/')
                    .next()
                    .is_some_and(|dir| dir.ends_with(".dist-info"))
        })
        .min()
        .map(ToString::to_string)
        .ok_or_else(|| {
            UserError::new(
                format!("no METADATA file found in {}", wheel.display()),
                json!({
                    "reason": reasons::INVALID_METADATA,
                    "path": wheel.display().to_string(),
                }),
            )
        })?;
    let mut contents = String::new();
    archive
        .by_name(&entry_name)
        .with_context(|| format!("reading {entry_name} from {}", wheel.display()))?
        .read_to_string(&mut contents)
        .with_context(|| format!("{entry_name} in {} is not UTF-8", wheel.display()))?;
    WheelMetadata::parse(&contents).map_err(|err| {
        UserError::new(
            format!("{}: {err}", wheel.display()),
            json!({
                "reason": reasons::INVALID_METADATA,
                "path": wheel.display().to_string(),
            }),
        )
        .into()
    })
}

/// Runs an external command with the wheel path appended and treats every
/// stdout line that parses as an exact pin as a declared requirement.
pub struct CommandMetadataProbe<'a> {
    runner: &'a dyn CommandRunner,
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl<'a> CommandMetadataProbe<'a> {
    /// # Errors
    /// Returns an error when `command` is empty.
    pub fn new(
        runner: &'a dyn CommandRunner,
        command: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if command.is_empty() {
            bail!("metadata command is empty");
        }
        Ok(Self {
            runner,
            command,
            timeout,
        })
    }
}

impl MetadataProbe for CommandMetadataProbe<'_> {
    fn probe(&self, wheel: &Path) -> Result<ProbeReport> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("metadata command is empty"))?;
        let invocation = Invocation::new(program.clone())
            .args(args.iter().cloned())
            .arg(wheel.display().to_string())
            .timeout(self.timeout);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            bail!(
                "`{}` exited with {}: {}",
                invocation.display(),
                output.code,
                output.stderr.trim()
            );
        }
        let requirements = output
            .stdout
            .lines()
            .filter_map(report_line_requirement)
            .collect();
        Ok(ProbeReport { requirements })
    }
}

/// Reduces a report line such as `✓ torch==2.9.0  <-- note` to `torch==2.9.0`.
fn report_line_requirement(line: &str) -> Option<String> {
    let body = line.split("<--").next().unwrap_or(line);
    let body = body.trim_start_matches(|ch: char| !ch.is_ascii_alphanumeric());
    let body = body.trim();
    exact_pin_version(body).map(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::RunOutput;
    use crate::wheels::scan::test_support::{touch, write_wheel_with_metadata};

    const METADATA: &str = "Metadata-Version: 2.1
Name: vllm
Version: 0.11.0
Requires-Dist: torch==2.9.0
Requires-Dist: triton==3.4.0
Requires-Dist: numpy>=1.26

Long description mentioning Requires-Dist: fake==1.0
";

    #[test]
    fn zip_probe_reads_requirements() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let wheel =
            write_wheel_with_metadata(temp.path(), "vllm-0.11.0-cp312-cp312-linux_x86_64.whl", METADATA);

        let report = ZipMetadataProbe.probe(&wheel)?;
        assert_eq!(
            report.requirements,
            vec!["torch==2.9.0", "triton==3.4.0", "numpy>=1.26"]
        );
        assert!(report.pins("torch", "2.9.0"));
        assert!(!report.pins("torch", "2.8.0"));
        assert!(!report.pins("numpy", "1.26"));
        Ok(())
    }

    #[test]
    fn missing_or_broken_wheels_are_reported() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = read_wheel_metadata(&temp.path().join("gone.whl")).expect_err("missing");
        assert_eq!(
            err.downcast_ref::<UserError>().expect("user error").details()["reason"],
            reasons::MISSING_WHEEL
        );

        let not_zip = touch(temp.path(), "vllm-0.1-py3-none-any.whl");
        assert!(read_wheel_metadata(&not_zip).is_err());
        Ok(())
    }

    struct ScriptedRunner {
        stdout: &'static str,
        code: i32,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
            assert_eq!(invocation.program, "python3");
            assert_eq!(
                invocation.args.last().map(String::as_str),
                Some("/tmp/vllm.whl")
            );
            Ok(RunOutput {
                code: self.code,
                stdout: self.stdout.to_string(),
                stderr: "boom".to_string(),
            })
        }

        fn locate(&self, _program: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn command_probe_extracts_pins_from_report_lines() -> Result<()> {
        let runner = ScriptedRunner {
            stdout: "Package: vllm\n✓ torch==2.9.0\n✗ triton>=3.0  <-- NOT PINNED!\n  amdsmi==7.0.0 ; platform_system == 'Linux'\n",
            code: 0,
        };
        let probe = CommandMetadataProbe::new(
            &runner,
            vec!["python3".into(), "check_wheel_metadata.py".into()],
            None,
        )?;
        let report = probe.probe(Path::new("/tmp/vllm.whl"))?;
        assert_eq!(
            report.requirements,
            vec!["torch==2.9.0", "amdsmi==7.0.0 ; platform_system == 'Linux'"]
        );
        Ok(())
    }

    #[test]
    fn command_probe_fails_on_nonzero_exit() -> Result<()> {
        let runner = ScriptedRunner {
            stdout: "",
            code: 1,
        };
        let probe = CommandMetadataProbe::new(&runner, vec!["python3".into()], None)?;
        let err = probe
            .probe(Path::new("/tmp/vllm.whl"))
            .expect_err("nonzero exit");
        assert!(err.to_string().contains("boom"));
        assert!(CommandMetadataProbe::new(&runner, Vec::new(), None).is_err());
        Ok(())
    }
}
