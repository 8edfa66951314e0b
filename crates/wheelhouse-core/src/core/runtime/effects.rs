use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::process::{execute, RunOutput};
use crate::outcome::UserError;

const PYPI_BASE_URL: &str = "https://pypi.org/pypi";
const WHEELHOUSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A fully described subprocess call.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stream: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Shell-like rendering for logs and error details.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('*') {
                parts.push(format!("\"{arg}\""));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    /// Returns an error when the program cannot be started or times out. A
    /// nonzero exit is reported through [`RunOutput::code`], not as an error.
    fn run(&self, invocation: &Invocation) -> Result<RunOutput>;

    /// Resolves a program name against `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

pub trait PypiClient: Send + Sync {
    /// Lists every released version of a project, in the index's order.
    ///
    /// # Errors
    /// Returns an error when the index cannot be reached or returns invalid data.
    fn release_versions(&self, normalized: &str) -> Result<Vec<String>>;
}

pub trait Effects: Send + Sync {
    fn runner(&self) -> &dyn CommandRunner;
    fn pypi(&self) -> &dyn PypiClient;
}

pub struct SystemEffects {
    runner: Arc<SystemRunner>,
    pypi: Arc<SystemPypiClient>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            pypi: Arc::new(SystemPypiClient),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    fn pypi(&self) -> &dyn PypiClient {
        self.pypi.as_ref()
    }
}

struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
        debug!(command = %invocation.display(), "running");
        let output = execute(invocation)?;
        debug!(program = %invocation.program, code = output.code, "finished");
        Ok(output)
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

#[derive(Debug, Deserialize)]
struct ProjectReleases {
    #[serde(default)]
    releases: serde_json::Map<String, serde_json::Value>,
}

impl ProjectReleases {
    /// Versions with at least one uploaded file; yanked-empty entries drop out.
    fn published(self) -> Vec<String> {
        self.releases
            .into_iter()
            .filter(|(_, files)| files.as_array().is_some_and(|files| !files.is_empty()))
            .map(|(version, _)| version)
            .collect()
    }
}

const PYPI_ATTEMPTS: u64 = 3;

struct SystemPypiClient;

impl PypiClient for SystemPypiClient {
    fn release_versions(&self, normalized: &str) -> Result<Vec<String>> {
        let client = Client::builder()
            .user_agent(format!("wheelhouse/{WHEELHOUSE_VERSION}"))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building the PyPI client")?;
        let url = format!("{PYPI_BASE_URL}/{normalized}/json");
        let mut last_error = anyhow!("PyPI was never queried for {normalized}");
        for attempt in 1..=PYPI_ATTEMPTS {
            match query_releases(&client, &url, normalized) {
                Ok(Some(project)) => return Ok(project.published()),
                Ok(None) => {
                    return Err(UserError::new(
                        format!("PyPI does not know the project {normalized}"),
                        json!({ "package": normalized, "reason": "unknown_project" }),
                    )
                    .into())
                }
                Err(err) => {
                    debug!(%url, attempt, error = %format!("{err:#}"), "PyPI query failed");
                    last_error = err;
                }
            }
            if attempt < PYPI_ATTEMPTS {
                thread::sleep(Duration::from_millis(150 * attempt));
            }
        }
        Err(last_error.context(format!("querying PyPI for {normalized}")))
    }
}

/// `Ok(None)` when the project does not exist.
fn query_releases(client: &Client, url: &str, normalized: &str) -> Result<Option<ProjectReleases>> {
    let response = client.get(url).send()?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let response = response
        .error_for_status()
        .with_context(|| format!("PyPI rejected the lookup for {normalized}"))?;
    let project = response
        .json::<ProjectReleases>()
        .with_context(|| format!("invalid JSON for {normalized}"))?;
    Ok(Some(project))
}

pub type SharedEffects = Arc<dyn Effects>;
