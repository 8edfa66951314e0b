use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use toml_edit::{DocumentMut, Item};

use super::DEFAULT_TRACKED_PACKAGES;
use crate::diagnostics::reasons;
use crate::outcome::UserError;

const DEFAULT_CONFIG_FILE: &str = "wheelhouse.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub config: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.var(key).is_some()
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// What to do when a tracked package has no custom wheel in the base directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingBasePolicy {
    #[default]
    Strict,
    Lenient,
}

impl FromStr for MissingBasePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!(
                "unknown missing-base policy `{other}` (expected `strict` or `lenient`)"
            )),
        }
    }
}

impl fmt::Display for MissingBasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
        })
    }
}

/// What to do when disambiguation cannot single out one verified candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    #[default]
    Fail,
    KeepFirst,
}

impl fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fail => "fail",
            Self::KeepFirst => "keep-first",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DedupeConfig {
    pub tracked: Vec<String>,
    pub missing_base: MissingBasePolicy,
}

#[derive(Debug, Clone)]
pub struct DisambiguateConfig {
    pub package: String,
    pub pins: Vec<String>,
    pub metadata_command: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub region: String,
    pub aws_cli: String,
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub python: String,
    pub command_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) source: Option<PathBuf>,
    pub(crate) dedupe: DedupeConfig,
    pub(crate) disambiguate: DisambiguateConfig,
    pub(crate) upload: UploadConfig,
    pub(crate) tools: ToolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            dedupe: DedupeConfig {
                tracked: DEFAULT_TRACKED_PACKAGES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                missing_base: MissingBasePolicy::Strict,
            },
            disambiguate: DisambiguateConfig {
                package: "vllm".to_string(),
                pins: vec!["torch".to_string(), "triton".to_string()],
                metadata_command: None,
            },
            upload: UploadConfig {
                region: "us-east-1".to_string(),
                aws_cli: "aws".to_string(),
            },
            tools: ToolConfig {
                python: "python3".to_string(),
                command_timeout: None,
            },
        }
    }
}

impl Config {
    /// Builds a configuration from the process environment and the config
    /// file named by `config_path`, or `wheelhouse.toml` when present.
    ///
    /// # Errors
    /// Returns a [`UserError`] when the file or an environment override is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot, config_path)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        let file = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };
        if let Some(path) = file {
            config.apply_file(&path)?;
            config.source = Some(path);
        }
        config.apply_env(snapshot)?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path).map_err(|err| {
            invalid_config(
                format!("cannot read config file {}", path.display()),
                path,
                &err.to_string(),
            )
        })?;
        let doc: DocumentMut = contents.parse().map_err(|err: toml_edit::TomlError| {
            invalid_config(
                format!("{} is not valid TOML", path.display()),
                path,
                &err.to_string(),
            )
        })?;

        let field_error = |key: &str, expected: &str| {
            invalid_config(
                format!("`{key}` in {} must be {expected}", path.display()),
                path,
                key,
            )
        };

        if let Some(dedupe) = doc.get("dedupe") {
            if let Some(item) = dedupe.get("tracked") {
                self.dedupe.tracked =
                    string_list(item).ok_or_else(|| field_error("dedupe.tracked", "a list of strings"))?;
            }
            if let Some(item) = dedupe.get("missing-base") {
                self.dedupe.missing_base = item
                    .as_str()
                    .and_then(|value| value.parse().ok())
                    .ok_or_else(|| field_error("dedupe.missing-base", "\"strict\" or \"lenient\""))?;
            }
        }
        if let Some(section) = doc.get("disambiguate") {
            if let Some(item) = section.get("package") {
                self.disambiguate.package = item
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| field_error("disambiguate.package", "a string"))?;
            }
            if let Some(item) = section.get("pins") {
                self.disambiguate.pins = string_list(item)
                    .ok_or_else(|| field_error("disambiguate.pins", "a list of strings"))?;
            }
            if let Some(item) = section.get("metadata-command") {
                let command = string_list(item)
                    .filter(|parts| !parts.is_empty())
                    .ok_or_else(|| {
                        field_error("disambiguate.metadata-command", "a non-empty list of strings")
                    })?;
                self.disambiguate.metadata_command = Some(command);
            }
        }
        if let Some(section) = doc.get("upload") {
            if let Some(item) = section.get("region") {
                self.upload.region = item
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| field_error("upload.region", "a string"))?;
            }
            if let Some(item) = section.get("aws-cli") {
                self.upload.aws_cli = item
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| field_error("upload.aws-cli", "a string"))?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self, snapshot: &EnvSnapshot) -> Result<()> {
        if let Some(raw) = snapshot.var("WHEELHOUSE_TRACKED") {
            self.dedupe.tracked = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(raw) = snapshot.var("WHEELHOUSE_MISSING_BASE") {
            self.dedupe.missing_base = raw
                .parse()
                .map_err(|err: String| invalid_env("WHEELHOUSE_MISSING_BASE", &err))?;
        }
        if let Some(raw) = snapshot.var("WHEELHOUSE_METADATA_COMMAND") {
            self.disambiguate.metadata_command =
                Some(raw.split_whitespace().map(ToString::to_string).collect());
        }
        if let Some(raw) = snapshot.var("WHEELHOUSE_AWS_CLI") {
            self.upload.aws_cli = raw.to_string();
        }
        if let Some(raw) = snapshot.var("WHEELHOUSE_PYTHON") {
            self.tools.python = raw.to_string();
        }
        if let Some(raw) = snapshot.var("WHEELHOUSE_COMMAND_TIMEOUT") {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid_env("WHEELHOUSE_COMMAND_TIMEOUT", "expected whole seconds"))?;
            self.tools.command_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        Ok(())
    }

    #[must_use]
    pub fn dedupe(&self) -> &DedupeConfig {
        &self.dedupe
    }

    #[must_use]
    pub fn disambiguate(&self) -> &DisambiguateConfig {
        &self.disambiguate
    }

    #[must_use]
    pub fn upload(&self) -> &UploadConfig {
        &self.upload
    }

    #[must_use]
    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn string_list(item: &Item) -> Option<Vec<String>> {
    item.as_array()?
        .iter()
        .map(|value| value.as_str().map(ToString::to_string))
        .collect()
}

fn invalid_config(message: String, path: &Path, error: &str) -> anyhow::Error {
    UserError::new(
        message,
        json!({
            "reason": reasons::INVALID_CONFIG,
            "path": path.display().to_string(),
            "error": error,
            "hint": "Fix the config file or pass a different one with --config.",
        }),
    )
    .into()
}

fn invalid_env(key: &str, error: &str) -> anyhow::Error {
    UserError::new(
        format!("{key} is invalid: {error}"),
        json!({
            "reason": reasons::INVALID_CONFIG,
            "variable": key,
            "hint": format!("Unset {key} or correct its value."),
        }),
    )
    .into()
}
