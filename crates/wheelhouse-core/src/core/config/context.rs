use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::effects::{self, Effects, SharedEffects};
use crate::CommandGroup;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    env: EnvSnapshot,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a new command context with the provided global options.
    ///
    /// # Errors
    /// Returns an error if the configuration file or environment overrides are invalid.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        let env = EnvSnapshot::capture();
        let config = Config::from_snapshot(&env, global.config.as_deref().map(Path::new))?;
        Ok(Self {
            global,
            env,
            config,
            effects,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        global: &'a GlobalOptions,
        env: &[(&str, &str)],
        config: Config,
        effects: SharedEffects,
    ) -> Self {
        Self {
            global,
            env: EnvSnapshot::testing(env),
            config,
            effects,
        }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn runner(&self) -> &dyn effects::CommandRunner {
        self.effects.runner()
    }

    pub fn pypi(&self) -> &dyn effects::PypiClient {
        self.effects.pypi()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.var(key)
    }

    pub fn env_is_set(&self, key: &str) -> bool {
        self.env.contains(key)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.config.tools().command_timeout
    }
}
