// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for suites.
//!
//! Settings are read from a built-in default configuration, overlaid by an
//! optional `.config/resched.toml` file in the workspace root or by an
//! explicitly provided file.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    scheduler::SchedulerBuilder,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Settings that control how a suite orders and runs its tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuiteConfig {
    scheduler: SchedulerBuilder,
    retain_shared_resources: bool,
}

impl SuiteConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/resched.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from `file`, or from [`Self::CONFIG_PATH`] under
    /// `workspace_root` if `file` is `None`, layered on top of the default
    /// config.
    ///
    /// An explicitly provided file must exist. The file under the workspace
    /// root is optional.
    pub fn from_sources(
        workspace_root: impl AsRef<Utf8Path>,
        file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (
                file.to_owned(),
                File::new(file.as_str(), FileFormat::Toml),
            ),
            None => {
                let config_file = default_config_path(workspace_root.as_ref());
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build(&builder, &config_file)
    }

    /// Parses the config from a TOML string, layered on top of the default
    /// config.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(&builder, Utf8Path::new("<inline>"))
    }

    /// Returns the scheduler to order tests with.
    pub fn scheduler(&self) -> SchedulerBuilder {
        self.scheduler
    }

    /// Returns true if resources are kept alive between adjacent tests that
    /// share them.
    pub fn retain_shared_resources(&self) -> bool {
        self.retain_shared_resources
    }

    /// Sets the scheduler.
    pub fn with_scheduler(mut self, scheduler: SchedulerBuilder) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets whether resources are kept alive between adjacent tests that share
    /// them.
    pub fn with_retain_shared_resources(mut self, retain: bool) -> Self {
        self.retain_shared_resources = retain;
        self
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build(
        builder: &ConfigBuilder<DefaultState>,
        config_file: &Utf8Path,
    ) -> Result<Self, ConfigParseError> {
        let (config, unknown) = Self::build_and_deserialize_config(builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        if !unknown.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {config_file}: {}",
                unknown.iter().join(", "),
            );
        }

        Ok(config.into_config())
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(SuiteConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: SuiteConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The path is reported by serde_path_to_error, so drop it from
                // the inner error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerBuilder::Greedy,
            retain_shared_resources: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SuiteConfigDeserialize {
    scheduler: SchedulerBuilder,
    retain_shared_resources: bool,
}

impl SuiteConfigDeserialize {
    fn into_config(self) -> SuiteConfig {
        SuiteConfig {
            scheduler: self.scheduler,
            retain_shared_resources: self.retain_shared_resources,
        }
    }
}

/// Returns the path of the config file `from_sources` reads for
/// `workspace_root` when no explicit file is given.
pub fn default_config_path(workspace_root: &Utf8Path) -> Utf8PathBuf {
    workspace_root.join(SuiteConfig::CONFIG_PATH)
}
