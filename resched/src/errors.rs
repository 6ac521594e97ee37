// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by resched.

use crate::scheduler::SchedulerBuilder;
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use smol_str::SmolStr;
use std::{error, fmt};
use thiserror::Error;

/// A boxed error returned by user-provided hooks: resource construction and
/// teardown, and test bodies.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// An error that occurred while acquiring or releasing a resource.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResourceError {
    /// The manager's make step returned an error.
    #[error("failed to make resource `{name}`")]
    Make {
        /// The name of the manager.
        name: SmolStr,

        /// The error returned by the make step.
        #[source]
        error: BoxError,
    },

    /// The manager's make step panicked.
    #[error("making resource `{name}` panicked: {message}")]
    MakePanicked {
        /// The name of the manager.
        name: SmolStr,

        /// The panic message.
        message: String,
    },

    /// The manager's clean step returned an error.
    #[error("failed to clean resource `{name}`")]
    Clean {
        /// The name of the manager.
        name: SmolStr,

        /// The error returned by the clean step.
        #[source]
        error: BoxError,
    },

    /// The manager's clean step panicked.
    #[error("cleaning resource `{name}` panicked: {message}")]
    CleanPanicked {
        /// The name of the manager.
        name: SmolStr,

        /// The panic message.
        message: String,
    },

    /// A resource was released more times than it was acquired.
    #[error("resource `{name}` was released but is not acquired")]
    NotAcquired {
        /// The name of the manager.
        name: SmolStr,
    },

    /// A type-erased release was passed an instance of a different type.
    #[error("resource `{name}` was released with an instance of the wrong type")]
    WrongInstance {
        /// The name of the manager.
        name: SmolStr,
    },
}

impl ResourceError {
    /// Returns the name of the manager this error is for.
    pub fn manager_name(&self) -> &str {
        match self {
            Self::Make { name, .. }
            | Self::MakePanicked { name, .. }
            | Self::Clean { name, .. }
            | Self::CleanPanicked { name, .. }
            | Self::NotAcquired { name }
            | Self::WrongInstance { name } => name,
        }
    }

    /// Returns true if this error happened while making a resource.
    pub fn is_make_error(&self) -> bool {
        matches!(self, Self::Make { .. } | Self::MakePanicked { .. })
    }
}

/// An error in the resources a test declares.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum DeclarationError {
    /// The same local name was declared more than once.
    #[error("resource names declared more than once: {}", .names.iter().join(", "))]
    DuplicateNames {
        /// The names that were declared more than once, in declaration order.
        names: Vec<SmolStr>,
    },

    /// A resource was declared with an empty local name.
    #[error("resource declared at position {position} has an empty name")]
    EmptyName {
        /// The zero-based position of the declaration.
        position: usize,
    },
}

/// An error that occurred while setting up the resources for a test.
#[derive(Debug, Error)]
pub enum SetUpError {
    /// The test's resource declaration is malformed.
    #[error("invalid resource declaration")]
    Declaration(#[from] DeclarationError),

    /// A declared resource could not be acquired.
    #[error("failed to acquire resource `{name}`")]
    Acquire {
        /// The local name the resource was declared under.
        name: SmolStr,

        /// The underlying error.
        #[source]
        error: ResourceError,
    },
}

/// An error that occurred while looking up a bound resource.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum BindingError {
    /// No resource is bound under this name.
    #[error("no resource bound under `{name}` (known names: {})", .known.iter().join(", "))]
    Missing {
        /// The name that was looked up.
        name: SmolStr,

        /// The names that are bound.
        known: Vec<SmolStr>,
    },

    /// The resource bound under this name has a different type.
    #[error("resource bound under `{name}` is not a `{expected}`")]
    WrongType {
        /// The name that was looked up.
        name: SmolStr,

        /// The type that was requested.
        expected: &'static str,
    },
}

impl BindingError {
    pub(crate) fn missing(name: &str, known: impl IntoIterator<Item = SmolStr>) -> Self {
        Self::Missing {
            name: name.into(),
            known: known.into_iter().collect(),
        }
    }
}

/// An error recorded against a test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestError {
    /// The test's resources could not be set up, so its body did not run.
    #[error("error setting up resources for test")]
    SetUp(#[source] SetUpError),

    /// The test body returned an error.
    #[error("test body returned an error")]
    Body(#[source] BoxError),

    /// A resource could not be released after the test body ran.
    #[error("error releasing resource `{name}` after test")]
    TearDown {
        /// The local name the resource was declared under.
        name: SmolStr,

        /// The underlying error.
        #[source]
        error: ResourceError,
    },
}

/// Error returned while parsing a [`SchedulerBuilder`] from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for scheduler: {input}\n(known values: {})",
    SchedulerBuilder::variants().join(", "),
)]
pub struct SchedulerBuilderParseError {
    input: String,
}

impl SchedulerBuilderParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse resched config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &camino::Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while reading or merging config sources.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the merged config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}
