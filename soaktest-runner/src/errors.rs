// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by soaktest.
//!
//! Only infrastructure problems are errors: a test that fails to generate, compile or simulate is
//! reported through [`TestOutcome`](crate::driver::TestOutcome), not through this module. The one
//! exception is [`ExtractionError`], which the extractor returns and the driver folds into a
//! "did not generate" result.

use crate::extract::AnchorKind;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse soaktest config at `{config_file}`")]
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

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A required anchor or token was configured as an empty string.
    #[error("`{key}` must not be empty")]
    EmptyValue {
        /// The config key, e.g. `extract.analyze`.
        key: &'static str,
    },

    /// A cleanup pattern is not a valid glob.
    #[error("invalid cleanup pattern `{pattern}`")]
    InvalidCleanupPattern {
        /// The pattern as written in the config.
        pattern: String,

        /// The underlying error.
        #[source]
        err: globset::Error,
    },
}

/// An error which indicates that a profile was requested but not known to soaktest.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while writing to the full or errors-only log.
///
/// Log failures are fatal: a batch never continues without its audit trail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogSinkError {
    /// The log file could not be opened.
    #[error("failed to open log file `{path}`")]
    Open {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The log file could not be written to.
    #[error("failed to write to log file `{path}`")]
    Write {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// An error that occurred while operating on the result ledger.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The ledger could not be opened for appending.
    #[error("failed to open result ledger `{path}`")]
    Open {
        /// The ledger file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A row could not be appended and flushed.
    #[error("failed to append to result ledger `{path}`")]
    Write {
        /// The ledger file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The ledger could not be read.
    #[error("failed to read result ledger `{path}`")]
    Read {
        /// The ledger file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A row in the ledger is malformed.
    #[error("malformed row at `{path}:{line_number}`: {line}")]
    Parse {
        /// The ledger file.
        path: Utf8PathBuf,

        /// The 1-based line number of the row.
        line_number: usize,

        /// The row as read.
        line: String,
    },
}

/// An error that occurred while reading or persisting progress.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressStoreError {
    /// The progress table or a definition file could not be read.
    #[error("failed to read progress from `{path}`")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The progress table is not valid JSON.
    #[error("failed to parse progress table `{path}`")]
    Parse {
        /// The progress table.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// The progress table could not be serialized.
    #[error("failed to serialize progress table")]
    Serialize(#[source] serde_json::Error),

    /// Progress could not be written atomically.
    #[error("failed to write progress to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while listing or reading test definition files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListDefinitionsError {
    /// The tests directory could not be read.
    #[error("failed to read tests directory `{dir}`")]
    ReadDir {
        /// The tests directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A file in the tests directory does not have a UTF-8 name.
    #[error("file `{name}` in `{dir}` does not have a UTF-8 name")]
    NonUtf8FileName {
        /// The tests directory.
        dir: Utf8PathBuf,

        /// A lossy rendering of the file name.
        name: String,
    },

    /// A test definition file could not be read.
    #[error("failed to read test definition file `{path}`")]
    ReadFile {
        /// The definition file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// An error that occurred while preparing a working directory for a test.
#[derive(Debug, Error)]
#[error("failed to create working directory under `{dir}`")]
pub struct WorkdirError {
    dir: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl WorkdirError {
    pub(crate) fn new(dir: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            dir: dir.into(),
            err,
        }
    }
}

/// An infrastructure failure that aborts a batch.
///
/// Everything that reaches this type means the audit trail or resumability can no longer be
/// guaranteed. Progress recorded before the failure remains consistent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchError {
    /// The store directory could not be created.
    #[error("failed to create store directory `{store_dir}`")]
    StoreDirCreate {
        /// The store directory.
        store_dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The toolchain search path could not be assembled.
    #[error("failed to build PATH for toolchain subprocesses")]
    ToolchainPath(#[source] std::env::JoinPathsError),

    /// A log could not be written.
    #[error(transparent)]
    LogSink(#[from] LogSinkError),

    /// The result ledger could not be written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Progress could not be read or recorded.
    #[error(transparent)]
    ProgressStore(#[from] ProgressStoreError),

    /// A test definition file could not be listed or read.
    #[error(transparent)]
    ListDefinitions(#[from] ListDefinitionsError),

    /// A working directory could not be prepared.
    #[error(transparent)]
    Workdir(#[from] WorkdirError),
}

/// The toolchain commands could not be located in a generator transcript.
///
/// This is not fatal: the driver records the test as "did not generate".
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind} anchor `{anchor}` not found in generator output")]
pub struct ExtractionError {
    kind: AnchorKind,
    anchor: String,
}

impl ExtractionError {
    pub(crate) fn missing(kind: AnchorKind, anchor: impl Into<String>) -> Self {
        Self {
            kind,
            anchor: anchor.into(),
        }
    }

    /// Returns the anchor that could not be found.
    pub fn kind(&self) -> AnchorKind {
        self.kind
    }

    /// Returns the literal text that was searched for.
    pub fn anchor(&self) -> &str {
        &self.anchor
    }
}

/// An error that occurs while writing a reporter event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new chain display for `error`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
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
