// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ConfigParseErrorKind;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::{fmt, io, time::Duration};
use tracing::debug;

/// How the three toolchain stages are executed for a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStrategy {
    /// Run analyze, elaborate and run as separate subprocesses, in sequence.
    OneShot,

    /// Feed the session script to a single long-lived simulator process.
    Session,
}

impl fmt::Display for StageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot => write!(f, "one-shot"),
            Self::Session => write!(f, "session"),
        }
    }
}

/// Where a test's generator and toolchain processes run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkdirMode {
    /// A fresh temporary directory per test, removed afterwards.
    PerTest,

    /// One scratch directory reused by every test, swept with the cleanup patterns.
    Shared,
}

/// How progress across runs is recorded.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressKind {
    /// A JSON table in the profile's store directory.
    StateFile,

    /// A leading `@` line prepended to each completed definition file.
    Marker,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct ToolchainConfig {
    #[serde(default)]
    pub(super) path: Vec<Utf8PathBuf>,
}

/// Textual anchors used to locate the toolchain commands in a generator transcript.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractAnchors {
    generated_marker: String,
    food_start: String,
    #[serde(default)]
    food_end: String,
    analyze: String,
    elaborate: String,
    run: String,
    #[serde(default)]
    trailer: String,
    mismatch: String,
}

impl ExtractAnchors {
    /// The generator's "output file written" announcement.
    pub fn generated_marker(&self) -> &str {
        &self.generated_marker
    }

    /// The anchor that introduces the toolchain food.
    pub fn food_start(&self) -> &str {
        &self.food_start
    }

    /// The anchor that ends the toolchain food, if any.
    pub fn food_end(&self) -> Option<&str> {
        non_empty(&self.food_end)
    }

    /// The analyze command verb.
    pub fn analyze(&self) -> &str {
        &self.analyze
    }

    /// The elaborate command verb.
    pub fn elaborate(&self) -> &str {
        &self.elaborate
    }

    /// The run command verb.
    pub fn run(&self) -> &str {
        &self.run
    }

    /// The anchor that ends the run command, if any.
    pub fn trailer(&self) -> Option<&str> {
        non_empty(&self.trailer)
    }

    /// The token that signals a mismatch between expected and simulated values.
    pub fn mismatch(&self) -> &str {
        &self.mismatch
    }

    pub(super) fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        require_non_empty("extract.generated-marker", &self.generated_marker)?;
        require_non_empty("extract.food-start", &self.food_start)?;
        require_non_empty("extract.analyze", &self.analyze)?;
        require_non_empty("extract.elaborate", &self.elaborate)?;
        require_non_empty("extract.run", &self.run)?;
        require_non_empty("extract.mismatch", &self.mismatch)
    }
}

/// Settings for the interactive session strategy.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    program: String,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    script_start: String,
    script_end: String,
    finished: String,
    load_error: String,
    error: String,
}

impl SessionConfig {
    /// The simulator command line, run through the shell.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// How long to wait for the next line of output before killing the session.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The anchor at which the session script starts.
    pub fn script_start(&self) -> &str {
        &self.script_start
    }

    /// The anchor just past the end of the session script.
    pub fn script_end(&self) -> &str {
        &self.script_end
    }

    /// A line containing this token ends the session.
    pub fn finished(&self) -> &str {
        &self.finished
    }

    /// A line containing this token means the design could not be loaded.
    pub fn load_error(&self) -> &str {
        &self.load_error
    }

    /// A line containing this token marks the test as failed.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub(super) fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        require_non_empty("session.program", &self.program)?;
        require_non_empty("session.script-start", &self.script_start)?;
        require_non_empty("session.script-end", &self.script_end)?;
        require_non_empty("session.finished", &self.finished)?;
        require_non_empty("session.load-error", &self.load_error)?;
        require_non_empty("session.error", &self.error)
    }

    #[cfg(test)]
    pub(crate) fn with_program(mut self, program: impl Into<String>, timeout: Duration) -> Self {
        self.program = program.into();
        self.timeout = timeout;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct CleanupConfig {
    #[serde(default)]
    patterns: Vec<String>,
}

impl CleanupConfig {
    pub(super) fn compile(&self) -> Result<CleanupPatterns, ConfigParseErrorKind> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.patterns {
            let glob = Glob::new(pattern).map_err(|err| {
                ConfigParseErrorKind::InvalidCleanupPattern {
                    pattern: pattern.clone(),
                    err,
                }
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|err| ConfigParseErrorKind::InvalidCleanupPattern {
                pattern: self.patterns.join(", "),
                err,
            })?;
        Ok(CleanupPatterns { set })
    }
}

/// Compiled glob patterns for scratch artifacts left behind by the toolchain.
#[derive(Clone, Debug)]
pub struct CleanupPatterns {
    set: GlobSet,
}

impl CleanupPatterns {
    /// Returns true if a file name matches one of the patterns.
    pub fn is_match(&self, file_name: &str) -> bool {
        self.set.is_match(file_name)
    }

    /// Removes every direct child of `dir` whose name matches one of the patterns.
    ///
    /// Returns the number of entries removed. Removal continues past individual failures; the
    /// first failure is returned once the sweep is done.
    pub fn remove_matching(&self, dir: &Utf8Path) -> io::Result<usize> {
        let mut removed = 0;
        let mut first_error = None;

        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            if !self.is_match(entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let res = if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            match res {
                Ok(()) => {
                    debug!("removed scratch artifact {path}");
                    removed += 1;
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(removed),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn require_non_empty(key: &'static str, value: &str) -> Result<(), ConfigParseErrorKind> {
    if value.is_empty() {
        Err(ConfigParseErrorKind::EmptyValue { key })
    } else {
        Ok(())
    }
}
