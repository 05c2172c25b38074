// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running toolchain stages and classifying their outcomes.
//!
//! The one-shot strategy runs each [`StageCommand`] as its own subprocess and blocks until it
//! exits. The interactive strategy lives in [`session`].

mod session;

pub use session::*;

use crate::{
    errors::LogSinkError,
    extract::StageCommand,
    log_sink::LogSink,
    stopwatch::stopwatch,
    test_command::{ShellCommand, ToolchainEnv},
};
use camino::Utf8Path;
use std::{fmt, time::Duration};

/// One step of the toolchain.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum StageKind {
    /// Analysis of the generated VHDL.
    Analyze,

    /// Elaboration of the test bench.
    Elaborate,

    /// Simulation.
    Run,
}

impl StageKind {
    /// Returns true if this stage is part of compilation rather than simulation.
    pub fn is_compile(self) -> bool {
        matches!(self, Self::Analyze | Self::Elaborate)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyze => write!(f, "analyze"),
            Self::Elaborate => write!(f, "elaborate"),
            Self::Run => write!(f, "run"),
        }
    }
}

/// How a stage ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StageStatus {
    /// The stage succeeded.
    Passed,

    /// An earlier stage failed, so this one was not run.
    NotRun,

    /// Analysis or elaboration exited non-zero.
    CompileError {
        /// The exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
    },

    /// The simulation exited non-zero without reporting a mismatch.
    RunError {
        /// The exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
    },

    /// The simulation reported a mismatch between expected and actual values.
    LogicalMismatch,

    /// The process could not be started.
    ExecFail {
        /// A description of the failure.
        message: String,
    },
}

impl StageStatus {
    /// Returns true if the stage passed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::NotRun => write!(f, "not run"),
            Self::CompileError { exit_code } | Self::RunError { exit_code } => match exit_code {
                Some(code) => write!(f, "exited with code {code}"),
                None => write!(f, "terminated by signal"),
            },
            Self::LogicalMismatch => write!(f, "reported incorrect results"),
            Self::ExecFail { message } => write!(f, "could not be started: {message}"),
        }
    }
}

/// The result of running, or not running, one stage.
#[derive(Clone, Debug)]
pub struct StageOutcome {
    /// The stage.
    pub kind: StageKind,

    /// The command that was run, or would have been.
    pub command: String,

    /// How the stage ended.
    pub status: StageStatus,

    /// Combined stdout and stderr.
    pub output: String,

    /// Wall-clock time spent in the stage.
    pub time_taken: Duration,
}

impl StageOutcome {
    /// An outcome for a stage skipped because an earlier stage failed.
    pub fn not_run(command: &StageCommand) -> Self {
        Self {
            kind: command.kind(),
            command: command.as_str().to_owned(),
            status: StageStatus::NotRun,
            output: String::new(),
            time_taken: Duration::ZERO,
        }
    }

    /// Returns true if the stage passed.
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }
}

/// Runs one-shot stage commands in a working directory.
#[derive(Clone, Copy, Debug)]
pub struct StageRunner<'a> {
    cwd: &'a Utf8Path,
    env: &'a ToolchainEnv,
    mismatch: &'a str,
}

impl<'a> StageRunner<'a> {
    pub(crate) fn new(cwd: &'a Utf8Path, env: &'a ToolchainEnv, mismatch: &'a str) -> Self {
        Self { cwd, env, mismatch }
    }

    /// Runs a stage command to completion and classifies it.
    ///
    /// The command and its output go to the full log; a failing stage is also written to the
    /// errors log. Only a log failure is returned as an error.
    pub fn run(
        &self,
        command: &StageCommand,
        log: &mut LogSink,
    ) -> Result<StageOutcome, LogSinkError> {
        let stopwatch = stopwatch();
        log.record(&format!("> {command}"))?;

        let shell = ShellCommand::new(command.as_str(), self.cwd, self.env);
        let (status, output) = match shell.run_capture() {
            Ok(captured) => {
                let status = classify(
                    command.kind(),
                    &captured.output,
                    captured.success,
                    captured.exit_code,
                    self.mismatch,
                );
                (status, captured.output)
            }
            Err(err) => (
                StageStatus::ExecFail {
                    message: err.to_string(),
                },
                String::new(),
            ),
        };

        log.record(&output)?;
        if !status.is_success() {
            let detail = match &status {
                StageStatus::ExecFail { message } => message.as_str(),
                _ => output.as_str(),
            };
            log.record_error(command.as_str(), detail)?;
        }

        Ok(StageOutcome {
            kind: command.kind(),
            command: command.as_str().to_owned(),
            status,
            output,
            time_taken: stopwatch.snapshot().duration,
        })
    }
}

fn classify(
    kind: StageKind,
    output: &str,
    success: bool,
    exit_code: Option<i32>,
    mismatch: &str,
) -> StageStatus {
    match kind {
        // A mismatch overrides the exit status.
        StageKind::Run if output.contains(mismatch) => StageStatus::LogicalMismatch,
        _ if success => StageStatus::Passed,
        StageKind::Run => StageStatus::RunError { exit_code },
        StageKind::Analyze | StageKind::Elaborate => StageStatus::CompileError { exit_code },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StageKind::Analyze, "", true, StageStatus::Passed ; "analyze passes")]
    #[test_case(
        StageKind::Analyze, "syntax error", false, StageStatus::CompileError { exit_code: Some(1) }
        ; "analyze fails"
    )]
    #[test_case(
        StageKind::Elaborate, "Incorrect", true, StageStatus::Passed
        ; "mismatch token only matters for run"
    )]
    #[test_case(StageKind::Run, "all good", true, StageStatus::Passed ; "run passes")]
    #[test_case(
        StageKind::Run, "Incorrect output for R", true, StageStatus::LogicalMismatch
        ; "mismatch on zero exit"
    )]
    #[test_case(
        StageKind::Run, "Incorrect output for R", false, StageStatus::LogicalMismatch
        ; "mismatch on non-zero exit"
    )]
    #[test_case(
        StageKind::Run, "crash", false, StageStatus::RunError { exit_code: Some(1) }
        ; "run fails"
    )]
    fn classify_outcomes(kind: StageKind, output: &str, success: bool, expected: StageStatus) {
        let exit_code = if success { Some(0) } else { Some(1) };
        assert_eq!(
            classify(kind, output, success, exit_code, "Incorrect"),
            expected
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_stage_is_logged_as_error() {
        use crate::progress::RunMode;
        use camino_tempfile::Utf8TempDir;

        let dir = Utf8TempDir::new().expect("temp dir created");
        let mut log = LogSink::open(
            dir.path().join("full.log"),
            dir.path().join("errors.log"),
            RunMode::StartClean,
        )
        .expect("logs open");
        let env = ToolchainEnv::default();
        let runner = StageRunner::new(dir.path(), &env, "Incorrect");

        let outcome = runner
            .run(
                &StageCommand::new(StageKind::Analyze, "echo bad design; exit 2"),
                &mut log,
            )
            .expect("logs are writable");
        assert_eq!(
            outcome.status,
            StageStatus::CompileError { exit_code: Some(2) }
        );
        assert_eq!(outcome.output, "bad design\n");

        let errors = std::fs::read_to_string(log.errors_path()).expect("errors log reads");
        assert_eq!(errors, "ERROR in echo bad design; exit 2\nbad design\n");
    }
}
