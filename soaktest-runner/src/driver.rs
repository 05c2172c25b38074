// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a single test line end to end.
//!
//! The driver builds the generator command for a line, runs it in a working directory, extracts
//! the toolchain commands from its transcript, and runs the stages (or a session) in sequence. A
//! failing test is a normal [`TestOutcome`]; only a log or working-directory failure is an error.

use crate::{
    config::{
        CleanupPatterns, ExtractAnchors, SessionConfig, SoaktestProfile, StageStrategy,
        WorkdirMode,
    },
    errors::{BatchError, DisplayErrorChain, ExtractionError, WorkdirError},
    extract::{self, StageCommands},
    list::TestLine,
    log_sink::LogSink,
    stage::{
        SessionOutcome, SessionRunner, SessionStatus, StageKind, StageOutcome, StageRunner,
        StageStatus,
    },
    stopwatch::stopwatch,
    test_command::{ShellCommand, ToolchainEnv},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use soaktest_metadata::TestResult;
use std::{fmt, time::Duration};
use swrite::{SWrite, swrite};
use tracing::{debug, warn};

/// Why a test did not pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TestFailure {
    /// The generator could not be started.
    GeneratorExecFail {
        /// A description of the failure.
        message: String,
    },

    /// The generator did not announce an output file.
    NotGenerated,

    /// The toolchain commands could not be located in the transcript.
    Extraction(ExtractionError),

    /// A one-shot stage failed. Later stages were not run.
    Stage {
        /// The failing stage.
        kind: StageKind,

        /// How it failed.
        status: StageStatus,
    },

    /// The interactive session did not pass.
    Session(SessionStatus),
}

impl TestFailure {
    /// The step that failed, as used for JUnit failure types: `generate`, `analyze`, `elaborate`,
    /// `run` or `session`.
    pub fn step(&self) -> &'static str {
        match self {
            Self::GeneratorExecFail { .. } | Self::NotGenerated | Self::Extraction(_) => {
                "generate"
            }
            Self::Stage { kind, .. } => match kind {
                StageKind::Analyze => "analyze",
                StageKind::Elaborate => "elaborate",
                StageKind::Run => "run",
            },
            Self::Session(_) => "session",
        }
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratorExecFail { message } => {
                write!(f, "generator could not be started: {message}")
            }
            Self::NotGenerated => write!(f, "generator did not produce an output file"),
            Self::Extraction(err) => write!(f, "{err}"),
            Self::Stage { kind, status } => write!(f, "{kind} {status}"),
            Self::Session(status) => write!(f, "session {status}"),
        }
    }
}

/// The outcome of running one test line.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    /// The row appended to the ledger.
    pub result: TestResult,

    /// Why the test did not pass, or `None` if it did.
    pub failure: Option<TestFailure>,

    /// The generator transcript.
    pub transcript: String,

    /// One-shot stages, in execution order. Empty if the stages were never reached or the session
    /// strategy was used.
    pub stages: Vec<StageOutcome>,

    /// The interactive session, if the session strategy was used.
    pub session: Option<SessionOutcome>,

    /// Wall-clock time for the whole test.
    pub time_taken: Duration,
}

/// Runs test lines through the generator and the toolchain.
#[derive(Debug)]
pub struct TestCaseDriver<'cfg> {
    generator: Option<String>,
    harness: &'cfg str,
    iterations: u32,
    settle_delay: Duration,
    strategy: StageStrategy,
    workdir: WorkdirMode,
    work_root: Utf8PathBuf,
    extract: &'cfg ExtractAnchors,
    session: &'cfg SessionConfig,
    cleanup: &'cfg CleanupPatterns,
    env: ToolchainEnv,
}

impl<'cfg> TestCaseDriver<'cfg> {
    pub(crate) fn new(
        profile: &SoaktestProfile<'cfg>,
        iterations: u32,
        settle_delay: Duration,
        strategy: StageStrategy,
        env: ToolchainEnv,
    ) -> Self {
        Self {
            generator: profile.generator(),
            harness: profile.harness(),
            iterations,
            settle_delay,
            strategy,
            workdir: profile.workdir(),
            work_root: profile.work_dir(),
            extract: profile.extract(),
            session: profile.session(),
            cleanup: profile.cleanup(),
            env,
        }
    }

    /// Builds the full generator command for a line: the optional generator program, the line's
    /// template, the harness and the iteration count.
    pub fn command_for(&self, line: &TestLine) -> String {
        let mut command = String::new();
        if let Some(generator) = &self.generator {
            command.push_str(generator);
            command.push(' ');
        }
        command.push_str(line.template());
        command.push(' ');
        command.push_str(self.harness);
        swrite!(command, " n={}", self.iterations);
        command
    }

    /// Runs one test line. `command` is the output of [`Self::command_for`].
    pub fn run(
        &self,
        line: &TestLine,
        command: &str,
        log: &mut LogSink,
    ) -> Result<TestOutcome, BatchError> {
        let stopwatch = stopwatch();
        debug!("running {line}: {command}");
        log.record(&format!("> {command}"))?;

        let workdir = Workdir::prepare(self.workdir, &self.work_root)?;
        let res = self.run_in(command, workdir.path(), log);
        workdir.clean_up(self.cleanup);
        let mut outcome = res?;

        outcome.time_taken = stopwatch.snapshot().duration;
        Ok(outcome)
    }

    fn run_in(
        &self,
        command: &str,
        cwd: &Utf8Path,
        log: &mut LogSink,
    ) -> Result<TestOutcome, BatchError> {
        let transcript = match ShellCommand::new(command, cwd, &self.env).run_capture() {
            Ok(captured) => {
                log.record(&captured.output)?;
                if !captured.success {
                    // The marker alone decides whether generation succeeded.
                    debug!(exit_code = ?captured.exit_code, "generator exited unsuccessfully");
                }
                captured.output
            }
            Err(err) => {
                let message = err.to_string();
                log.record_error(command, &format!("failed to start generator: {message}"))?;
                return Ok(not_generated(
                    command,
                    TestFailure::GeneratorExecFail { message },
                    String::new(),
                ));
            }
        };

        if !extract::is_generated(&transcript, self.extract) {
            log.record_error(command, &transcript)?;
            return Ok(not_generated(command, TestFailure::NotGenerated, transcript));
        }

        match self.strategy {
            StageStrategy::OneShot => {
                let commands = match extract::extract_stage_commands(&transcript, self.extract) {
                    Ok(commands) => commands,
                    Err(err) => return self.extraction_failed(command, err, transcript, log),
                };
                self.settle();
                self.run_stages(command, &commands, cwd, transcript, log)
            }
            StageStrategy::Session => {
                let script = match extract::extract_session_script(
                    &transcript,
                    self.extract,
                    self.session,
                ) {
                    Ok(script) => script,
                    Err(err) => return self.extraction_failed(command, err, transcript, log),
                };
                self.settle();
                let runner =
                    SessionRunner::new(self.session, self.extract.mismatch(), cwd, &self.env);
                let session = runner.run(&script, log)?;
                Ok(session_outcome(command, session, transcript))
            }
        }
    }

    fn run_stages(
        &self,
        command: &str,
        commands: &StageCommands,
        cwd: &Utf8Path,
        transcript: String,
        log: &mut LogSink,
    ) -> Result<TestOutcome, BatchError> {
        let runner = StageRunner::new(cwd, &self.env, self.extract.mismatch());
        let mut stages = Vec::with_capacity(3);
        let mut failure = None;

        for stage_command in commands.iter() {
            if failure.is_some() {
                stages.push(StageOutcome::not_run(stage_command));
                continue;
            }
            let outcome = runner.run(stage_command, log)?;
            if !outcome.succeeded() {
                failure = Some(TestFailure::Stage {
                    kind: outcome.kind,
                    status: outcome.status.clone(),
                });
            }
            stages.push(outcome);
        }

        let compiled = stages
            .iter()
            .filter(|stage| stage.kind.is_compile())
            .all(|stage| stage.succeeded());
        Ok(TestOutcome {
            result: TestResult {
                command: command.to_owned(),
                generated: true,
                compiled,
                passed: failure.is_none(),
            },
            failure,
            transcript,
            stages,
            session: None,
            time_taken: Duration::ZERO,
        })
    }

    fn extraction_failed(
        &self,
        command: &str,
        err: ExtractionError,
        transcript: String,
        log: &mut LogSink,
    ) -> Result<TestOutcome, BatchError> {
        log.record_error(command, &format!("{err}\n{transcript}"))?;
        Ok(not_generated(command, TestFailure::Extraction(err), transcript))
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }
}

fn not_generated(command: &str, failure: TestFailure, transcript: String) -> TestOutcome {
    TestOutcome {
        result: TestResult::not_generated(command),
        failure: Some(failure),
        transcript,
        stages: Vec::new(),
        session: None,
        time_taken: Duration::ZERO,
    }
}

fn session_outcome(command: &str, session: SessionOutcome, transcript: String) -> TestOutcome {
    let failure =
        (!session.status.is_success()).then(|| TestFailure::Session(session.status.clone()));
    TestOutcome {
        result: TestResult {
            command: command.to_owned(),
            generated: true,
            compiled: session.status.compiled(),
            passed: failure.is_none(),
        },
        failure,
        transcript,
        stages: Vec::new(),
        session: Some(session),
        time_taken: Duration::ZERO,
    }
}

enum Workdir {
    PerTest(Utf8TempDir),
    Shared(Utf8PathBuf),
}

impl Workdir {
    fn prepare(mode: WorkdirMode, work_root: &Utf8Path) -> Result<Self, WorkdirError> {
        std::fs::create_dir_all(work_root).map_err(|err| WorkdirError::new(work_root, err))?;
        match mode {
            WorkdirMode::PerTest => camino_tempfile::Builder::new()
                .prefix("test-")
                .tempdir_in(work_root)
                .map(Self::PerTest)
                .map_err(|err| WorkdirError::new(work_root, err)),
            WorkdirMode::Shared => {
                let dir = work_root.join("shared");
                std::fs::create_dir_all(&dir).map_err(|err| WorkdirError::new(&dir, err))?;
                Ok(Self::Shared(dir))
            }
        }
    }

    fn path(&self) -> &Utf8Path {
        match self {
            Self::PerTest(dir) => dir.path(),
            Self::Shared(dir) => dir,
        }
    }

    // Failures here are not fatal: the next test gets a fresh directory or another sweep.
    fn clean_up(self, cleanup: &CleanupPatterns) {
        match self {
            Self::PerTest(dir) => {
                let path = dir.path().to_owned();
                if let Err(error) = dir.close() {
                    warn!(
                        "failed to remove working directory {path}: {}",
                        DisplayErrorChain::new(&error)
                    );
                }
            }
            Self::Shared(dir) => match cleanup.remove_matching(&dir) {
                Ok(removed) => debug!("removed {removed} scratch artifacts from {dir}"),
                Err(error) => warn!(
                    "failed to clean up scratch artifacts in {dir}: {}",
                    DisplayErrorChain::new(&error)
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SoaktestConfig, list::DefinitionFile};
    use pretty_assertions::assert_eq;

    #[test]
    fn command_appends_harness_and_iterations() {
        let config = SoaktestConfig::default_config("/project");
        let profile = config
            .profile(SoaktestConfig::DEFAULT_PROFILE)
            .expect("default profile exists");
        let driver = TestCaseDriver::new(
            &profile,
            500,
            Duration::ZERO,
            StageStrategy::OneShot,
            ToolchainEnv::default(),
        );

        let file = DefinitionFile::parse("f", "/tests/f", "  FPAdd we=8 wf=23  \n");
        assert_eq!(
            driver.command_for(&file.lines()[0]),
            "FPAdd we=8 wf=23 TestBench n=500"
        );
    }

    #[test]
    fn failure_steps() {
        assert_eq!(TestFailure::NotGenerated.step(), "generate");
        assert_eq!(
            TestFailure::Stage {
                kind: StageKind::Elaborate,
                status: StageStatus::CompileError { exit_code: Some(1) },
            }
            .step(),
            "elaborate"
        );
        assert_eq!(
            TestFailure::Session(SessionStatus::LoadError).to_string(),
            "session design could not be loaded"
        );
    }
}
