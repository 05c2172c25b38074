// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The batch controller.
//!
//! A batch walks every test definition file in order. Each file is either skipped whole (completed
//! by an earlier run, in resume mode) or processed line by line: lines the progress store says to
//! skip are reported, every other line goes through the [`TestCaseDriver`] and its result is
//! appended to the ledger before the next line starts. Once all lines of a file have been
//! attempted the file is marked completed.
//!
//! Progress is made durable after every test, so killing the process between two tests loses
//! nothing, and killing it during a test loses only that test. With state-file progress the line
//! being run is recorded before it starts; a resumed run compares that record against the ledger,
//! so a test whose row was appended just before the process died is not run a second time.

use crate::{
    config::{SoaktestProfile, StageStrategy},
    driver::{TestCaseDriver, TestOutcome},
    errors::BatchError,
    ledger::ResultLedger,
    list::{DefinitionFile, TestDefinitions, TestLine},
    log_sink::LogSink,
    progress::{FileState, ProgressStore, RunMode, SkipReason},
    reporter::FinalReport,
    stopwatch::stopwatch,
    test_command::ToolchainEnv,
};
use chrono::{DateTime, Local};
use soaktest_metadata::TestResult;
use std::time::Duration;
use tracing::info;

/// Test runner options.
#[derive(Debug, Default)]
pub struct BatchRunnerBuilder {
    run_mode: Option<RunMode>,
    iterations: Option<u32>,
    settle_delay: Option<Duration>,
    strategy: Option<StageStrategy>,
}

impl BatchRunnerBuilder {
    /// Sets the run mode. Defaults to [`RunMode::Resume`].
    pub fn set_run_mode(&mut self, run_mode: RunMode) -> &mut Self {
        self.run_mode = Some(run_mode);
        self
    }

    /// Overrides the profile's iteration count.
    pub fn set_iterations(&mut self, iterations: u32) -> &mut Self {
        self.iterations = Some(iterations);
        self
    }

    /// Overrides the profile's settle delay.
    pub fn set_settle_delay(&mut self, settle_delay: Duration) -> &mut Self {
        self.settle_delay = Some(settle_delay);
        self
    }

    /// Overrides the profile's stage strategy.
    pub fn set_strategy(&mut self, strategy: StageStrategy) -> &mut Self {
        self.strategy = Some(strategy);
        self
    }

    /// Prepares a batch: creates the store directory, opens the logs, the ledger and the progress
    /// store, and lists the definition files.
    ///
    /// In [`RunMode::StartClean`] earlier logs, results and progress are discarded here.
    pub fn build<'cfg>(
        &self,
        profile: &SoaktestProfile<'cfg>,
    ) -> Result<BatchRunner<'cfg>, BatchError> {
        let run_mode = self.run_mode.unwrap_or(RunMode::Resume);
        let store_dir = profile.store_dir();
        std::fs::create_dir_all(store_dir).map_err(|err| BatchError::StoreDirCreate {
            store_dir: store_dir.to_owned(),
            err,
        })?;

        let definitions = TestDefinitions::discover(profile.tests_dir())?;
        let log = LogSink::open(profile.full_log_path(), profile.error_log_path(), run_mode)?;
        let ledger = ResultLedger::open(profile.ledger_path(), run_mode)?;
        let mut progress = ProgressStore::load(profile.progress(), profile.progress_path(), run_mode)?;
        if run_mode == RunMode::StartClean {
            progress.reset()?;
        } else if let Some((file, line_number)) = progress.reconcile(ledger.row_count())? {
            info!(
                "{file}:{line_number} finished before the previous run stopped, \
                 not running it again"
            );
        }

        let strategy = self.strategy.unwrap_or_else(|| profile.strategy());
        info!(
            "{run_mode} run of profile `{}` with {strategy} stages",
            profile.name()
        );

        let driver = TestCaseDriver::new(
            profile,
            self.iterations.unwrap_or_else(|| profile.iterations()),
            self.settle_delay.unwrap_or_else(|| profile.settle_delay()),
            strategy,
            ToolchainEnv::new(&profile.toolchain_path())?,
        );

        Ok(BatchRunner {
            run_mode,
            definitions,
            driver,
            log,
            ledger,
            progress,
        })
    }
}

/// Context for running a batch.
///
/// Created using [`BatchRunnerBuilder::build`].
#[derive(Debug)]
pub struct BatchRunner<'cfg> {
    run_mode: RunMode,
    definitions: TestDefinitions,
    driver: TestCaseDriver<'cfg>,
    log: LogSink,
    ledger: ResultLedger,
    progress: ProgressStore,
}

impl BatchRunner<'_> {
    /// The definition files this batch will walk.
    pub fn definitions(&self) -> &TestDefinitions {
        &self.definitions
    }

    /// Runs the batch.
    ///
    /// The callback is called with an event for every step of the batch.
    pub fn execute<F>(self, mut callback: F) -> Result<RunStats, BatchError>
    where
        F: FnMut(BatchEvent<'_>),
    {
        self.try_execute::<BatchError, _>(|event| {
            callback(event);
            Ok(())
        })
    }

    /// Runs the batch, with a callback that can fail.
    ///
    /// If the callback returns an error, the batch stops immediately and the error is returned.
    /// Everything recorded up to that point stays in the ledger and progress store, so a later run
    /// in resume mode picks up where this one stopped.
    pub fn try_execute<E, F>(self, mut callback: F) -> Result<RunStats, E>
    where
        F: FnMut(BatchEvent<'_>) -> Result<(), E>,
        E: From<BatchError>,
    {
        let Self {
            run_mode,
            definitions,
            driver,
            mut log,
            mut ledger,
            mut progress,
        } = self;

        let stopwatch = stopwatch();
        let mut stats = RunStats::default();
        let mut results = Vec::new();

        callback(BatchEvent::RunStarted {
            file_count: definitions.len(),
            run_mode,
        })?;

        for entry in definitions.iter() {
            let file = DefinitionFile::read(entry).map_err(BatchError::from)?;
            stats.files += 1;

            if progress.is_file_completed(&file) {
                stats.files_skipped += 1;
                log.record(&format!("skipping {}: completed in a prior run", file.name()))
                    .map_err(BatchError::from)?;
                callback(BatchEvent::FileSkipped { file: &file })?;
                continue;
            }

            let completed_at_entry = progress.has_completion_record(&file);
            log.record(&format!("processing {}", file.name()))
                .map_err(BatchError::from)?;
            callback(BatchEvent::FileStarted { file: &file })?;

            let mut state = FileState::default();
            for line in file.lines() {
                if let Some(reason) = progress.skip_reason(line, &mut state) {
                    stats.lines_skipped += 1;
                    if reason == SkipReason::StopMarker {
                        log.record(&format!("{line}: stop marker, skipping rest of file"))
                            .map_err(BatchError::from)?;
                    }
                    callback(BatchEvent::LineSkipped { line, reason })?;
                    continue;
                }

                let command = driver.command_for(line);
                callback(BatchEvent::TestStarted {
                    line,
                    command: &command,
                })?;

                progress
                    .record_line_started(line, ledger.row_count())
                    .map_err(BatchError::from)?;
                let outcome = driver.run(line, &command, &mut log)?;
                ledger.append(&outcome.result).map_err(BatchError::from)?;
                progress
                    .record_line_finished(line)
                    .map_err(BatchError::from)?;
                stats.on_test_finished(&outcome);

                callback(BatchEvent::TestFinished {
                    line,
                    outcome: &outcome,
                })?;
                results.push(outcome.result);
            }

            if !completed_at_entry {
                progress
                    .mark_file_completed(&file)
                    .map_err(BatchError::from)?;
            }
            callback(BatchEvent::FileFinished {
                file: &file,
                newly_completed: !completed_at_entry,
            })?;
        }

        let report = FinalReport::new(&results);
        log.record(&report.to_string()).map_err(BatchError::from)?;

        let snapshot = stopwatch.snapshot();
        callback(BatchEvent::RunFinished {
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            stats,
            results: &results,
        })?;

        Ok(stats)
    }
}

/// An event that occurs during a batch.
#[derive(Clone, Debug)]
pub enum BatchEvent<'a> {
    /// The batch started.
    RunStarted {
        /// The number of definition files that will be visited.
        file_count: usize,

        /// The run mode.
        run_mode: RunMode,
    },

    /// A file was skipped whole because an earlier run completed it.
    FileSkipped {
        /// The file.
        file: &'a DefinitionFile,
    },

    /// Processing of a file started.
    FileStarted {
        /// The file.
        file: &'a DefinitionFile,
    },

    /// A line was not run.
    LineSkipped {
        /// The line.
        line: &'a TestLine,

        /// Why it was skipped.
        reason: SkipReason,
    },

    /// A test started.
    TestStarted {
        /// The line being run.
        line: &'a TestLine,

        /// The full generator command.
        command: &'a str,
    },

    /// A test finished, and its result was recorded.
    TestFinished {
        /// The line that was run.
        line: &'a TestLine,

        /// The outcome.
        outcome: &'a TestOutcome,
    },

    /// Every line of a file was attempted.
    FileFinished {
        /// The file.
        file: &'a DefinitionFile,

        /// True if the file was marked completed by this run.
        newly_completed: bool,
    },

    /// The batch finished.
    RunFinished {
        /// When the batch started.
        start_time: DateTime<Local>,

        /// How long the batch took.
        elapsed: Duration,

        /// Statistics for the batch.
        stats: RunStats,

        /// Every result recorded by this batch, in order.
        results: &'a [TestResult],
    },
}

/// Statistics for a batch.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The number of definition files visited.
    pub files: usize,

    /// The number of files skipped whole because an earlier run completed them.
    pub files_skipped: usize,

    /// The number of lines not run: blanks, comments, markers and lines after a stop marker.
    pub lines_skipped: usize,

    /// The number of tests run.
    pub tests_run: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that did not pass, for any reason.
    pub failed: usize,

    /// The number of failed tests whose generator did not produce usable output.
    pub not_generated: usize,

    /// The number of failed tests that generated but did not compile.
    pub not_compiled: usize,
}

impl RunStats {
    /// Returns true if every test that ran passed. A batch that ran nothing is a success.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn on_test_finished(&mut self, outcome: &TestOutcome) {
        self.tests_run += 1;
        let result = &outcome.result;
        if result.passed {
            self.passed += 1;
            return;
        }

        self.failed += 1;
        if !result.generated {
            self.not_generated += 1;
        } else if !result.compiled {
            self.not_compiled += 1;
        }
    }
}

/// A dry run of a batch: what would be skipped and what would run, without running anything.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    files: Vec<PlannedFile>,
}

/// A definition file in a [`BatchPlan`].
#[derive(Clone, Debug)]
pub struct PlannedFile {
    /// The file.
    pub file: DefinitionFile,

    /// True if the whole file would be skipped.
    pub skipped: bool,

    /// For every line, why it would be skipped, or `None` if it would run. Empty if the whole file
    /// is skipped.
    pub lines: Vec<Option<SkipReason>>,
}

impl BatchPlan {
    /// Computes the plan for `profile` without creating, truncating or modifying any file.
    pub fn new(profile: &SoaktestProfile<'_>, run_mode: RunMode) -> Result<Self, BatchError> {
        let definitions = TestDefinitions::discover(profile.tests_dir())?;
        let progress = ProgressStore::load(profile.progress(), profile.progress_path(), run_mode)?;

        let files = definitions
            .iter()
            .map(|entry| {
                let file = DefinitionFile::read(entry)?;
                if progress.is_file_completed(&file) {
                    return Ok(PlannedFile {
                        file,
                        skipped: true,
                        lines: Vec::new(),
                    });
                }

                let mut state = FileState::default();
                let lines = file
                    .lines()
                    .iter()
                    .map(|line| progress.skip_reason(line, &mut state))
                    .collect();
                Ok(PlannedFile {
                    file,
                    skipped: false,
                    lines,
                })
            })
            .collect::<Result<Vec<_>, BatchError>>()?;

        Ok(Self { files })
    }

    /// The files, in processing order.
    pub fn files(&self) -> &[PlannedFile] {
        &self.files
    }

    /// The number of tests that would run.
    pub fn test_count(&self) -> usize {
        self.files
            .iter()
            .flat_map(|planned| planned.lines.iter())
            .filter(|reason| reason.is_none())
            .count()
    }
}
