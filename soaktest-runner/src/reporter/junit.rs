// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from batch events.

use crate::{driver::TestFailure, errors::WriteEventError, runner::BatchEvent};
use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::{collections::BTreeMap, fs::File};

#[derive(Clone, Debug)]
pub(super) struct JunitAggregator {
    path: Utf8PathBuf,
    report_name: String,
    // Keyed by definition file name, so suites come out in processing order.
    test_suites: DebugIgnore<BTreeMap<String, TestSuite>>,
}

impl JunitAggregator {
    pub(super) fn new(path: Utf8PathBuf, report_name: impl Into<String>) -> Self {
        Self {
            path,
            report_name: report_name.into(),
            test_suites: DebugIgnore(BTreeMap::new()),
        }
    }

    pub(super) fn write_event(&mut self, event: &BatchEvent<'_>) -> Result<(), WriteEventError> {
        match event {
            BatchEvent::RunStarted { .. }
            | BatchEvent::FileSkipped { .. }
            | BatchEvent::LineSkipped { .. }
            | BatchEvent::TestStarted { .. }
            | BatchEvent::FileFinished { .. } => {}
            BatchEvent::FileStarted { file } => {
                self.testsuite_for(file.name());
            }
            BatchEvent::TestFinished { line, outcome } => {
                let status = match &outcome.failure {
                    None => TestCaseStatus::success(),
                    Some(failure) => {
                        let kind = match failure {
                            // The test never got a chance to run.
                            TestFailure::GeneratorExecFail { .. } => NonSuccessKind::Error,
                            _ => NonSuccessKind::Failure,
                        };
                        let mut status = TestCaseStatus::non_success(kind);
                        status
                            .set_type(failure.step())
                            .set_message(failure.to_string());
                        status
                    }
                };

                // Templates are not unique within a file, line numbers are.
                let mut testcase =
                    TestCase::new(format!("{}: {}", line.line_number(), line.template()), status);
                testcase
                    .set_classname(line.file_name())
                    .set_time(outcome.time_taken);
                if outcome.failure.is_some() {
                    testcase.set_system_out(format!(
                        "> {}\n{}",
                        outcome.result.command, outcome.transcript
                    ));
                }

                self.testsuite_for(line.file_name()).add_test_case(testcase);
            }
            BatchEvent::RunFinished {
                start_time,
                elapsed,
                ..
            } => {
                let mut report = Report::new(self.report_name.as_str());
                report
                    .set_timestamp(*start_time)
                    .set_time(*elapsed)
                    .add_test_suites(std::mem::take(&mut *self.test_suites).into_values());

                if let Some(junit_dir) = self.path.parent() {
                    std::fs::create_dir_all(junit_dir).map_err(|error| WriteEventError::Fs {
                        file: junit_dir.to_path_buf(),
                        error,
                    })?;
                }

                let f = File::create(&self.path).map_err(|error| WriteEventError::Fs {
                    file: self.path.clone(),
                    error,
                })?;
                report
                    .serialize(f)
                    .map_err(|error| WriteEventError::Junit {
                        file: self.path.clone(),
                        error,
                    })?;
            }
        }

        Ok(())
    }

    fn testsuite_for(&mut self, file_name: &str) -> &mut TestSuite {
        self.test_suites
            .entry(file_name.to_owned())
            .or_insert_with(|| TestSuite::new(file_name))
    }
}
