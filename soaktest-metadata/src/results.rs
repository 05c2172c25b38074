// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// The outcome of running one test line through the generator and the toolchain.
///
/// A `TestResult` is produced exactly once per line that is actually run, appended to the result
/// ledger, and never mutated afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResult {
    /// The full generator command line, including the harness name and iteration count.
    pub command: String,

    /// True if the generator announced its output file and the toolchain commands could be
    /// extracted from its transcript.
    pub generated: bool,

    /// True if analysis and elaboration succeeded.
    pub compiled: bool,

    /// True if the simulation ran and reported no mismatches.
    pub passed: bool,
}

impl TestResult {
    /// Creates a result for a test whose generator run did not produce usable output.
    pub fn not_generated(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            generated: false,
            compiled: false,
            passed: false,
        }
    }
}

/// Aggregated results for a batch, as emitted by `soaktest report --message-format json`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportSummary {
    /// One entry per test, in the order the tests were run.
    pub results: Vec<TestResult>,

    /// The number of tests that passed.
    pub passed_count: usize,

    /// The number of tests that did not pass, for any reason.
    pub failed_count: usize,

    /// The aggregate status: true iff every test passed (vacuously true for an empty batch).
    pub passed: bool,
}

impl ReportSummary {
    /// Builds a summary out of a list of results.
    pub fn new(results: Vec<TestResult>) -> Self {
        let passed_count = results.iter().filter(|result| result.passed).count();
        let failed_count = results.len() - passed_count;
        Self {
            results,
            passed_count,
            failed_count,
            passed: failed_count == 0,
        }
    }

    /// Parses JSON output produced by `soaktest report --message-format json`.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn result(passed: bool) -> TestResult {
        TestResult {
            command: "./flopoco FPAdd we=8 wf=23 TestBench n=1000".to_owned(),
            generated: true,
            compiled: true,
            passed,
        }
    }

    #[test_case(vec![], 0, 0, true ; "empty batch passes")]
    #[test_case(vec![result(true), result(true)], 2, 0, true ; "all passed")]
    #[test_case(vec![result(true), result(false)], 1, 1, false ; "one failure")]
    fn summary_counts(
        results: Vec<TestResult>,
        passed_count: usize,
        failed_count: usize,
        passed: bool,
    ) {
        let summary = ReportSummary::new(results);
        assert_eq!(summary.passed_count, passed_count);
        assert_eq!(summary.failed_count, failed_count);
        assert_eq!(summary.passed, passed);
    }

    #[test]
    fn parse_json_summary() {
        let json = r#"{
            "results": [
                {
                    "command": "./flopoco IntAdder wIn=10 TestBench n=1000",
                    "generated": true,
                    "compiled": false,
                    "passed": false
                }
            ],
            "passed-count": 0,
            "failed-count": 1,
            "passed": false
        }"#;

        let summary = ReportSummary::parse_json(json).expect("summary parses");
        assert_eq!(
            summary.results,
            vec![TestResult {
                command: "./flopoco IntAdder wIn=10 TestBench n=1000".to_owned(),
                generated: true,
                compiled: false,
                passed: false,
            }]
        );
        assert!(!summary.passed);
    }

    #[test]
    fn not_generated_is_all_false() {
        let result = TestResult::not_generated("gen");
        assert!(!result.generated && !result.compiled && !result.passed);
    }
}
