// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use soaktest_metadata::TestResult;
use std::fmt;

const RULE_WIDTH: usize = 100;

/// The aggregated pass/fail table printed at the end of a batch and by `soaktest report`.
///
/// One row per result, in order, followed by the overall status: true iff every result passed,
/// and vacuously true when there are none.
#[derive(Clone, Copy, Debug)]
pub struct FinalReport<'a> {
    results: &'a [TestResult],
}

impl<'a> FinalReport<'a> {
    /// Creates a report over `results`.
    pub fn new(results: &'a [TestResult]) -> Self {
        Self { results }
    }

    /// The rows of the report.
    pub fn results(&self) -> &'a [TestResult] {
        self.results
    }

    /// The overall status.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|result| result.passed)
    }
}

impl fmt::Display for FinalReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>93}|{:>12}|{:>11}|{:>4}",
            "TEST", "GENERATE HDL", "COMPILE HDL", "PASS"
        )?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        for result in self.results {
            writeln!(
                f,
                "{:>93}|{:>12}|{:>11}|{:>4}",
                result.command, result.generated, result.compiled, result.passed
            )?;
        }
        write!(f, "FINAL PASS STATUS: {}", self.passed())
    }
}
