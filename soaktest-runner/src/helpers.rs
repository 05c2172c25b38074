// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for soaktest-runner.

use std::{fmt, time::Duration};

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "file" if `count` is 1, otherwise "files".
    pub(crate) fn files_str(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }

    /// Returns "line" if `count` is 1, otherwise "lines".
    pub(crate) fn lines_str(count: usize) -> &'static str {
        if count == 1 { "line" } else { "lines" }
    }
}

/// Displays a duration as `[   1.234s]`, right-aligned so that columns line up.
pub(crate) struct DisplayBracketedDuration(pub(crate) Duration);

impl fmt::Display for DisplayBracketedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Durations longer than ~27 hours would overflow the column; those are rare enough to
        // accept the misalignment.
        write!(f, "[{:>8.3}s]", self.0.as_secs_f64())
    }
}
