// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `soaktest` failures.
///
/// A soak run may fail for a variety of reasons. This structure documents the exit codes that may
/// occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum SoaktestExitCode {}

impl SoaktestExitCode {
    /// No errors occurred and every test that ran passed.
    pub const OK: i32 = 0;

    /// One or more tests failed to generate, compile or pass simulation.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The batch was aborted because the logs, the result ledger or the progress store could not
    /// be written, or a test definition file could not be read.
    ///
    /// Progress recorded before the abort is consistent, and a later run in resume mode continues
    /// from it.
    pub const BATCH_ABORTED: i32 = 101;

    /// The result ledger could not be read back by `soaktest report`.
    pub const LEDGER_READ_FAILED: i32 = 102;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a soaktest invocation: an invalid config file, an
    /// unknown profile or an unusable store directory.
    pub const SETUP_ERROR: i32 = 96;
}
